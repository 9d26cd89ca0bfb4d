// SPDX-FileCopyrightText: OLM e2e harness contributors
//
// SPDX-License-Identifier: MIT

use std::time::Duration;

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` failed ({status}): {output}")]
    Command {
        command: String,
        status: String,
        output: String,
    },

    #[error("{message}: timed out after {timeout:?} ({attempts} attempts), last error: {last_error}")]
    Timeout {
        message: String,
        timeout: Duration,
        attempts: u32,
        last_error: String,
    },

    #[error("{message}: polling cancelled")]
    Cancelled { message: String },

    #[error("check `{check}` did not hold")]
    CheckFailed { check: String },

    #[error("{} check(s) failed: {}", .0.len(), join_errors(.0))]
    Checks(Vec<Error>),

    #[error("template {template}: {reason}")]
    Template { template: String, reason: String },

    #[error("test case {0} was never registered")]
    UnknownTestCase(String),

    #[error("unexpected output from `{query}`: {reason}")]
    UnexpectedOutput { query: String, reason: String },

    #[error("failed to decode {what}: {source}")]
    Decode {
        what: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode manifest: {0}")]
    Encode(#[from] serde_yaml::Error),

    #[error("package {package} supports none of the install modes the harness can set up")]
    NoInstallMode { package: String },

    #[error(transparent)]
    Config(#[from] envconfig::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// The CLI reported that the addressed object does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Command { output, .. } => {
                output.contains("NotFound") || output.contains("No resources found")
            }
            _ => false,
        }
    }
}

fn join_errors(errors: &[Error]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
