// SPDX-FileCopyrightText: OLM e2e harness contributors
//
// SPDX-License-Identifier: MIT

use std::fmt;
use std::process::Stdio;

use async_trait::async_trait;
use log::{debug, info};
use tokio::process::Command;

use crate::config::CliConfig;
use crate::error::{Error, Result};

/// Credentials a CLI call runs with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Identity {
    Admin,
    User,
}

/// Whether the CLI call is pinned to the test namespace.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Scope {
    Namespaced,
    Cluster,
}

/// CLI sub-commands the harness uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Action {
    Get,
    Create,
    Delete,
    Patch,
    Apply,
    Process,
    Exec,
    Version,
    Label,
    NewProject,
    Adm,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Get => "get",
            Action::Create => "create",
            Action::Delete => "delete",
            Action::Patch => "patch",
            Action::Apply => "apply",
            Action::Process => "process",
            Action::Exec => "exec",
            Action::Version => "version",
            Action::Label => "label",
            Action::NewProject => "new-project",
            Action::Adm => "adm",
        }
    }

    /// Whether the action changes cluster state.
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Action::Create
                | Action::Delete
                | Action::Patch
                | Action::Apply
                | Action::Label
                | Action::NewProject
        )
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runs one CLI call and hands back its output. No retries, no interpretation.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(
        &self,
        action: Action,
        identity: Identity,
        scope: Scope,
        args: &[String],
    ) -> Result<String>;
}

/// [`Executor`] backed by the real cluster CLI.
#[derive(Clone, Debug)]
pub struct CliExecutor {
    binary: String,
    admin_kubeconfig: Option<String>,
    user_kubeconfig: Option<String>,
    namespace: Option<String>,
}

impl CliExecutor {
    pub fn new(config: &CliConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            admin_kubeconfig: config.admin_kubeconfig.clone(),
            user_kubeconfig: config.user_kubeconfig.clone(),
            namespace: config.namespace.clone(),
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Arguments passed to the CLI binary for one call.
    pub fn command_args(
        &self,
        action: Action,
        identity: Identity,
        scope: Scope,
        args: &[String],
    ) -> Vec<String> {
        let mut argv = vec![action.as_str().to_string()];
        let kubeconfig = match identity {
            Identity::Admin => self.admin_kubeconfig.as_deref(),
            Identity::User => self.user_kubeconfig.as_deref(),
        };
        if let Some(kubeconfig) = kubeconfig {
            argv.push(format!("--kubeconfig={kubeconfig}"));
        }
        if let (Scope::Namespaced, Some(namespace)) = (scope, self.namespace.as_deref()) {
            argv.push(format!("--namespace={namespace}"));
        }
        argv.extend(args.iter().cloned());
        argv
    }
}

#[async_trait]
impl Executor for CliExecutor {
    async fn execute(
        &self,
        action: Action,
        identity: Identity,
        scope: Scope,
        args: &[String],
    ) -> Result<String> {
        let argv = self.command_args(action, identity, scope, args);
        let command_line = format!("{} {}", self.binary, argv.join(" "));
        if action.is_mutating() {
            info!("running {command_line}");
        } else {
            debug!("running {command_line}");
        }

        let output = Command::new(&self.binary)
            .args(&argv)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| Error::Spawn {
                command: command_line.clone(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let combined = [stdout.as_str(), stderr.trim()]
                .iter()
                .filter(|s| !s.is_empty())
                .copied()
                .collect::<Vec<_>>()
                .join("\n");
            return Err(Error::Command {
                command: command_line,
                status: output.status.to_string(),
                output: combined,
            });
        }
        Ok(stdout)
    }
}
