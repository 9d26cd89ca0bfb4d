// SPDX-FileCopyrightText: OLM e2e harness contributors
//
// SPDX-License-Identifier: MIT

//! Scripted [`Executor`] for exercising the harness without a cluster.

use std::fmt;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::executor::{Action, Executor, Identity, Scope};

/// One recorded CLI call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invocation {
    pub action: Action,
    pub identity: Identity,
    pub scope: Scope,
    pub args: Vec<String>,
}

impl Invocation {
    /// Whether any argument contains `needle`.
    pub fn mentions(&self, needle: &str) -> bool {
        self.args.iter().any(|arg| arg.contains(needle))
    }

    /// Whether the arguments contain `words` as a contiguous run.
    pub fn addresses(&self, words: &[&str]) -> bool {
        self.args
            .windows(words.len())
            .any(|window| window.iter().zip(words).all(|(a, w)| a == w))
    }

    /// Value following `flag` in the arguments.
    pub fn flag_value(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|arg| arg == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.action, self.args.join(" "))
    }
}

pub struct MockExecutor<F>
where
    F: Fn(&Invocation) -> Result<String> + Send + Sync + 'static,
{
    response_closure: F,
    invocations: Mutex<Vec<Invocation>>,
}

impl<F> MockExecutor<F>
where
    F: Fn(&Invocation) -> Result<String> + Send + Sync + 'static,
{
    pub fn new(response_closure: F) -> Self {
        Self {
            response_closure,
            invocations: Mutex::new(Vec::new()),
        }
    }

    /// Every call seen so far, oldest first.
    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn count(&self, predicate: impl Fn(&Invocation) -> bool) -> usize {
        self.invocations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|inv| predicate(inv))
            .count()
    }

    /// Recorded calls that change cluster state.
    pub fn mutations(&self) -> Vec<Invocation> {
        self.invocations()
            .into_iter()
            .filter(|inv| inv.action.is_mutating())
            .collect()
    }
}

#[async_trait]
impl<F> Executor for MockExecutor<F>
where
    F: Fn(&Invocation) -> Result<String> + Send + Sync + 'static,
{
    async fn execute(
        &self,
        action: Action,
        identity: Identity,
        scope: Scope,
        args: &[String],
    ) -> Result<String> {
        let invocation = Invocation {
            action,
            identity,
            scope,
            args: args.to_vec(),
        };
        self.invocations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(invocation.clone());
        (self.response_closure)(&invocation)
    }
}

/// The error the CLI returns for a missing object.
pub fn not_found(resource: &str) -> Error {
    Error::Command {
        command: format!("oc get {resource}"),
        status: "exit status: 1".to_string(),
        output: format!("Error from server (NotFound): {resource} not found"),
    }
}

/// A CLI failure with arbitrary output.
pub fn command_failed(output: &str) -> Error {
    Error::Command {
        command: "oc".to_string(),
        status: "exit status: 1".to_string(),
        output: output.to_string(),
    }
}
