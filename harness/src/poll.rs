// SPDX-FileCopyrightText: OLM e2e harness contributors
//
// SPDX-License-Identifier: MIT

//! Poll-until-condition reads and deletes.
//!
//! Every status read against the cluster may be stale, so each primitive
//! re-runs one CLI call per iteration of a [`Poller`] until the condition
//! holds or the poller gives up.

use std::fmt;
use std::time::Duration;

use log::{debug, warn};

use crate::error::{Error, Result};
use crate::executor::{Action, Executor, Identity, Scope};
use crate::timer::Poller;

/// Separator between acceptable alternatives in an expected value.
pub const ALTERNATIVES_DELIMITER: &str = "+2+";

/// Identity, scope and arguments of a CLI call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Query {
    pub identity: Identity,
    pub scope: Scope,
    pub args: Vec<String>,
}

impl Query {
    pub fn new<I, S>(identity: Identity, scope: Scope, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            identity,
            scope,
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Admin call that spells out its own namespace, if any.
    pub fn admin<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(Identity::Admin, Scope::Cluster, args)
    }

    /// User call pinned to the test namespace.
    pub fn user<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(Identity::User, Scope::Namespaced, args)
    }

    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = identity;
        self
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub async fn run(&self, exec: &dyn Executor, action: Action) -> Result<String> {
        exec.execute(action, self.identity, self.scope, &self.args)
            .await
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.args.join(" "))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Comparison {
    /// Output equals one alternative.
    Exact,
    /// Output contains one alternative.
    Contains,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Polarity {
    MustHold,
    MustNotHold,
}

impl Polarity {
    pub fn holds(&self) -> bool {
        matches!(self, Polarity::MustHold)
    }
}

/// One or more acceptable values for a CLI output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Expected(Vec<String>);

impl Expected {
    /// Split `content` on [`ALTERNATIVES_DELIMITER`].
    ///
    /// Empty alternatives left by stray delimiters are dropped. An empty
    /// `content` stays a single empty alternative, matching empty output.
    pub fn parse(content: &str) -> Self {
        let alternatives: Vec<String> = content
            .split(ALTERNATIVES_DELIMITER)
            .filter(|alternative| !alternative.is_empty())
            .map(str::to_string)
            .collect();
        if alternatives.is_empty() {
            return Self(vec![String::new()]);
        }
        Self(alternatives)
    }

    pub fn any_of<I, S>(alternatives: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(alternatives.into_iter().map(Into::into).collect())
    }

    pub fn alternatives(&self) -> &[String] {
        &self.0
    }

    pub fn matches(&self, output: &str, comparison: Comparison) -> bool {
        self.0.iter().any(|alternative| match comparison {
            Comparison::Exact => output == alternative,
            Comparison::Contains => output.contains(alternative.as_str()),
        })
    }
}

impl From<&str> for Expected {
    fn from(content: &str) -> Self {
        Self::parse(content)
    }
}

impl From<String> for Expected {
    fn from(content: String) -> Self {
        Self::parse(&content)
    }
}

impl fmt::Display for Expected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(" or "))
    }
}

/// What `expected_resource` waits for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Expectation {
    pub comparison: Comparison,
    pub content: Expected,
    pub polarity: Polarity,
}

impl Expectation {
    pub fn new(comparison: Comparison, content: impl Into<Expected>, polarity: Polarity) -> Self {
        Self {
            comparison,
            content: content.into(),
            polarity,
        }
    }

    /// Whether one observed output satisfies the expectation.
    pub fn is_met_by(&self, output: &str) -> bool {
        self.content.matches(output, self.comparison) == self.polarity.holds()
    }
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match (self.polarity, self.comparison) {
            (Polarity::MustHold, Comparison::Exact) => "equal",
            (Polarity::MustHold, Comparison::Contains) => "contain",
            (Polarity::MustNotHold, Comparison::Exact) => "not equal",
            (Polarity::MustNotHold, Comparison::Contains) => "not contain",
        };
        write!(f, "{verb} {}", self.content)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Primitive {
    Get,
    Present,
    Expect,
    Remove,
}

/// Poll timings used when a call site does not bring its own.
pub fn default_poller(primitive: Primitive) -> Poller {
    let timeout = match primitive {
        Primitive::Get => 150,
        Primitive::Present => 70,
        Primitive::Expect => 150,
        Primitive::Remove => 120,
    };
    Poller::new()
        .with_interval(Duration::from_secs(3))
        .with_timeout(Duration::from_secs(timeout))
}

/// Retry a `get` until the CLI succeeds and return its output.
pub async fn get_resource(exec: &dyn Executor, query: &Query, poller: &Poller) -> Result<String> {
    poller
        .clone()
        .with_error_message(format!("can not get {query}"))
        .poll_async(move || async move { query.run(exec, Action::Get).await })
        .await
}

/// Like [`get_resource`], but an empty output also counts as a miss.
pub async fn get_resource_no_empty(
    exec: &dyn Executor,
    query: &Query,
    poller: &Poller,
) -> Result<String> {
    poller
        .clone()
        .with_error_message(format!("can not get {query} with non-empty output"))
        .poll_async(move || async move {
            match query.run(exec, Action::Get).await {
                Ok(output) if !output.trim().is_empty() => Ok(output),
                Ok(_) => Err("output is empty".to_string()),
                Err(e) => Err(e.to_string()),
            }
        })
        .await
}

/// Wait until the object is present (`present`) or absent (`!present`).
///
/// Never fails; a timeout is reported as `false`.
pub async fn is_present_resource(
    exec: &dyn Executor,
    query: &Query,
    present: bool,
    poller: &Poller,
) -> bool {
    let query = query.clone().with_arg("--ignore-not-found");
    let wanted = if present { "present" } else { "absent" };
    let query = &query;
    let result = poller
        .clone()
        .with_error_message(format!("{query} is not {wanted}"))
        .poll_async(move || async move {
            let output = query.run(exec, Action::Get).await?;
            if output.is_empty() != present {
                Ok(())
            } else {
                Err(Error::UnexpectedOutput {
                    query: query.to_string(),
                    reason: format!("object is not {wanted} yet"),
                })
            }
        })
        .await;

    match result {
        Ok(()) => true,
        Err(e) => {
            warn!("{e}");
            false
        }
    }
}

/// Wait until the output of `query` satisfies `expectation`.
pub async fn expected_resource(
    exec: &dyn Executor,
    query: &Query,
    expectation: &Expectation,
    poller: &Poller,
) -> Result<()> {
    poller
        .clone()
        .with_error_message(format!("output of {query} does not {expectation}"))
        .poll_async(move || async move {
            let output = query.run(exec, Action::Get).await?;
            if expectation.is_met_by(&output) {
                Ok(())
            } else {
                Err(Error::UnexpectedOutput {
                    query: query.to_string(),
                    reason: format!("got {output:?}"),
                })
            }
        })
        .await
}

/// Delete the object and wait until a `get` no longer finds it.
///
/// A delete that reports the object as already gone is a success on its own.
pub async fn remove_resource(exec: &dyn Executor, query: &Query, poller: &Poller) -> Result<()> {
    match query.run(exec, Action::Delete).await {
        Ok(_) => {}
        Err(e) if e.is_not_found() => {
            debug!("{query} already absent");
            return Ok(());
        }
        Err(e) => return Err(e),
    }

    poller
        .clone()
        .with_error_message(format!("{query} still exists after deletion"))
        .poll_async(move || async move {
            match query.run(exec, Action::Get).await {
                Err(e) if e.is_not_found() => Ok(()),
                Err(e) => Err(e.to_string()),
                Ok(_) => Err("still present".to_string()),
            }
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_client::{Invocation, MockExecutor, not_found};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast() -> Poller {
        Poller::new()
            .with_interval(Duration::from_secs(3))
            .with_timeout(Duration::from_secs(12))
    }

    fn query() -> Query {
        Query::admin(["sub", "etcd", "-n", "test-1", "-o=jsonpath={.status.state}"])
    }

    #[test]
    fn expected_alternatives_split_on_delimiter() {
        let expected = Expected::parse("A+2+B");
        assert_eq!(expected.alternatives(), ["A", "B"]);
        assert!(expected.matches("A", Comparison::Exact));
        assert!(expected.matches("B", Comparison::Exact));
        assert!(!expected.matches("AB", Comparison::Exact));
        assert!(expected.matches("xxBxx", Comparison::Contains));
        assert!(!expected.matches("C", Comparison::Contains));
    }

    #[test]
    fn stray_delimiters_do_not_match_everything() {
        let trailing = Expected::parse("A+2+");
        assert_eq!(trailing.alternatives(), ["A"]);
        assert!(!trailing.matches("Pending", Comparison::Contains));
        assert_eq!(Expected::parse("+2+A+2++2+B").alternatives(), ["A", "B"]);

        let must_not = Expectation::new(Comparison::Contains, "Failed+2+", Polarity::MustNotHold);
        assert!(must_not.is_met_by("Succeeded"));
        assert!(!must_not.is_met_by("InstallFailed"));

        let empty = Expected::parse("");
        assert!(empty.matches("", Comparison::Exact));
        assert!(!empty.matches("install-abc", Comparison::Exact));
    }

    #[test]
    fn expectation_truth_table() {
        let cases = [
            (Comparison::Exact, Polarity::MustHold, "Succeeded", true),
            (Comparison::Exact, Polarity::MustHold, "Succeeded!", false),
            (Comparison::Exact, Polarity::MustNotHold, "Failed", true),
            (Comparison::Exact, Polarity::MustNotHold, "Succeeded", false),
            (Comparison::Contains, Polarity::MustHold, "xSucceededx", true),
            (Comparison::Contains, Polarity::MustHold, "Pending", false),
            (Comparison::Contains, Polarity::MustNotHold, "Pending", true),
            (Comparison::Contains, Polarity::MustNotHold, "xSucceededx", false),
        ];
        for (comparison, polarity, output, met) in cases {
            let expectation = Expectation::new(comparison, "Succeeded", polarity);
            assert_eq!(
                expectation.is_met_by(output),
                met,
                "{comparison:?} {polarity:?} {output:?}"
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn present_is_true_once_output_appears() {
        let calls = AtomicUsize::new(0);
        let exec = MockExecutor::new(move |inv: &Invocation| {
            assert_eq!(inv.args.last().map(String::as_str), Some("--ignore-not-found"));
            match calls.fetch_add(1, Ordering::SeqCst) {
                0 => Ok(String::new()),
                1 => Err(not_found("sub etcd")),
                _ => Ok("etcd".to_string()),
            }
        });
        assert!(is_present_resource(&exec, &query(), true, &fast()).await);
        assert_eq!(exec.invocations().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn present_is_false_when_output_never_appears() {
        let exec = MockExecutor::new(|_: &Invocation| Ok(String::new()));
        assert!(!is_present_resource(&exec, &query(), true, &fast()).await);
        assert!(is_present_resource(&exec, &query(), false, &fast()).await);
    }

    #[tokio::test(start_paused = true)]
    async fn exact_alternatives_match_either_value() {
        let calls = AtomicUsize::new(0);
        let exec = MockExecutor::new(move |_: &Invocation| {
            Ok(match calls.fetch_add(1, Ordering::SeqCst) {
                0 => "AB".to_string(),
                1 => "C".to_string(),
                _ => "B".to_string(),
            })
        });
        let expectation = Expectation::new(Comparison::Exact, "A+2+B", Polarity::MustHold);
        expected_resource(&exec, &query(), &expectation, &fast())
            .await
            .unwrap();
        assert_eq!(exec.invocations().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn must_not_contain_stops_on_first_clean_output() {
        let calls = AtomicUsize::new(0);
        let exec = MockExecutor::new(move |_: &Invocation| {
            Ok(match calls.fetch_add(1, Ordering::SeqCst) {
                0 => "phase=Failed".to_string(),
                1 => "phase=Pending".to_string(),
                _ => "phase=Failed".to_string(),
            })
        });
        let expectation = Expectation::new(
            Comparison::Contains,
            "Failed+2+Unknown",
            Polarity::MustNotHold,
        );
        expected_resource(&exec, &query(), &expectation, &fast())
            .await
            .unwrap();
        assert_eq!(exec.invocations().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn expectation_times_out_naming_the_query() {
        let exec = MockExecutor::new(|_: &Invocation| Ok("UpgradePending".to_string()));
        let expectation = Expectation::new(Comparison::Exact, "AtLatestKnown", Polarity::MustHold);
        let err = expected_resource(&exec, &query(), &expectation, &fast())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
        let message = err.to_string();
        assert!(message.contains("sub etcd -n test-1"), "{message}");
        assert!(message.contains("equal AtLatestKnown"), "{message}");
    }

    #[tokio::test(start_paused = true)]
    async fn get_no_empty_skips_blank_output() {
        let calls = AtomicUsize::new(0);
        let exec = MockExecutor::new(move |_: &Invocation| {
            Ok(match calls.fetch_add(1, Ordering::SeqCst) {
                0 => "   ".to_string(),
                _ => "etcdoperator.v0.9.4".to_string(),
            })
        });
        let csv = get_resource_no_empty(&exec, &query(), &fast())
            .await
            .unwrap();
        assert_eq!(csv, "etcdoperator.v0.9.4");
    }

    #[tokio::test(start_paused = true)]
    async fn get_times_out_when_cli_keeps_failing() {
        let exec = MockExecutor::new(|_: &Invocation| Err(not_found("sub etcd")));
        let err = get_resource(&exec, &query(), &fast()).await.unwrap_err();
        assert!(matches!(err, Error::Timeout { attempts: 5, .. }), "{err}");
    }

    #[tokio::test(start_paused = true)]
    async fn remove_treats_not_found_delete_as_done() {
        let exec = MockExecutor::new(|inv: &Invocation| match inv.action {
            Action::Delete => Err(not_found("sub etcd")),
            _ => panic!("unexpected call {inv}"),
        });
        remove_resource(&exec, &Query::admin(["-n", "ns", "sub", "etcd"]), &fast())
            .await
            .unwrap();
        assert_eq!(exec.invocations().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn remove_waits_until_get_reports_not_found() {
        let gets = AtomicUsize::new(0);
        let exec = MockExecutor::new(move |inv: &Invocation| match inv.action {
            Action::Delete => Ok("subscription deleted".to_string()),
            Action::Get if gets.fetch_add(1, Ordering::SeqCst) < 2 => Ok("etcd".to_string()),
            Action::Get => Err(not_found("sub etcd")),
            _ => panic!("unexpected call {inv}"),
        });
        remove_resource(&exec, &Query::admin(["-n", "ns", "sub", "etcd"]), &fast())
            .await
            .unwrap();
        assert_eq!(exec.count(|inv| inv.action == Action::Get), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn remove_propagates_other_delete_errors() {
        let exec = MockExecutor::new(|_: &Invocation| {
            Err(Error::Command {
                command: "oc delete".to_string(),
                status: "exit status: 1".to_string(),
                output: "Error from server (Forbidden)".to_string(),
            })
        });
        let err = remove_resource(&exec, &Query::admin(["sub", "etcd"]), &fast())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Command { .. }));
    }

    #[test]
    fn default_timings_follow_convergence_latency() {
        assert_eq!(
            default_poller(Primitive::Present).timeout(),
            Duration::from_secs(70)
        );
        assert_eq!(
            default_poller(Primitive::Expect).interval(),
            Duration::from_secs(3)
        );
    }
}
