// SPDX-FileCopyrightText: OLM e2e harness contributors
//
// SPDX-License-Identifier: MIT

use std::fmt;

use futures_util::future::join_all;

use crate::error::{Error, Result};
use crate::executor::Executor;
use crate::poll::{
    Comparison, Expectation, Expected, Polarity, Primitive, Query, default_poller,
    expected_resource, is_present_resource,
};
use crate::timer::Poller;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Method {
    /// The object exists (`present`) or does not.
    Present { present: bool },
    /// The query output meets an expectation.
    Expect(Expectation),
}

/// A declarative assertion about cluster state, evaluated by polling.
#[derive(Clone, Debug)]
pub struct Check {
    method: Method,
    query: Query,
    poller: Option<Poller>,
}

impl Check {
    pub fn new(method: Method, query: Query) -> Self {
        Self {
            method,
            query,
            poller: None,
        }
    }

    pub fn present(query: Query) -> Self {
        Self::new(Method::Present { present: true }, query)
    }

    pub fn not_present(query: Query) -> Self {
        Self::new(Method::Present { present: false }, query)
    }

    pub fn expect(
        query: Query,
        comparison: Comparison,
        content: impl Into<Expected>,
        polarity: Polarity,
    ) -> Self {
        Self::new(
            Method::Expect(Expectation::new(comparison, content, polarity)),
            query,
        )
    }

    /// Output equals `content` (or one of its alternatives).
    pub fn equals(query: Query, content: impl Into<Expected>) -> Self {
        Self::expect(query, Comparison::Exact, content, Polarity::MustHold)
    }

    /// Output contains `content` (or one of its alternatives).
    pub fn contains(query: Query, content: impl Into<Expected>) -> Self {
        Self::expect(query, Comparison::Contains, content, Polarity::MustHold)
    }

    pub fn with_poller(mut self, poller: Poller) -> Self {
        self.poller = Some(poller);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    fn poller(&self) -> Poller {
        self.poller.clone().unwrap_or_else(|| match self.method {
            Method::Present { .. } => default_poller(Primitive::Present),
            Method::Expect(_) => default_poller(Primitive::Expect),
        })
    }

    /// Evaluate the check and hand the outcome to the caller.
    pub async fn check_without_assert(&self, exec: &dyn Executor) -> Result<()> {
        let poller = self.poller();
        match &self.method {
            Method::Present { present } => {
                if is_present_resource(exec, &self.query, *present, &poller).await {
                    Ok(())
                } else {
                    Err(Error::CheckFailed {
                        check: self.to_string(),
                    })
                }
            }
            Method::Expect(expectation) => {
                expected_resource(exec, &self.query, expectation, &poller).await
            }
        }
    }

    /// Evaluate the check and fail the running test if it does not hold.
    pub async fn check(&self, exec: &dyn Executor) {
        if let Err(e) = self.check_without_assert(exec).await {
            panic!("{e}");
        }
    }
}

impl fmt::Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.method {
            Method::Present { present: true } => write!(f, "{} is present", self.query),
            Method::Present { present: false } => write!(f, "{} is absent", self.query),
            Method::Expect(expectation) => write!(f, "{} should {expectation}", self.query),
        }
    }
}

/// Independent checks evaluated concurrently.
///
/// Every member runs to completion even when another one fails early; all
/// failures are reported together.
#[derive(Clone, Debug, Default)]
pub struct CheckList(Vec<Check>);

impl CheckList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, check: Check) {
        self.0.push(check);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub async fn check_without_assert(&self, exec: &dyn Executor) -> Result<()> {
        let results = join_all(self.0.iter().map(|c| c.check_without_assert(exec))).await;
        let failures: Vec<Error> = results.into_iter().filter_map(|r| r.err()).collect();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::Checks(failures))
        }
    }

    pub async fn check(&self, exec: &dyn Executor) {
        if let Err(e) = self.check_without_assert(exec).await {
            panic!("{e}");
        }
    }
}

impl FromIterator<Check> for CheckList {
    fn from_iter<I: IntoIterator<Item = Check>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::Action;
    use crate::mock_client::{Invocation, MockExecutor};
    use std::time::Duration;
    use tokio::time::Instant;

    fn quick() -> Poller {
        Poller::new()
            .with_interval(Duration::from_secs(1))
            .with_timeout(Duration::from_secs(10))
    }

    fn phase_query(name: &str) -> Query {
        Query::admin(["csv", name, "-n", "ns", "-o=jsonpath={.status.phase}"])
    }

    fn cluster() -> MockExecutor<impl Fn(&Invocation) -> Result<String> + Send + Sync + 'static> {
        MockExecutor::new(|inv: &Invocation| {
            assert_eq!(inv.action, Action::Get);
            Ok(if inv.mentions("good") {
                "Succeeded".to_string()
            } else {
                "Failed".to_string()
            })
        })
    }

    #[tokio::test(start_paused = true)]
    async fn expect_check_dispatches_to_expected_resource() {
        let exec = cluster();
        Check::equals(phase_query("good"), "Succeeded")
            .with_poller(quick())
            .check(&exec)
            .await;
        let err = Check::equals(phase_query("bad"), "Succeeded")
            .with_poller(quick())
            .check_without_assert(&exec)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn presence_check_reports_check_failed() {
        let exec = MockExecutor::new(|_: &Invocation| Ok(String::new()));
        let err = Check::present(Query::admin(["og", "og-1", "-n", "ns"]))
            .with_poller(quick())
            .check_without_assert(&exec)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "check `og og-1 -n ns is present` did not hold");
        Check::not_present(Query::admin(["og", "og-1", "-n", "ns"]))
            .with_poller(quick())
            .check(&exec)
            .await;
    }

    #[tokio::test(start_paused = true)]
    #[should_panic(expected = "does not equal Succeeded")]
    async fn check_panics_on_failure() {
        Check::equals(phase_query("bad"), "Succeeded")
            .with_poller(quick())
            .check(&cluster())
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn list_runs_every_check_and_reports_all_failures() {
        let exec = cluster();
        let list: CheckList = ["good", "bad-1", "good", "bad-2"]
            .into_iter()
            .map(|name| Check::equals(phase_query(name), "Succeeded").with_poller(quick()))
            .collect();

        let start = Instant::now();
        let err = list.check_without_assert(&exec).await.unwrap_err();

        match err {
            Error::Checks(failures) => {
                assert_eq!(failures.len(), 2);
                assert!(failures[0].to_string().contains("bad-1"));
                assert!(failures[1].to_string().contains("bad-2"));
            }
            other => panic!("unexpected error: {other}"),
        }
        // The failing checks ran side by side, not one after the other.
        assert_eq!(start.elapsed(), Duration::from_secs(10));
        assert_eq!(list.len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_list_passes() {
        CheckList::new().check(&cluster()).await;
    }
}
