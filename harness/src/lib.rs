// SPDX-FileCopyrightText: OLM e2e harness contributors
//
// SPDX-License-Identifier: MIT

//! End-to-end harness for Operator Lifecycle Manager installs.
//!
//! Everything goes through the cluster CLI: objects are created by applying
//! rendered manifests and read back through JSONPath queries that are polled
//! until the cluster converges.

pub mod check;
pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod mock_client;
pub mod poll;
pub mod resources;
pub mod scenario;
pub mod template;
pub mod timer;
pub mod tracker;

pub use check::{Check, CheckList, Method};
pub use config::CliConfig;
pub use context::TestContext;
pub use error::{Error, Result};
pub use executor::{Action, CliExecutor, Executor, Identity, Scope};
pub use poll::{Comparison, Expectation, Expected, Polarity, Query};
pub use template::{Params, Template};
pub use timer::Poller;
pub use tracker::{DeletionDescriptor, ResourceKey, ResourceTracker, TrackerRegistry};

/// Declare an async test that knows its own name as `TEST_NAME`.
#[macro_export]
macro_rules! named_test {
    ($(#[$meta:meta])* async fn $name:ident() -> anyhow::Result<()> { $($body:tt)* }) => {
        #[tokio::test]
        $(#[$meta])*
        async fn $name() -> anyhow::Result<()> {
            const TEST_NAME: &str = stringify!($name);
            $($body)*
        }
    };
}

/// Build a [`TestContext`] from the environment for the enclosing
/// [`named_test!`].
#[macro_export]
macro_rules! setup {
    () => {{ $crate::TestContext::from_env(TEST_NAME) }};
}
