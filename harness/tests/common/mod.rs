// SPDX-FileCopyrightText: OLM e2e harness contributors
//
// SPDX-License-Identifier: MIT

use std::sync::Arc;

use olm_harness::mock_client::{Invocation, MockExecutor};
use olm_harness::{Action, Result, TestContext};

pub const NAMESPACE: &str = "test-1";

pub fn context<F>(test_name: &str, exec: &Arc<MockExecutor<F>>) -> TestContext
where
    F: Fn(&Invocation) -> Result<String> + Send + Sync + 'static,
{
    olm_harness::context::init_logging();
    TestContext::new(test_name, NAMESPACE, exec.clone())
}

/// The JSONPath expression a `get` asks for, if any.
pub fn jsonpath(inv: &Invocation) -> Option<&str> {
    inv.args
        .iter()
        .find_map(|arg| arg.strip_prefix("-o=jsonpath="))
}

/// `kind/name` of every delete, in call order.
pub fn deletions<F>(exec: &MockExecutor<F>) -> Vec<String>
where
    F: Fn(&Invocation) -> Result<String> + Send + Sync + 'static,
{
    exec.invocations()
        .into_iter()
        .filter(|inv| inv.action == Action::Delete)
        .map(|inv| {
            let n = inv.args.len();
            format!("{}/{}", inv.args[n - 2], inv.args[n - 1])
        })
        .collect()
}
