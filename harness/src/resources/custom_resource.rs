// SPDX-FileCopyrightText: OLM e2e harness contributors
//
// SPDX-License-Identifier: MIT

use std::time::Duration;

use super::{jsonpath, object_query};
use crate::check::Check;
use crate::context::TestContext;
use crate::error::Result;
use crate::poll::Expected;
use crate::template::{Params, Template};
use crate::timer::Poller;
use crate::tracker::{DeletionDescriptor, ResourceKey};

/// Poll timings for operands, which can take minutes to reconcile.
pub fn readiness_poller() -> Poller {
    Poller::new()
        .with_interval(Duration::from_secs(10))
        .with_timeout(Duration::from_secs(600))
}

/// An instance of an API the operator under test owns.
#[derive(Clone, Debug)]
pub struct CustomResource {
    /// Resource name as the CLI accepts it, e.g. `etcdcluster`.
    pub kind: String,
    pub name: String,
    pub namespace: String,
    template: Template,
    params: Params,
}

impl CustomResource {
    pub fn new(
        kind: impl Into<String>,
        name: impl Into<String>,
        namespace: impl Into<String>,
        template: Template,
    ) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            namespace: namespace.into(),
            template,
            params: Params::new(),
        }
    }

    /// Extra placeholder values for the fixture.
    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(&self.name, &self.kind, &self.namespace)
    }

    fn params(&self, operator_namespace: &str) -> Params {
        self.params
            .clone()
            .set("NAME", self.name.as_str())
            .set("NAMESPACE", self.namespace.as_str())
            .set("OPERATOR_NAMESPACE", operator_namespace)
    }

    pub async fn create(&self, ctx: &mut TestContext, operator_namespace: &str) -> Result<()> {
        ctx.apply(&self.template, &self.params(operator_namespace))
            .await?;
        ctx.track(DeletionDescriptor::new(&self.kind, &self.name, &self.namespace));
        ctx.info(format!("created {} {}", self.kind, self.name));
        Ok(())
    }

    /// A check that the JSONPath `expr` evaluates to `expected`.
    pub fn status_check(&self, expr: &str, expected: impl Into<Expected>) -> Check {
        Check::equals(
            object_query(&self.kind, &self.name, &self.namespace, [jsonpath(expr).as_str()]),
            expected,
        )
        .with_poller(readiness_poller())
    }

    /// Wait until the JSONPath `expr` evaluates to `expected`.
    pub async fn check_status(
        &self,
        ctx: &TestContext,
        expr: &str,
        expected: impl Into<Expected>,
    ) -> Result<()> {
        self.status_check(expr, expected)
            .check_without_assert(ctx.exec())
            .await
    }

    pub async fn delete(&self, ctx: &mut TestContext) -> Result<()> {
        ctx.untrack(&self.key()).await?;
        Ok(())
    }
}
