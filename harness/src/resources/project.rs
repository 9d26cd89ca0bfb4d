// SPDX-FileCopyrightText: OLM e2e harness contributors
//
// SPDX-License-Identifier: MIT

use super::object_query;
use crate::check::Check;
use crate::context::TestContext;
use crate::error::Result;
use crate::executor::{Action, Identity, Scope};
use crate::poll::Query;
use crate::tracker::{DeletionDescriptor, ResourceKey};

pub const KIND: &str = "project";

/// A namespace created through `new-project`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Project {
    pub name: String,
}

impl Project {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(&self.name, KIND, "")
    }

    pub async fn create(&self, ctx: &mut TestContext) -> Result<()> {
        Query::new(
            Identity::Admin,
            Scope::Cluster,
            [self.name.as_str(), "--skip-config-write"],
        )
        .run(ctx.exec(), Action::NewProject)
        .await?;
        ctx.track(DeletionDescriptor::cluster_scoped(KIND, &self.name));
        ctx.info(format!("created project {}", self.name));
        Ok(())
    }

    /// Create the project and wait until it is served.
    pub async fn create_with_check(&self, ctx: &mut TestContext) -> Result<()> {
        self.create(ctx).await?;
        Check::present(object_query(KIND, &self.name, "", []))
            .check_without_assert(ctx.exec())
            .await
    }

    /// Set `labels` (`key=value`) on the namespace, overwriting existing ones.
    pub async fn label(&self, ctx: &TestContext, labels: &[&str]) -> Result<()> {
        let mut args = vec!["namespace", self.name.as_str()];
        args.extend_from_slice(labels);
        args.push("--overwrite");
        Query::admin(args).run(ctx.exec(), Action::Label).await?;
        Ok(())
    }

    pub async fn delete(&self, ctx: &mut TestContext) -> Result<()> {
        ctx.untrack(&self.key()).await?;
        Ok(())
    }
}
