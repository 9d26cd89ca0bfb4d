// SPDX-FileCopyrightText: OLM e2e harness contributors
//
// SPDX-License-Identifier: MIT

use super::object_query;
use crate::check::Check;
use crate::context::TestContext;
use crate::error::Result;
use crate::template::{Params, Template};
use crate::tracker::{DeletionDescriptor, ResourceKey};

pub const KIND: &str = "crd";

/// A cluster-scoped CustomResourceDefinition applied from a fixture.
#[derive(Clone, Debug)]
pub struct Crd {
    pub name: String,
    template: Template,
}

impl Crd {
    pub fn new(name: impl Into<String>, template: Template) -> Self {
        Self {
            name: name.into(),
            template,
        }
    }

    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(&self.name, KIND, "")
    }

    pub async fn create(&self, ctx: &mut TestContext, params: &Params) -> Result<()> {
        ctx.apply(&self.template, params).await?;
        ctx.track(DeletionDescriptor::cluster_scoped(KIND, &self.name));
        Check::present(object_query(KIND, &self.name, "", []))
            .check_without_assert(ctx.exec())
            .await?;
        ctx.info(format!("created crd {}", self.name));
        Ok(())
    }

    pub async fn delete(&self, ctx: &mut TestContext) -> Result<()> {
        ctx.untrack(&self.key()).await?;
        Ok(())
    }
}
