// SPDX-FileCopyrightText: OLM e2e harness contributors
//
// SPDX-License-Identifier: MIT

use olm_crds::{InstallModeType, OperatorGroup as OperatorGroupObject, OperatorGroupSpec};
use serde_json::Value;

use super::{merge_patch, object_query};
use crate::check::Check;
use crate::context::TestContext;
use crate::error::Result;
use crate::tracker::{DeletionDescriptor, ResourceKey};

pub const KIND: &str = "og";

/// Namespaces an OperatorGroup selects.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TargetScope {
    /// The namespace the group lives in.
    Own,
    /// One other namespace.
    Single(String),
    /// Every namespace.
    All,
}

impl TargetScope {
    pub fn install_mode(&self) -> InstallModeType {
        match self {
            TargetScope::Own => InstallModeType::OwnNamespace,
            TargetScope::Single(_) => InstallModeType::SingleNamespace,
            TargetScope::All => InstallModeType::AllNamespaces,
        }
    }
}

#[derive(Clone, Debug)]
pub struct OperatorGroup {
    pub name: String,
    pub namespace: String,
    pub scope: TargetScope,
}

impl OperatorGroup {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>, scope: TargetScope) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            scope,
        }
    }

    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(&self.name, KIND, &self.namespace)
    }

    pub fn object(&self) -> OperatorGroupObject {
        let target_namespaces = match &self.scope {
            TargetScope::Own => Some(vec![self.namespace.clone()]),
            TargetScope::Single(namespace) => Some(vec![namespace.clone()]),
            TargetScope::All => None,
        };
        let mut og = OperatorGroupObject::new(&self.name, OperatorGroupSpec { target_namespaces });
        og.metadata.namespace = Some(self.namespace.clone());
        og
    }

    pub fn manifest(&self) -> Result<String> {
        Ok(serde_yaml::to_string(&self.object())?)
    }

    pub async fn create(&self, ctx: &mut TestContext) -> Result<()> {
        ctx.apply_object("operatorgroup", &self.object()).await?;
        ctx.track(DeletionDescriptor::new(KIND, &self.name, &self.namespace));
        ctx.info(format!(
            "created operator group {} for {}",
            self.name,
            self.scope.install_mode()
        ));
        Ok(())
    }

    /// Create the group and wait until it can be read back.
    pub async fn create_with_check(&self, ctx: &mut TestContext) -> Result<()> {
        self.create(ctx).await?;
        Check::present(object_query(KIND, &self.name, &self.namespace, []))
            .check_without_assert(ctx.exec())
            .await
    }

    pub async fn patch(&self, ctx: &TestContext, patch: &Value) -> Result<()> {
        merge_patch(ctx, KIND, &self.name, &self.namespace, patch).await?;
        Ok(())
    }

    pub async fn delete(&self, ctx: &mut TestContext) -> Result<()> {
        ctx.untrack(&self.key()).await?;
        Ok(())
    }
}
