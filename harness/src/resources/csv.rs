// SPDX-FileCopyrightText: OLM e2e harness contributors
//
// SPDX-License-Identifier: MIT

use olm_crds::ClusterServiceVersion;

use super::object_query;
use crate::context::TestContext;
use crate::error::{Error, Result};
use crate::poll::{Primitive, default_poller, get_resource};
use crate::tracker::{DeletionDescriptor, ResourceKey};

/// A ClusterServiceVersion installed by OLM.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Csv {
    pub name: String,
    pub namespace: String,
}

impl Csv {
    pub const KIND: &'static str = "csv";

    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(&self.name, Self::KIND, &self.namespace)
    }

    /// Track a CSV the test did not install through a [`super::Subscription`].
    pub fn track(&self, ctx: &mut TestContext) {
        ctx.track(DeletionDescriptor::new(Self::KIND, &self.name, &self.namespace));
    }

    pub async fn get(&self, ctx: &TestContext) -> Result<ClusterServiceVersion> {
        let query = object_query(Self::KIND, &self.name, &self.namespace, ["-o", "json"]);
        let output = get_resource(ctx.exec(), &query, &default_poller(Primitive::Get)).await?;
        serde_json::from_str(&output).map_err(|source| Error::Decode {
            what: format!("csv {}", self.name),
            source,
        })
    }

    pub async fn delete(&self, ctx: &mut TestContext) -> Result<()> {
        if !ctx.untrack(&self.key()).await? {
            // Not created by this test case; delete it directly.
            DeletionDescriptor::new(Self::KIND, &self.name, &self.namespace)
                .delete(ctx.exec(), &default_poller(Primitive::Remove))
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::Action;
    use crate::mock_client::{Invocation, MockExecutor, not_found};
    use olm_crds::InstallModeType;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn get_decodes_install_modes_and_phase() {
        let exec = Arc::new(MockExecutor::new(|_: &Invocation| {
            Ok(r#"{
                "apiVersion": "operators.coreos.com/v1alpha1",
                "kind": "ClusterServiceVersion",
                "metadata": {"name": "etcdoperator.v0.9.4", "namespace": "test-1"},
                "spec": {
                  "displayName": "etcd",
                  "version": "0.9.4",
                  "installModes": [
                    {"type": "OwnNamespace", "supported": true},
                    {"type": "AllNamespaces", "supported": false}
                  ]
                },
                "status": {"phase": "Succeeded", "reason": "InstallSucceeded"}
            }"#
            .to_string())
        }));
        let ctx = TestContext::new("csv", "test-1", exec);
        let csv = Csv::new("etcdoperator.v0.9.4", "test-1").get(&ctx).await.unwrap();
        assert_eq!(csv.spec.install_modes[0].mode, InstallModeType::OwnNamespace);
        assert_eq!(
            csv.status.and_then(|s| s.phase).as_deref(),
            Some("Succeeded")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn delete_of_an_untracked_csv_still_reaches_the_cluster() {
        let exec = Arc::new(MockExecutor::new(|inv: &Invocation| match inv.action {
            Action::Delete => Ok("deleted".to_string()),
            _ => Err(not_found("csv")),
        }));
        let mut ctx = TestContext::new("csv", "test-1", exec.clone());
        Csv::new("etcdoperator.v0.9.4", "test-1")
            .delete(&mut ctx)
            .await
            .unwrap();
        assert_eq!(exec.count(|inv| inv.action == Action::Delete), 1);
    }
}
