// SPDX-FileCopyrightText: OLM e2e harness contributors
//
// SPDX-License-Identifier: MIT

//! Roles, RoleBindings and ServiceAccounts used to restrict what an operator
//! may do in the test namespace.

use k8s_openapi::api::core::v1::ServiceAccount as KubeServiceAccount;
use k8s_openapi::api::rbac::v1::{PolicyRule, RoleBinding as KubeRoleBinding, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use super::{jsonpath, object_query};
use crate::context::TestContext;
use crate::error::{Error, Result};
use crate::poll::{Primitive, default_poller, get_resource, get_resource_no_empty};
use crate::template::{Params, Template};
use crate::tracker::{DeletionDescriptor, ResourceKey};

/// A Role applied from a fixture.
#[derive(Clone, Debug)]
pub struct Role {
    pub name: String,
    pub namespace: String,
    template: Template,
}

impl Role {
    pub const KIND: &'static str = "role";

    pub fn new(name: impl Into<String>, namespace: impl Into<String>, template: Template) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            template,
        }
    }

    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(&self.name, Self::KIND, &self.namespace)
    }

    pub async fn create(&self, ctx: &mut TestContext) -> Result<()> {
        let params = Params::from([
            ("NAME", self.name.as_str()),
            ("NAMESPACE", self.namespace.as_str()),
        ]);
        ctx.apply(&self.template, &params).await?;
        ctx.track(DeletionDescriptor::new(Self::KIND, &self.name, &self.namespace));
        Ok(())
    }

    /// Rules currently granted by the Role.
    pub async fn rules(&self, ctx: &TestContext) -> Result<Vec<PolicyRule>> {
        let query = object_query(
            Self::KIND,
            &self.name,
            &self.namespace,
            [jsonpath("{.rules}").as_str()],
        );
        let output = get_resource_no_empty(ctx.exec(), &query, &default_poller(Primitive::Get))
            .await?;
        serde_json::from_str(&output).map_err(|source| Error::Decode {
            what: format!("rules of role {}", self.name),
            source,
        })
    }

    pub async fn delete(&self, ctx: &mut TestContext) -> Result<()> {
        ctx.untrack(&self.key()).await?;
        Ok(())
    }
}

/// Binds a Role or ClusterRole to a ServiceAccount of the same namespace.
#[derive(Clone, Debug)]
pub struct RoleBinding {
    pub name: String,
    pub namespace: String,
    pub role_kind: String,
    pub role_name: String,
    pub service_account: String,
}

impl RoleBinding {
    pub const KIND: &'static str = "rolebinding";

    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        role: &Role,
        service_account: &ServiceAccount,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            role_kind: "Role".to_string(),
            role_name: role.name.clone(),
            service_account: service_account.name.clone(),
        }
    }

    pub fn with_cluster_role(mut self, cluster_role: impl Into<String>) -> Self {
        self.role_kind = "ClusterRole".to_string();
        self.role_name = cluster_role.into();
        self
    }

    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(&self.name, Self::KIND, &self.namespace)
    }

    pub fn object(&self) -> KubeRoleBinding {
        KubeRoleBinding {
            metadata: ObjectMeta {
                name: Some(self.name.clone()),
                namespace: Some(self.namespace.clone()),
                ..Default::default()
            },
            role_ref: RoleRef {
                api_group: "rbac.authorization.k8s.io".to_string(),
                kind: self.role_kind.clone(),
                name: self.role_name.clone(),
            },
            subjects: Some(vec![Subject {
                kind: "ServiceAccount".to_string(),
                name: self.service_account.clone(),
                namespace: Some(self.namespace.clone()),
                ..Default::default()
            }]),
        }
    }

    pub async fn create(&self, ctx: &mut TestContext) -> Result<()> {
        ctx.apply_object("rolebinding", &self.object()).await?;
        ctx.track(DeletionDescriptor::new(Self::KIND, &self.name, &self.namespace));
        Ok(())
    }

    pub async fn delete(&self, ctx: &mut TestContext) -> Result<()> {
        ctx.untrack(&self.key()).await?;
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct ServiceAccount {
    pub name: String,
    pub namespace: String,
}

impl ServiceAccount {
    pub const KIND: &'static str = "sa";

    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(&self.name, Self::KIND, &self.namespace)
    }

    pub fn object(&self) -> KubeServiceAccount {
        KubeServiceAccount {
            metadata: ObjectMeta {
                name: Some(self.name.clone()),
                namespace: Some(self.namespace.clone()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub async fn create(&self, ctx: &mut TestContext) -> Result<()> {
        ctx.apply_object("serviceaccount", &self.object()).await?;
        ctx.track(DeletionDescriptor::new(Self::KIND, &self.name, &self.namespace));
        Ok(())
    }

    /// The live object, as stored by the API server.
    pub async fn definition(&self, ctx: &TestContext) -> Result<KubeServiceAccount> {
        let query = object_query(Self::KIND, &self.name, &self.namespace, ["-o", "json"]);
        let output = get_resource(ctx.exec(), &query, &default_poller(Primitive::Get)).await?;
        serde_json::from_str(&output).map_err(|source| Error::Decode {
            what: format!("service account {}", self.name),
            source,
        })
    }

    /// Apply the manifest again, restoring the account after a deletion.
    pub async fn reapply(&self, ctx: &mut TestContext) -> Result<()> {
        self.create(ctx).await
    }

    pub async fn delete(&self, ctx: &mut TestContext) -> Result<()> {
        ctx.untrack(&self.key()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::Action;
    use crate::mock_client::{Invocation, MockExecutor};
    use std::sync::Arc;

    fn role() -> Role {
        Role::new("scoped", "test-1", Template::new("role.yaml", "name: ${NAME}"))
    }

    #[tokio::test(start_paused = true)]
    async fn rules_decode_the_jsonpath_output() {
        let exec = Arc::new(MockExecutor::new(|_: &Invocation| {
            Ok(r#"[{"apiGroups":[""],"resources":["configmaps"],"verbs":["get","list"]}]"#
                .to_string())
        }));
        let ctx = TestContext::new("rbac", "test-1", exec);
        let rules = role().rules(&ctx).await.unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].verbs, ["get", "list"]);
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_rules_fail_without_retrying() {
        let exec = Arc::new(MockExecutor::new(|_: &Invocation| {
            Ok("map[verbs:[get]]".to_string())
        }));
        let ctx = TestContext::new("rbac", "test-1", exec.clone());
        let err = role().rules(&ctx).await.unwrap_err();
        assert!(matches!(err, Error::Decode { .. }), "{err}");
        assert_eq!(exec.invocations().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn binding_targets_the_service_account() {
        let exec = Arc::new(MockExecutor::new(|inv: &Invocation| {
            assert_eq!(inv.action, Action::Apply);
            Ok("created".to_string())
        }));
        let mut ctx = TestContext::new("rbac", "test-1", exec);
        let sa = ServiceAccount::new("scoped-sa", "test-1");
        let binding = RoleBinding::new("scoped-bindings", "test-1", &role(), &sa);
        binding.create(&mut ctx).await.unwrap();
        sa.create(&mut ctx).await.unwrap();

        let written = std::fs::read_dir(ctx.output_dir())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .find(|path| path.to_string_lossy().contains("rolebinding-"))
            .unwrap();
        let back: KubeRoleBinding =
            serde_yaml::from_str(&std::fs::read_to_string(written).unwrap()).unwrap();
        assert_eq!(back.role_ref.kind, "Role");
        assert_eq!(back.role_ref.name, "scoped");
        let subjects = back.subjects.unwrap();
        assert_eq!(subjects[0].kind, "ServiceAccount");
        assert_eq!(subjects[0].name, "scoped-sa");
        assert_eq!(subjects[0].namespace.as_deref(), Some("test-1"));
        assert_eq!(ctx.tracker().len(), 2);
        std::fs::remove_dir_all(ctx.output_dir()).unwrap();
    }
}
