// SPDX-FileCopyrightText: OLM e2e harness contributors
//
// SPDX-License-Identifier: MIT

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ConfigMap as KubeConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde_json::json;

use super::{merge_patch, object_query};
use crate::context::TestContext;
use crate::error::{Error, Result};
use crate::poll::{Primitive, default_poller, get_resource};
use crate::template::{Params, Template};
use crate::tracker::{DeletionDescriptor, ResourceKey};

pub const KIND: &str = "cm";

#[derive(Clone, Debug)]
enum Source {
    Data(BTreeMap<String, String>),
    Fixture(Template, Params),
}

#[derive(Clone, Debug)]
pub struct ConfigMap {
    pub name: String,
    pub namespace: String,
    source: Source,
}

impl ConfigMap {
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        data: BTreeMap<String, String>,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            source: Source::Data(data),
        }
    }

    /// ConfigMap holding a single entry.
    pub fn with_entry(
        name: impl Into<String>,
        namespace: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self::new(name, namespace, BTreeMap::from([(key.into(), value.into())]))
    }

    /// ConfigMap rendered from a fixture; `NAME` and `NAMESPACE` are filled in.
    pub fn from_template(
        name: impl Into<String>,
        namespace: impl Into<String>,
        template: Template,
        params: Params,
    ) -> Self {
        let name = name.into();
        let namespace = namespace.into();
        let params = params
            .set("NAME", name.as_str())
            .set("NAMESPACE", namespace.as_str());
        Self {
            name,
            namespace,
            source: Source::Fixture(template, params),
        }
    }

    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(&self.name, KIND, &self.namespace)
    }

    fn object(&self, data: &BTreeMap<String, String>) -> KubeConfigMap {
        KubeConfigMap {
            metadata: ObjectMeta {
                name: Some(self.name.clone()),
                namespace: Some(self.namespace.clone()),
                ..Default::default()
            },
            data: Some(data.clone()),
            ..Default::default()
        }
    }

    pub fn manifest(&self) -> Result<String> {
        match &self.source {
            Source::Data(data) => Ok(serde_yaml::to_string(&self.object(data))?),
            Source::Fixture(template, params) => template.render(params),
        }
    }

    pub async fn create(&self, ctx: &mut TestContext) -> Result<()> {
        match &self.source {
            Source::Data(data) => ctx.apply_object("configmap", &self.object(data)).await?,
            Source::Fixture(template, params) => ctx.apply(template, params).await?,
        };
        ctx.track(DeletionDescriptor::new(KIND, &self.name, &self.namespace));
        Ok(())
    }

    /// Merge `entries` into the data of the ConfigMap.
    pub async fn patch(&self, ctx: &TestContext, entries: &BTreeMap<String, String>) -> Result<()> {
        merge_patch(ctx, KIND, &self.name, &self.namespace, &json!({"data": entries})).await?;
        Ok(())
    }

    pub async fn data(&self, ctx: &TestContext) -> Result<BTreeMap<String, String>> {
        let query = object_query(KIND, &self.name, &self.namespace, ["-o", "json"]);
        let output = get_resource(ctx.exec(), &query, &default_poller(Primitive::Get)).await?;
        let cm: KubeConfigMap = serde_json::from_str(&output).map_err(|source| Error::Decode {
            what: format!("configmap {}", self.name),
            source,
        })?;
        Ok(cm.data.unwrap_or_default())
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

    #[test]
    fn values_with_yaml_syntax_survive_serialization() {
        let value = "{\"level\": \"debug\"}\nsecond: line";
        let cm = ConfigMap::with_entry("cfg", "test-1", "config.json", value);
        let manifest = cm.manifest().unwrap();

        let back: KubeConfigMap = serde_yaml::from_str(&manifest).unwrap();
        assert_eq!(back.metadata.name.as_deref(), Some("cfg"));
        assert_eq!(back.metadata.namespace.as_deref(), Some("test-1"));
        let data = back.data.unwrap();
        assert_eq!(data.get("config.json").map(String::as_str), Some(value));
    }

    #[tokio::test(start_paused = true)]
    async fn fixture_gets_name_and_namespace() {
        let exec = Arc::new(MockExecutor::new(|inv: &Invocation| {
            assert_eq!(inv.action, Action::Apply);
            Ok("configmap/cfg created".to_string())
        }));
        let mut ctx = TestContext::new("cm", "test-1", exec);
        let cm = ConfigMap::from_template(
            "cfg",
            "test-1",
            Template::new("cm.yaml", "name: ${NAME}\nnamespace: ${NAMESPACE}\nmode: ${MODE}"),
            Params::from([("MODE", "info")]),
        );
        assert_eq!(cm.manifest().unwrap(), "name: cfg\nnamespace: test-1\nmode: info");
        cm.create(&mut ctx).await.unwrap();
        assert!(ctx.tracker().contains(&cm.key()));
        std::fs::remove_dir_all(ctx.output_dir()).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn patch_then_read_back() {
        let exec = Arc::new(MockExecutor::new(|inv: &Invocation| match inv.action {
            Action::Patch => Ok("configmap/cfg patched".to_string()),
            Action::Get => Ok(r#"{
                "apiVersion": "v1",
                "kind": "ConfigMap",
                "metadata": {"name": "cfg", "namespace": "test-1"},
                "data": {"mode": "debug", "replicas": "2"}
            }"#
            .to_string()),
            _ => panic!("unexpected call {inv}"),
        }));
        let ctx = TestContext::new("cm", "test-1", exec.clone());
        let cm = ConfigMap::with_entry("cfg", "test-1", "mode", "info");

        let entries = BTreeMap::from([("mode".to_string(), "debug".to_string())]);
        cm.patch(&ctx, &entries).await.unwrap();
        assert_eq!(
            exec.invocations()[0].flag_value("-p"),
            Some(r#"{"data":{"mode":"debug"}}"#)
        );

        let data = cm.data(&ctx).await.unwrap();
        assert_eq!(data.get("mode").map(String::as_str), Some("debug"));
        assert_eq!(data.len(), 2);
    }
}
