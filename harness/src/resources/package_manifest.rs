// SPDX-FileCopyrightText: OLM e2e harness contributors
//
// SPDX-License-Identifier: MIT

//! What a catalog offers for one package, read once before installing it.

use olm_crds::{InstallMode, InstallModeType};
use serde::Serialize;
use serde_json::{Map, Value};

use super::{jsonpath, object_query};
use crate::context::TestContext;
use crate::error::{Error, Result};
use crate::poll::{Primitive, default_poller, get_resource_no_empty};

pub const KIND: &str = "packagemanifest";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PackageManifestSnapshot {
    pub name: String,
    /// Namespace the manifest was read from.
    pub namespace: String,
    pub catalog_source: String,
    pub catalog_namespace: String,
    pub default_channel: String,
    /// Channel the remaining fields describe.
    pub channel: String,
    /// Head CSV of `channel`.
    pub csv_version: String,
    pub own_namespace: bool,
    pub single_namespace: bool,
    pub all_namespaces: bool,
}

impl PackageManifestSnapshot {
    /// Read the manifest of `package` from the catalog namespace. The channel
    /// defaults to the package's default channel.
    pub async fn fetch(ctx: &TestContext, package: &str, channel: Option<&str>) -> Result<Self> {
        let namespace = ctx.catalog_namespace();
        let read = |expr: String| {
            let query = object_query(KIND, package, namespace, [jsonpath(&expr).as_str()]);
            async move {
                get_resource_no_empty(ctx.exec(), &query, &default_poller(Primitive::Get)).await
            }
        };

        let summary_expr =
            "{.status.catalogSource}:{.status.catalogSourceNamespace}:{.status.defaultChannel}";
        let summary = read(summary_expr.to_string()).await?;
        let mut parts = summary.splitn(3, ':').filter(|part| !part.is_empty());
        let (Some(catalog_source), Some(catalog_namespace), Some(default_channel)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(Error::UnexpectedOutput {
                query: format!("{KIND} {package} {summary_expr}"),
                reason: format!("got {summary:?}"),
            });
        };

        let channel = channel.unwrap_or(default_channel).to_string();
        let selector = format!("{{.status.channels[?(@.name==\"{channel}\")]");
        let csv_version = read(format!("{selector}.currentCSV}}")).await?;
        let modes = read(format!("{selector}.currentCSVDesc.installModes}}")).await?;
        let modes = parse_install_modes(&modes)?;
        let supports = |mode: InstallModeType| modes.iter().any(|m| m.mode == mode && m.supported);

        Ok(Self {
            name: package.to_string(),
            namespace: namespace.to_string(),
            catalog_source: catalog_source.to_string(),
            catalog_namespace: catalog_namespace.to_string(),
            default_channel: default_channel.to_string(),
            own_namespace: supports(InstallModeType::OwnNamespace),
            single_namespace: supports(InstallModeType::SingleNamespace),
            all_namespaces: supports(InstallModeType::AllNamespaces),
            channel,
            csv_version,
        })
    }

    pub fn supports(&self, mode: InstallModeType) -> bool {
        match mode {
            InstallModeType::OwnNamespace => self.own_namespace,
            InstallModeType::SingleNamespace => self.single_namespace,
            InstallModeType::AllNamespaces => self.all_namespaces,
            InstallModeType::MultiNamespace => false,
        }
    }

    /// The narrowest mode the package supports: own, then single, then all
    /// namespaces.
    pub fn preferred_install_mode(&self) -> Result<InstallModeType> {
        [
            InstallModeType::OwnNamespace,
            InstallModeType::SingleNamespace,
            InstallModeType::AllNamespaces,
        ]
        .into_iter()
        .find(|mode| self.supports(*mode))
        .ok_or_else(|| Error::NoInstallMode {
            package: self.name.clone(),
        })
    }
}

/// Parse install modes printed either as JSON or as a Go map literal
/// (`[map[supported:true type:OwnNamespace] ...]`).
pub fn parse_install_modes(text: &str) -> Result<Vec<InstallMode>> {
    let text = text.trim();
    let value = match map_literal_to_json(text) {
        Some(value) => value,
        None => serde_json::from_str(text).map_err(|source| Error::Decode {
            what: "install modes".to_string(),
            source,
        })?,
    };
    serde_json::from_value(value).map_err(|source| Error::Decode {
        what: "install modes".to_string(),
        source,
    })
}

fn map_literal_to_json(text: &str) -> Option<Value> {
    let mut rest = text.strip_prefix('[')?.strip_suffix(']')?.trim();
    let mut items = Vec::new();
    while !rest.is_empty() {
        let body = rest.strip_prefix("map[")?;
        let end = body.find(']')?;
        let mut object = Map::new();
        for pair in body[..end].split_whitespace() {
            let (key, value) = pair.split_once(':')?;
            let value = match value {
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                other => Value::String(other.to_string()),
            };
            object.insert(key.to_string(), value);
        }
        items.push(Value::Object(object));
        rest = body[end + 1..].trim_start();
    }
    Some(Value::Array(items))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_client::{Invocation, MockExecutor};
    use std::sync::Arc;

    const MAP_LITERAL: &str = "[map[supported:true type:OwnNamespace] \
        map[supported:true type:SingleNamespace] map[supported:false type:MultiNamespace] \
        map[supported:true type:AllNamespaces]]";

    #[test]
    fn map_literal_and_json_agree() {
        let from_literal = parse_install_modes(MAP_LITERAL).unwrap();
        let from_json = parse_install_modes(
            r#"[{"type":"OwnNamespace","supported":true},
                {"type":"SingleNamespace","supported":true},
                {"type":"MultiNamespace","supported":false},
                {"type":"AllNamespaces","supported":true}]"#,
        )
        .unwrap();
        assert_eq!(from_literal, from_json);
        assert_eq!(from_literal.len(), 4);
        assert!(!from_literal[2].supported);
    }

    #[test]
    fn unknown_mode_is_a_decode_error() {
        let err = parse_install_modes("[map[supported:true type:Everywhere]]").unwrap_err();
        assert!(matches!(err, Error::Decode { .. }));
        assert!(parse_install_modes("nonsense").is_err());
    }

    fn snapshot(own: bool, single: bool, all: bool) -> PackageManifestSnapshot {
        PackageManifestSnapshot {
            name: "etcd".to_string(),
            namespace: "openshift-marketplace".to_string(),
            catalog_source: "community-operators".to_string(),
            catalog_namespace: "openshift-marketplace".to_string(),
            default_channel: "singlenamespace-alpha".to_string(),
            channel: "singlenamespace-alpha".to_string(),
            csv_version: "etcdoperator.v0.9.4".to_string(),
            own_namespace: own,
            single_namespace: single,
            all_namespaces: all,
        }
    }

    #[test]
    fn preference_is_own_then_single_then_all() {
        use InstallModeType::*;
        assert_eq!(snapshot(true, true, true).preferred_install_mode().unwrap(), OwnNamespace);
        assert_eq!(snapshot(false, true, true).preferred_install_mode().unwrap(), SingleNamespace);
        assert_eq!(snapshot(false, false, true).preferred_install_mode().unwrap(), AllNamespaces);
        assert!(matches!(
            snapshot(false, false, false).preferred_install_mode(),
            Err(Error::NoInstallMode { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_reads_the_requested_channel() {
        let exec = Arc::new(MockExecutor::new(|inv: &Invocation| {
            let expr = inv.args.last().cloned().unwrap_or_default();
            Ok(if expr.contains("defaultChannel") {
                "community-operators:openshift-marketplace:singlenamespace-alpha".to_string()
            } else if expr.ends_with(".currentCSV}") {
                assert!(expr.contains(r#"@.name=="clusterwide-alpha""#), "{expr}");
                "etcdoperator.v0.9.4-clusterwide".to_string()
            } else {
                "[map[supported:false type:OwnNamespace] map[supported:true type:AllNamespaces]]"
                    .to_string()
            })
        }));
        let ctx = TestContext::new("pm", "test-1", exec);
        let snapshot = PackageManifestSnapshot::fetch(&ctx, "etcd", Some("clusterwide-alpha"))
            .await
            .unwrap();
        assert_eq!(snapshot.default_channel, "singlenamespace-alpha");
        assert_eq!(snapshot.channel, "clusterwide-alpha");
        assert_eq!(snapshot.csv_version, "etcdoperator.v0.9.4-clusterwide");
        assert_eq!(
            snapshot.preferred_install_mode().unwrap(),
            InstallModeType::AllNamespaces
        );
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_rejects_a_summary_with_empty_fields() {
        let exec = Arc::new(MockExecutor::new(|_: &Invocation| Ok("::alpha".to_string())));
        let ctx = TestContext::new("pm", "test-1", exec.clone());
        let err = PackageManifestSnapshot::fetch(&ctx, "etcd", None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnexpectedOutput { .. }), "{err}");
        assert!(err.to_string().contains("::alpha"), "{err}");
        assert_eq!(exec.invocations().len(), 1);
    }
}
