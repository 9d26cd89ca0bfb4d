// SPDX-FileCopyrightText: OLM e2e harness contributors
//
// SPDX-License-Identifier: MIT

//! Typed wrappers around the objects a test case creates.
//!
//! Every `create` renders a manifest, applies it and tracks the object in the
//! [`TestContext`](crate::TestContext) so cleanup can find it again.

pub mod catalog_source;
pub mod config_map;
pub mod crd;
pub mod csv;
pub mod custom_resource;
pub mod operator_group;
pub mod package_manifest;
pub mod project;
pub mod rbac;
pub mod subscription;

pub use catalog_source::CatalogSource;
pub use config_map::ConfigMap;
pub use crd::Crd;
pub use csv::Csv;
pub use custom_resource::CustomResource;
pub use operator_group::{OperatorGroup, TargetScope};
pub use package_manifest::PackageManifestSnapshot;
pub use project::Project;
pub use rbac::{Role, RoleBinding, ServiceAccount};
pub use subscription::Subscription;

use serde_json::Value;

use crate::context::TestContext;
use crate::error::Result;
use crate::executor::Action;
use crate::poll::Query;

pub(crate) fn jsonpath(expr: &str) -> String {
    format!("-o=jsonpath={expr}")
}

/// Admin query addressing one object, followed by `extra` arguments.
pub(crate) fn object_query<'a>(
    kind: &str,
    name: &str,
    namespace: &str,
    extra: impl IntoIterator<Item = &'a str>,
) -> Query {
    let mut args = Vec::new();
    if !namespace.is_empty() {
        args.push("-n".to_string());
        args.push(namespace.to_string());
    }
    args.push(kind.to_string());
    args.push(name.to_string());
    args.extend(extra.into_iter().map(str::to_string));
    Query::admin(args)
}

/// Apply a JSON merge patch to one object.
pub(crate) async fn merge_patch(
    ctx: &TestContext,
    kind: &str,
    name: &str,
    namespace: &str,
    patch: &Value,
) -> Result<String> {
    let patch = patch.to_string();
    object_query(kind, name, namespace, ["--type=merge", "-p", patch.as_str()])
        .run(ctx.exec(), Action::Patch)
        .await
}
