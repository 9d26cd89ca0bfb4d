// SPDX-FileCopyrightText: OLM e2e harness contributors
//
// SPDX-License-Identifier: MIT

use olm_crds::phases::CATALOG_SOURCE_READY;
use olm_crds::{CatalogSource as CatalogSourceObject, CatalogSourceSpec};

use super::{jsonpath, object_query};
use crate::check::Check;
use crate::context::TestContext;
use crate::error::Result;
use crate::tracker::{DeletionDescriptor, ResourceKey};

pub const KIND: &str = "catsrc";

/// A grpc CatalogSource serving an index image.
#[derive(Clone, Debug)]
pub struct CatalogSource {
    pub name: String,
    pub namespace: String,
    pub image: String,
    pub display_name: String,
    pub publisher: String,
}

impl CatalogSource {
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        image: impl Into<String>,
    ) -> Self {
        let name = name.into();
        Self {
            display_name: name.clone(),
            name,
            namespace: namespace.into(),
            image: image.into(),
            publisher: "OLM e2e".to_string(),
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    pub fn with_publisher(mut self, publisher: impl Into<String>) -> Self {
        self.publisher = publisher.into();
        self
    }

    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(&self.name, KIND, &self.namespace)
    }

    pub fn object(&self) -> CatalogSourceObject {
        let mut catalog = CatalogSourceObject::new(
            &self.name,
            CatalogSourceSpec {
                source_type: "grpc".to_string(),
                image: Some(self.image.clone()),
                display_name: Some(self.display_name.clone()),
                publisher: Some(self.publisher.clone()),
            },
        );
        catalog.metadata.namespace = Some(self.namespace.clone());
        catalog
    }

    pub fn manifest(&self) -> Result<String> {
        Ok(serde_yaml::to_string(&self.object())?)
    }

    pub async fn create(&self, ctx: &mut TestContext) -> Result<()> {
        ctx.apply_object("catalogsource", &self.object()).await?;
        ctx.track(DeletionDescriptor::new(KIND, &self.name, &self.namespace));
        ctx.info(format!("created catalog source {}", self.name));
        Ok(())
    }

    /// Readiness of the registry connection.
    pub fn ready_check(&self) -> Check {
        Check::equals(
            object_query(
                KIND,
                &self.name,
                &self.namespace,
                [jsonpath("{.status..lastObservedState}").as_str()],
            ),
            CATALOG_SOURCE_READY,
        )
    }

    /// Create the catalog and wait until its registry pod serves.
    pub async fn create_with_check(&self, ctx: &mut TestContext) -> Result<()> {
        self.create(ctx).await?;
        self.ready_check().check_without_assert(ctx.exec()).await
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
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn manifest_is_a_grpc_catalog() {
        let catalog = CatalogSource::new(
            "qe-app-registry",
            "openshift-marketplace",
            "quay.io/olmqe/index:v1",
        )
        .with_display_name("QE: nightly \"index\"");
        let back: CatalogSourceObject =
            serde_yaml::from_str(&catalog.manifest().unwrap()).unwrap();
        assert_eq!(back.spec.source_type, "grpc");
        assert_eq!(back.spec.image.as_deref(), Some("quay.io/olmqe/index:v1"));
        assert_eq!(back.spec.display_name.as_deref(), Some("QE: nightly \"index\""));
        assert_eq!(back.metadata.namespace.as_deref(), Some("openshift-marketplace"));
    }

    #[tokio::test(start_paused = true)]
    async fn create_with_check_waits_for_ready() {
        let reads = AtomicUsize::new(0);
        let exec = Arc::new(MockExecutor::new(move |inv: &Invocation| match inv.action {
            Action::Apply => Ok("catalogsource created".to_string()),
            Action::Get => Ok(match reads.fetch_add(1, Ordering::SeqCst) {
                0 => "CONNECTING".to_string(),
                1 => "TRANSIENT_FAILURE".to_string(),
                _ => "READY".to_string(),
            }),
            _ => panic!("unexpected call {inv}"),
        }));
        let mut ctx = TestContext::new("catsrc", "test-1", exec.clone());
        let catalog = CatalogSource::new(
            "qe-app-registry",
            "openshift-marketplace",
            "quay.io/olmqe/index:v1",
        );
        catalog.create_with_check(&mut ctx).await.unwrap();

        assert_eq!(exec.count(|inv| inv.action == Action::Get), 3);
        assert!(ctx.tracker().contains(&catalog.key()));
    }
}
