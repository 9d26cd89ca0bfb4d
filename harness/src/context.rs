// SPDX-FileCopyrightText: OLM e2e harness contributors
//
// SPDX-License-Identifier: MIT

use std::path::{Path, PathBuf};
use std::sync::{Arc, Once};
use std::time::Duration;

use envconfig::Envconfig;
use log::{info, warn};
use serde::Serialize;

use crate::config::CliConfig;
use crate::error::{Error, Result};
use crate::executor::{Action, CliExecutor, Executor, Identity, Scope};
use crate::poll::Query;
use crate::template::{Params, Template, write_manifest};
use crate::timer::Poller;
use crate::tracker::{DeletionDescriptor, ResourceKey, ResourceTracker};

static INIT: Once = Once::new();

/// Everything one test case needs: the executor, its namespace, the objects it
/// created and where its rendered manifests go.
pub struct TestContext {
    test_name: String,
    namespace: String,
    exec: Arc<dyn Executor>,
    tracker: ResourceTracker,
    output_dir: PathBuf,
    catalog_namespace: String,
    global_namespace: String,
}

impl TestContext {
    pub fn new(
        test_name: impl Into<String>,
        namespace: impl Into<String>,
        exec: Arc<dyn Executor>,
    ) -> Self {
        let defaults = CliConfig::default();
        Self {
            test_name: test_name.into(),
            namespace: namespace.into(),
            exec,
            tracker: ResourceTracker::new(),
            output_dir: std::env::temp_dir().join(format!("olm-e2e-{}", uuid::Uuid::new_v4())),
            catalog_namespace: defaults.catalog_namespace,
            global_namespace: defaults.global_namespace,
        }
    }

    /// Context backed by the real CLI, configured from the environment.
    pub fn from_env(test_name: &str) -> Result<Self> {
        init_logging();
        let config = CliConfig::init_from_env()?;
        Ok(Self::from_config(test_name, &config))
    }

    pub fn from_config(test_name: &str, config: &CliConfig) -> Self {
        let namespace = config
            .namespace
            .clone()
            .unwrap_or_else(test_namespace_name);
        let exec = CliExecutor::new(config).with_namespace(&namespace);
        let mut ctx = Self::new(test_name, namespace, Arc::new(exec))
            .with_catalog_namespace(&config.catalog_namespace)
            .with_global_namespace(&config.global_namespace);
        if let Some(dir) = &config.output_dir {
            ctx.output_dir = PathBuf::from(dir).join(format!("olm-e2e-{}", uuid::Uuid::new_v4()));
        }
        ctx
    }

    pub fn with_catalog_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.catalog_namespace = namespace.into();
        self
    }

    pub fn with_global_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.global_namespace = namespace.into();
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_tracker(mut self, tracker: ResourceTracker) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn test_name(&self) -> &str {
        &self.test_name
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn exec(&self) -> &dyn Executor {
        self.exec.as_ref()
    }

    pub fn executor(&self) -> Arc<dyn Executor> {
        self.exec.clone()
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn catalog_namespace(&self) -> &str {
        &self.catalog_namespace
    }

    pub fn global_namespace(&self) -> &str {
        &self.global_namespace
    }

    pub fn tracker(&self) -> &ResourceTracker {
        &self.tracker
    }

    pub fn info(&self, message: impl AsRef<str>) {
        info!("{}: {}", self.test_name, message.as_ref());
    }

    pub fn track(&mut self, descriptor: DeletionDescriptor) {
        self.tracker.add(descriptor);
    }

    /// Delete a tracked object now instead of at cleanup.
    pub async fn untrack(&mut self, key: &ResourceKey) -> Result<bool> {
        self.tracker.remove(self.exec.as_ref(), key).await
    }

    /// Render `template` into the output directory and apply it as admin.
    pub async fn apply(&self, template: &Template, params: &Params) -> Result<PathBuf> {
        let path = template.render_to(&self.output_dir, params)?;
        self.apply_file(&path, template.name()).await?;
        Ok(path)
    }

    /// Serialize `object` into the output directory and apply it as admin.
    pub async fn apply_object<K: Serialize>(&self, stem: &str, object: &K) -> Result<PathBuf> {
        let manifest = serde_yaml::to_string(object)?;
        let path = write_manifest(&self.output_dir, stem, &manifest)?;
        self.apply_file(&path, stem).await?;
        Ok(path)
    }

    /// The apply is retried briefly since freshly created namespaces and CRDs
    /// can take a moment to be served.
    async fn apply_file(&self, path: &Path, what: &str) -> Result<()> {
        let query = Query::new(
            Identity::Admin,
            Scope::Cluster,
            ["-f".to_string(), path.display().to_string()],
        );
        let exec = self.exec.as_ref();
        let query = &query;
        Poller::new()
            .with_interval(Duration::from_secs(3))
            .with_timeout(Duration::from_secs(15))
            .with_error_message(format!("can not apply {what}"))
            .poll_async(move || async move { query.run(exec, Action::Apply).await })
            .await?;
        Ok(())
    }

    /// Delete every tracked object, newest first, and the rendered manifests.
    ///
    /// With `check_deletion` unset, failures are logged and ignored.
    pub async fn cleanup(&mut self, check_deletion: bool) -> Result<()> {
        self.info("cleaning up");
        if check_deletion {
            self.tracker.cleanup(self.exec.as_ref()).await?;
        } else {
            let errors = self.tracker.cleanup_best_effort(self.exec.as_ref()).await;
            if !errors.is_empty() {
                warn!("{}: {} object(s) were left behind", self.test_name, errors.len());
            }
        }
        match std::fs::remove_dir_all(&self.output_dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) if check_deletion => Err(Error::Io(e)),
            Err(e) => {
                warn!("failed to remove {}: {e}", self.output_dir.display());
                Ok(())
            }
        }
    }
}

pub fn init_logging() {
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

pub fn test_namespace_name() -> String {
    format!("test-{}", &uuid::Uuid::new_v4().to_string()[..8])
}
