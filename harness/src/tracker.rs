// SPDX-FileCopyrightText: OLM e2e harness contributors
//
// SPDX-License-Identifier: MIT

//! Bookkeeping of the objects a test case created, so they can be torn down.

use std::fmt;

use indexmap::IndexMap;
use log::{debug, info, warn};

use crate::error::{Error, Result};
use crate::executor::{Executor, Identity, Scope};
use crate::poll::{Primitive, Query, default_poller, remove_resource};
use crate::timer::Poller;

/// Identifies one tracked object. `namespace` is empty for cluster-scoped kinds.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey {
    pub name: String,
    pub kind: String,
    pub namespace: String,
}

impl ResourceKey {
    pub fn new(
        name: impl Into<String>,
        kind: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            namespace: namespace.into(),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}/{}", self.kind, self.name)
        } else {
            write!(f, "{}/{} in {}", self.kind, self.name, self.namespace)
        }
    }
}

/// How to delete a tracked object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeletionDescriptor {
    kind: String,
    name: String,
    namespace: String,
    identity: Identity,
    scope: Scope,
}

impl DeletionDescriptor {
    /// Deleted as admin, with the namespace passed explicitly.
    pub fn new(
        kind: impl Into<String>,
        name: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            namespace: namespace.into(),
            identity: Identity::Admin,
            scope: Scope::Cluster,
        }
    }

    pub fn cluster_scoped(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(kind, name, "")
    }

    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = identity;
        self
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn identity(&self) -> Identity {
        self.identity
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(&self.name, &self.kind, &self.namespace)
    }

    pub fn query(&self) -> Query {
        let mut args = Vec::with_capacity(4);
        if !self.namespace.is_empty() {
            args.push("-n".to_string());
            args.push(self.namespace.clone());
        }
        args.push(self.kind.clone());
        args.push(self.name.clone());
        Query::new(self.identity, self.scope, args)
    }

    pub async fn delete(&self, exec: &dyn Executor, poller: &Poller) -> Result<()> {
        remove_resource(exec, &self.query(), poller).await
    }
}

/// Objects created by one test case, in creation order.
///
/// Adding a key that is already tracked replaces its descriptor and moves it
/// to the newest position. Cleanup deletes the newest objects first, so a
/// namespace goes after the objects created inside it.
#[derive(Debug)]
pub struct ResourceTracker {
    entries: IndexMap<ResourceKey, DeletionDescriptor>,
    poller: Poller,
}

impl Default for ResourceTracker {
    fn default() -> Self {
        Self {
            entries: IndexMap::new(),
            poller: default_poller(Primitive::Remove),
        }
    }
}

impl ResourceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Poll timings used while waiting for deletions to finish.
    pub fn with_poller(mut self, poller: Poller) -> Self {
        self.poller = poller;
        self
    }

    pub fn add(&mut self, descriptor: DeletionDescriptor) {
        let key = descriptor.key();
        if self.entries.shift_remove(&key).is_some() {
            debug!("{key} was already tracked, replacing it");
        }
        self.entries.insert(key, descriptor);
    }

    pub fn contains(&self, key: &ResourceKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &ResourceKey) -> Option<&DeletionDescriptor> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Tracked keys, oldest first.
    pub fn keys(&self) -> impl Iterator<Item = &ResourceKey> {
        self.entries.keys()
    }

    /// Delete the object behind `key` and stop tracking it.
    ///
    /// Returns `false` without touching the cluster when `key` is not tracked.
    /// The entry stays tracked when the delete fails.
    pub async fn remove(&mut self, exec: &dyn Executor, key: &ResourceKey) -> Result<bool> {
        let Some(descriptor) = self.entries.get(key) else {
            debug!("{key} is not tracked, nothing to delete");
            return Ok(false);
        };
        descriptor.delete(exec, &self.poller).await?;
        self.entries.shift_remove(key);
        info!("deleted {key}");
        Ok(true)
    }

    /// Delete everything, newest first, stopping at the first failure.
    ///
    /// Entries not yet deleted stay tracked when an error is returned.
    pub async fn cleanup(&mut self, exec: &dyn Executor) -> Result<()> {
        while let Some((key, descriptor)) = self.entries.pop() {
            if let Err(e) = descriptor.delete(exec, &self.poller).await {
                self.entries.insert(key, descriptor);
                return Err(e);
            }
            info!("deleted {key}");
        }
        Ok(())
    }

    /// Delete everything, newest first, carrying on past failures.
    ///
    /// The table is empty afterwards; the swallowed errors are returned.
    pub async fn cleanup_best_effort(&mut self, exec: &dyn Executor) -> Vec<Error> {
        let mut errors = Vec::new();
        while let Some((key, descriptor)) = self.entries.pop() {
            match descriptor.delete(exec, &self.poller).await {
                Ok(()) => info!("deleted {key}"),
                Err(e) => {
                    warn!("failed to delete {key}: {e}");
                    errors.push(e);
                }
            }
        }
        errors
    }
}

/// Trackers of several test cases, keyed by test case name.
#[derive(Debug, Default)]
pub struct TrackerRegistry {
    cases: IndexMap<String, ResourceTracker>,
}

impl TrackerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking for `test_case`, keeping an existing table.
    pub fn register(&mut self, test_case: impl Into<String>) -> &mut ResourceTracker {
        self.cases.entry(test_case.into()).or_default()
    }

    pub fn is_registered(&self, test_case: &str) -> bool {
        self.cases.contains_key(test_case)
    }

    pub fn tracker(&mut self, test_case: &str) -> Result<&mut ResourceTracker> {
        self.cases
            .get_mut(test_case)
            .ok_or_else(|| Error::UnknownTestCase(test_case.to_string()))
    }

    /// Tear down everything `test_case` created and drop its table.
    ///
    /// With `check_deletion` unset, deletion failures are logged and ignored.
    pub async fn finish(
        &mut self,
        exec: &dyn Executor,
        test_case: &str,
        check_deletion: bool,
    ) -> Result<()> {
        let mut tracker = self
            .cases
            .shift_remove(test_case)
            .ok_or_else(|| Error::UnknownTestCase(test_case.to_string()))?;
        if check_deletion {
            tracker.cleanup(exec).await
        } else {
            tracker.cleanup_best_effort(exec).await;
            Ok(())
        }
    }
}
