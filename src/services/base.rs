//! Replication of base resources into target namespaces
//!
//! One service per propagated kind keeps a cache of the base resources it
//! has seen in the base namespace and fans them out into every target
//! namespace. The kind-specific parts (what gets copied and how an existing
//! copy is refreshed) live behind the [`Replica`] trait.

use std::collections::HashMap;
use std::fmt::Debug;

use chrono::{DateTime, Utc};
use kube::api::ObjectMeta;
use kube::{Resource, ResourceExt};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::labels::{self, Role};
use crate::metrics;
use crate::store::ObjectStore;

/// A kind that can be copied from the base namespace into other namespaces
pub trait Replica:
    Resource<DynamicType = ()> + Clone + Debug + PartialEq + Send + Sync + 'static
{
    /// Role label value selecting base resources of this kind
    const ROLE: Role;

    /// Fresh copy of `base` for `namespace`
    fn replicate(base: &Self, namespace: &str) -> Self;

    /// `existing` with its content overwritten from `base`
    fn refresh(existing: &Self, base: &Self) -> Self;
}

/// Metadata of a fresh copy: identity, labels and annotations only
pub fn copy_meta(base: &ObjectMeta, namespace: &str) -> ObjectMeta {
    ObjectMeta {
        name: base.name.clone(),
        namespace: Some(namespace.to_string()),
        labels: base.labels.clone(),
        annotations: base.annotations.clone(),
        ..ObjectMeta::default()
    }
}

/// Metadata of an existing copy with labels and annotations taken from the base
pub fn refresh_meta(existing: &ObjectMeta, base: &ObjectMeta) -> ObjectMeta {
    ObjectMeta {
        labels: base.labels.clone(),
        annotations: base.annotations.clone(),
        ..existing.clone()
    }
}

/// How a base resource changed since the service last saw it
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Change {
    /// Created after the service started and never seen before
    Created,
    /// Modified, or already present when the service started
    Updated,
    /// Same resourceVersion as the cached copy
    Unchanged,
}

/// What happened to a single copy
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Created,
    Updated,
    Deleted,
    /// Copy already up to date, user-managed, or already gone
    Skipped,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Created => "created",
            Outcome::Updated => "updated",
            Outcome::Deleted => "deleted",
            Outcome::Skipped => "skipped",
        }
    }
}

/// Caches base resources of one kind and replicates them
pub struct BaseResourceService<K, S> {
    store: S,
    base_namespace: String,
    started_at: DateTime<Utc>,
    cache: RwLock<HashMap<String, K>>,
}

impl<K, S> BaseResourceService<K, S>
where
    K: Replica,
    S: ObjectStore<K>,
{
    pub fn new(store: S, config: &Config) -> Self {
        Self {
            store,
            base_namespace: config.base_namespace.clone(),
            started_at: Utc::now(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Override the instant objects are compared against in [`Self::observe`]
    pub fn with_start_time(mut self, started_at: DateTime<Utc>) -> Self {
        self.started_at = started_at;
        self
    }

    pub fn role(&self) -> Role {
        K::ROLE
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Whether `obj` is a base resource handled by this service
    pub fn is_base(&self, obj: &K) -> bool {
        obj.meta().namespace.as_deref() == Some(self.base_namespace.as_str())
            && Role::from_labels(obj.labels()) == Some(K::ROLE)
    }

    /// Cached base resource by name
    pub fn cached(&self, name: &str) -> Option<K> {
        self.cache.read().get(name).cloned()
    }

    /// List base resources and refresh the cache with the result
    pub async fn list_base(&self) -> Result<Vec<K>> {
        let items = self
            .store
            .list(&self.base_namespace, &K::ROLE.selector())
            .await?;
        let mut cache = self.cache.write();
        cache.clear();
        for item in &items {
            cache.insert(item.name_any(), item.clone());
        }
        Ok(items)
    }

    /// Record `obj` in the cache and classify the change
    pub fn observe(&self, obj: &K) -> Change {
        let name = obj.name_any();
        let previous = self.cache.write().insert(name, obj.clone());
        match previous {
            Some(prev) if prev.resource_version() == obj.resource_version() => Change::Unchanged,
            Some(_) => Change::Updated,
            None => {
                let created = obj.meta().creation_timestamp.as_ref().map(|t| t.0);
                match created {
                    Some(ts) if ts >= self.started_at => Change::Created,
                    _ => Change::Updated,
                }
            }
        }
    }

    pub fn forget(&self, name: &str) {
        self.cache.write().remove(name);
    }

    /// Create the copy of `base` in `namespace`, updating it if it already exists
    pub async fn create_in(&self, namespace: &str, base: &K) -> Result<Outcome> {
        let copy = K::replicate(base, namespace);
        match self.store.create(&copy).await {
            Ok(_) => {
                debug!(role = %K::ROLE, name = %base.name_any(), namespace, "Created copy");
                Ok(Outcome::Created)
            }
            Err(e) if e.is_already_exists() => self.update_in(namespace, base).await,
            Err(e) => Err(e),
        }
    }

    /// Refresh the copy of `base` in `namespace`, creating it if missing
    pub async fn update_in(&self, namespace: &str, base: &K) -> Result<Outcome> {
        let name = base.name_any();
        let Some(existing) = self.store.get(namespace, &name).await? else {
            let copy = K::replicate(base, namespace);
            self.store.create(&copy).await?;
            debug!(role = %K::ROLE, name = %name, namespace, "Copy not found, created it");
            return Ok(Outcome::Created);
        };

        if labels::is_user_managed(base.labels()) {
            debug!(role = %K::ROLE, name = %name, namespace, "Copy is managed by the user, skipping");
            return Ok(Outcome::Skipped);
        }

        let refreshed = K::refresh(&existing, base);
        if refreshed == existing {
            return Ok(Outcome::Skipped);
        }
        self.store.replace(&refreshed).await?;
        debug!(role = %K::ROLE, name = %name, namespace, "Updated copy");
        Ok(Outcome::Updated)
    }

    /// Propagate `base` into every namespace, continuing past failures
    pub async fn sync(&self, namespaces: &[String], base: &K, change: Change) -> Result<()> {
        let mut failed = 0;
        for namespace in namespaces {
            let result = match change {
                Change::Created => self.create_in(namespace, base).await,
                Change::Updated | Change::Unchanged => self.update_in(namespace, base).await,
            };
            if !self.record(namespace, base, result) {
                failed += 1;
            }
        }
        self.finish(base, failed, namespaces.len())
    }

    /// Delete the copies of `base`; user-managed copies are left in place
    pub async fn delete_from(&self, namespaces: &[String], base: &K) -> Result<()> {
        let name = base.name_any();
        if labels::is_user_managed(base.labels()) {
            info!(role = %K::ROLE, name = %name, "Copies are managed by the user, not deleting them");
            return Ok(());
        }

        let mut failed = 0;
        for namespace in namespaces {
            let result = match self.store.delete(namespace, &name).await {
                Ok(()) => Ok(Outcome::Deleted),
                Err(e) if e.is_not_found() => Ok(Outcome::Skipped),
                Err(e) => Err(e),
            };
            if !self.record(namespace, base, result) {
                failed += 1;
            }
        }
        self.finish(base, failed, namespaces.len())
    }

    fn record(&self, namespace: &str, base: &K, result: Result<Outcome>) -> bool {
        match result {
            Ok(outcome) => {
                metrics::PROPAGATIONS
                    .with_label_values(&[K::ROLE.label_value(), outcome.as_str()])
                    .inc();
                true
            }
            Err(e) => {
                warn!(
                    role = %K::ROLE,
                    name = %base.name_any(),
                    namespace,
                    error = %e,
                    "Propagation failed"
                );
                metrics::PROPAGATION_ERRORS
                    .with_label_values(&[K::ROLE.label_value()])
                    .inc();
                false
            }
        }
    }

    fn finish(&self, base: &K, failed: usize, total: usize) -> Result<()> {
        if failed == 0 {
            return Ok(());
        }
        Err(Error::Propagation {
            role: K::ROLE,
            name: base.name_any(),
            failed,
            total,
        })
    }
}

