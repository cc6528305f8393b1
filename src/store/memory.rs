//! In-memory object store
//!
//! Mimics the API server closely enough for the propagation logic:
//! resourceVersions are bumped on every write, stale replaces are rejected
//! with a conflict, and failures come back as the same `kube::Error::Api`
//! responses the real client produces.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Secret, ServiceAccount};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::{error::ErrorResponse, Resource, ResourceExt};
use parking_lot::Mutex;

use crate::error::{Error, Result};

use super::{NamespaceLister, ObjectStore};

type Key = (String, String);

struct State<K> {
    objects: BTreeMap<Key, K>,
    version: u64,
    failing_namespaces: BTreeSet<String>,
}

/// Object store keeping everything in a map keyed by namespace and name
pub struct MemoryStore<K> {
    state: Mutex<State<K>>,
}

impl<K> Default for MemoryStore<K> {
    fn default() -> Self {
        Self {
            state: Mutex::new(State {
                objects: BTreeMap::new(),
                version: 0,
                failing_namespaces: BTreeSet::new(),
            }),
        }
    }
}

fn api_error(code: u16, reason: &str, message: String) -> Error {
    Error::Kube(kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message,
        reason: reason.to_string(),
        code,
    }))
}

fn key_of<K: Resource>(obj: &K) -> Key {
    (obj.namespace().unwrap_or_default(), obj.name_any())
}

/// Match `k=v`, `k!=v` and bare `k` terms joined by commas
fn matches_selector(labels: &BTreeMap<String, String>, selector: &str) -> bool {
    selector
        .split(',')
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .all(|term| {
            if let Some((key, value)) = term.split_once("!=") {
                labels.get(key.trim()).map(String::as_str) != Some(value.trim())
            } else if let Some((key, value)) = term.split_once('=') {
                labels.get(key.trim()).map(String::as_str) == Some(value.trim())
            } else {
                labels.contains_key(term)
            }
        })
}

impl<K: Resource + Clone> MemoryStore<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object as if it had been created through the API
    pub fn insert(&self, mut obj: K) -> K {
        let mut state = self.state.lock();
        state.version += 1;
        let meta = obj.meta_mut();
        meta.resource_version = Some(state.version.to_string());
        if meta.creation_timestamp.is_none() {
            meta.creation_timestamp = Some(Time(Utc::now()));
        }
        state.objects.insert(key_of(&obj), obj.clone());
        obj
    }

    /// Fetch a stored object without going through the trait
    pub fn object(&self, namespace: &str, name: &str) -> Option<K> {
        let key = (namespace.to_string(), name.to_string());
        self.state.lock().objects.get(&key).cloned()
    }

    /// All stored objects, ordered by namespace and name
    pub fn objects(&self) -> Vec<K> {
        self.state.lock().objects.values().cloned().collect()
    }

    /// Make every write into `namespace` fail with an internal error
    pub fn fail_writes_in(&self, namespace: &str) {
        self.state
            .lock()
            .failing_namespaces
            .insert(namespace.to_string());
    }

    fn check_writable(state: &State<K>, namespace: &str) -> Result<()> {
        if state.failing_namespaces.contains(namespace) {
            return Err(api_error(
                500,
                "InternalError",
                format!("writes to namespace {} are failing", namespace),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl<K> ObjectStore<K> for MemoryStore<K>
where
    K: Resource + Clone + Send + Sync + 'static,
{
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>> {
        Ok(self.object(namespace, name))
    }

    async fn list(&self, namespace: &str, label_selector: &str) -> Result<Vec<K>> {
        let state = self.state.lock();
        Ok(state
            .objects
            .iter()
            .filter(|((ns, _), obj)| ns == namespace && matches_selector(obj.labels(), label_selector))
            .map(|(_, obj)| obj.clone())
            .collect())
    }

    async fn create(&self, obj: &K) -> Result<K> {
        let mut state = self.state.lock();
        let key = key_of(obj);
        Self::check_writable(&state, &key.0)?;
        if state.objects.contains_key(&key) {
            return Err(api_error(
                409,
                "AlreadyExists",
                format!("{}/{} already exists", key.0, key.1),
            ));
        }
        state.version += 1;
        let mut created = obj.clone();
        let meta = created.meta_mut();
        meta.resource_version = Some(state.version.to_string());
        meta.creation_timestamp = Some(Time(Utc::now()));
        state.objects.insert(key, created.clone());
        Ok(created)
    }

    async fn replace(&self, obj: &K) -> Result<K> {
        let mut state = self.state.lock();
        let key = key_of(obj);
        Self::check_writable(&state, &key.0)?;
        let Some(stored) = state.objects.get(&key) else {
            return Err(api_error(
                404,
                "NotFound",
                format!("{}/{} not found", key.0, key.1),
            ));
        };
        let stored_meta = stored.meta();
        if let Some(version) = &obj.meta().resource_version {
            if stored_meta.resource_version.as_ref() != Some(version) {
                return Err(api_error(
                    409,
                    "Conflict",
                    format!("{}/{} has been modified", key.0, key.1),
                ));
            }
        }
        let creation_timestamp = stored_meta.creation_timestamp.clone();
        state.version += 1;
        let mut replaced = obj.clone();
        let meta = replaced.meta_mut();
        meta.resource_version = Some(state.version.to_string());
        meta.creation_timestamp = creation_timestamp;
        state.objects.insert(key, replaced.clone());
        Ok(replaced)
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<()> {
        let mut state = self.state.lock();
        Self::check_writable(&state, namespace)?;
        let key = (namespace.to_string(), name.to_string());
        match state.objects.remove(&key) {
            Some(_) => Ok(()),
            None => Err(api_error(
                404,
                "NotFound",
                format!("{}/{} not found", namespace, name),
            )),
        }
    }
}

#[async_trait]
impl NamespaceLister for MemoryStore<Namespace> {
    async fn list_namespaces(&self) -> Result<Vec<Namespace>> {
        Ok(self.objects())
    }
}

#[derive(Default)]
struct Cluster {
    namespaces: MemoryStore<Namespace>,
    secrets: MemoryStore<Secret>,
    config_maps: MemoryStore<ConfigMap>,
    service_accounts: MemoryStore<ServiceAccount>,
}

/// Shared in-memory stores for every kind the controller touches
#[derive(Clone, Default)]
pub struct MemoryCluster {
    inner: Arc<Cluster>,
}

impl MemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn namespaces(&self) -> &MemoryStore<Namespace> {
        &self.inner.namespaces
    }

    pub fn secrets(&self) -> &MemoryStore<Secret> {
        &self.inner.secrets
    }

    pub fn config_maps(&self) -> &MemoryStore<ConfigMap> {
        &self.inner.config_maps
    }

    pub fn service_accounts(&self) -> &MemoryStore<ServiceAccount> {
        &self.inner.service_accounts
    }
}

#[async_trait]
impl NamespaceLister for MemoryCluster {
    async fn list_namespaces(&self) -> Result<Vec<Namespace>> {
        self.inner.namespaces.list_namespaces().await
    }
}

macro_rules! delegate_store {
    ($kind:ty, $field:ident) => {
        #[async_trait]
        impl ObjectStore<$kind> for MemoryCluster {
            async fn get(&self, namespace: &str, name: &str) -> Result<Option<$kind>> {
                self.inner.$field.get(namespace, name).await
            }

            async fn list(&self, namespace: &str, label_selector: &str) -> Result<Vec<$kind>> {
                self.inner.$field.list(namespace, label_selector).await
            }

            async fn create(&self, obj: &$kind) -> Result<$kind> {
                self.inner.$field.create(obj).await
            }

            async fn replace(&self, obj: &$kind) -> Result<$kind> {
                self.inner.$field.replace(obj).await
            }

            async fn delete(&self, namespace: &str, name: &str) -> Result<()> {
                self.inner.$field.delete(namespace, name).await
            }
        }
    };
}

delegate_store!(Secret, secrets);
delegate_store!(ConfigMap, config_maps);
delegate_store!(ServiceAccount, service_accounts);
