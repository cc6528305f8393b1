//! Object access used by the propagation services
//!
//! Services only talk to Kubernetes through these traits, so the same
//! replication logic runs against the API server and against the in-memory
//! store used by tests.

mod kube_store;
mod memory;

pub use kube_store::KubeStore;
pub use memory::{MemoryCluster, MemoryStore};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Secret, ServiceAccount};

use crate::error::Result;

/// CRUD over a namespaced kind
#[async_trait]
pub trait ObjectStore<K: Send + Sync>: Send + Sync {
    /// Fetch an object, `None` when it does not exist
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>>;

    /// List objects in a namespace matching a label selector
    async fn list(&self, namespace: &str, label_selector: &str) -> Result<Vec<K>>;

    /// Create an object in the namespace set in its metadata
    async fn create(&self, obj: &K) -> Result<K>;

    /// Replace an object; a set resourceVersion must match the stored one
    async fn replace(&self, obj: &K) -> Result<K>;

    async fn delete(&self, namespace: &str, name: &str) -> Result<()>;
}

/// Cluster-wide namespace listing
#[async_trait]
pub trait NamespaceLister: Send + Sync {
    async fn list_namespaces(&self) -> Result<Vec<Namespace>>;
}

/// Everything the propagation services need from one backend
pub trait ClusterStore:
    NamespaceLister
    + ObjectStore<Secret>
    + ObjectStore<ConfigMap>
    + ObjectStore<ServiceAccount>
    + Clone
    + 'static
{
}

impl<T> ClusterStore for T where
    T: NamespaceLister
        + ObjectStore<Secret>
        + ObjectStore<ConfigMap>
        + ObjectStore<ServiceAccount>
        + Clone
        + 'static
{
}
