//! Object store backed by the Kubernetes API

use std::fmt::Debug;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::NamespaceResourceScope;
use kube::{
    api::{DeleteParams, ListParams, PostParams},
    Api, Client, Resource, ResourceExt,
};
use serde::{de::DeserializeOwned, Serialize};

use crate::error::{Error, Result};

use super::{NamespaceLister, ObjectStore};

/// Thin wrapper over `kube::Api` for every propagated kind
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        <K as Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn namespace_of<K: Resource>(obj: &K) -> Result<&str> {
    obj.meta()
        .namespace
        .as_deref()
        .ok_or(Error::MissingObjectKey(".metadata.namespace"))
}

#[async_trait]
impl<K> ObjectStore<K> for KubeStore
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static,
{
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>> {
        Ok(self.api::<K>(namespace).get_opt(name).await?)
    }

    async fn list(&self, namespace: &str, label_selector: &str) -> Result<Vec<K>> {
        let params = ListParams::default().labels(label_selector);
        Ok(self.api::<K>(namespace).list(&params).await?.items)
    }

    async fn create(&self, obj: &K) -> Result<K> {
        let api = self.api::<K>(namespace_of(obj)?);
        Ok(api.create(&PostParams::default(), obj).await?)
    }

    async fn replace(&self, obj: &K) -> Result<K> {
        let api = self.api::<K>(namespace_of(obj)?);
        Ok(api
            .replace(&obj.name_any(), &PostParams::default(), obj)
            .await?)
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<()> {
        self.api::<K>(namespace)
            .delete(name, &DeleteParams::default())
            .await?;
        Ok(())
    }
}

#[async_trait]
impl NamespaceLister for KubeStore {
    async fn list_namespaces(&self) -> Result<Vec<Namespace>> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        Ok(api.list(&ListParams::default()).await?.items)
    }
}
