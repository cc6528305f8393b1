//! Reconcilers for the propagated kinds
//!
//! This module contains the business logic run by the controllers:
//! - Filling new and existing namespaces with every base resource
//! - Fanning a changed base resource out to all target namespaces
//! - Removing copies when a base resource is deleted

pub mod base;
pub mod namespace;

use k8s_openapi::api::core::v1::{ConfigMap, Secret, ServiceAccount};
use k8s_openapi::NamespaceResourceScope;
use kube::Resource;
use serde::{de::DeserializeOwned, Serialize};

use crate::config::Config;
use crate::error::Result;
use crate::services::{
    BaseResourceService, CredentialsService, NamespaceService, Replica, RuntimesService,
    ServiceAccountService,
};
use crate::store::ClusterStore;

/// All propagation services sharing one backend
pub struct Services<S> {
    pub namespaces: NamespaceService<S>,
    pub credentials: CredentialsService<S>,
    pub runtimes: RuntimesService<S>,
    pub service_accounts: ServiceAccountService<S>,
}

impl<S: ClusterStore> Services<S> {
    pub fn new(store: S, config: &Config) -> Self {
        Self {
            namespaces: NamespaceService::new(store.clone(), config),
            credentials: CredentialsService::new(store.clone(), config),
            runtimes: RuntimesService::new(store.clone(), config),
            service_accounts: ServiceAccountService::new(store, config),
        }
    }

    /// Fill the base resource caches before the controllers start
    pub async fn warm_up(&self) -> Result<usize> {
        let credentials = self.credentials.list_base().await?.len();
        let runtimes = self.runtimes.list_base().await?.len();
        let service_accounts = self.service_accounts.list_base().await?.len();
        Ok(credentials + runtimes + service_accounts)
    }
}

/// A replicated kind together with the service that owns it
pub trait Propagated:
    Replica
    + Resource<Scope = NamespaceResourceScope>
    + Serialize
    + DeserializeOwned
{
    fn service<S: ClusterStore>(services: &Services<S>) -> &BaseResourceService<Self, S>;
}

impl Propagated for Secret {
    fn service<S: ClusterStore>(services: &Services<S>) -> &BaseResourceService<Self, S> {
        &services.credentials
    }
}

impl Propagated for ConfigMap {
    fn service<S: ClusterStore>(services: &Services<S>) -> &BaseResourceService<Self, S> {
        &services.runtimes
    }
}

impl Propagated for ServiceAccount {
    fn service<S: ClusterStore>(services: &Services<S>) -> &BaseResourceService<Self, S> {
        &services.service_accounts
    }
}
