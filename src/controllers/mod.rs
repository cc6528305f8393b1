//! Kubernetes controllers for the propagated kinds
//!
//! This module wires the reconcilers into `kube::runtime::Controller`
//! instances: one for namespaces and one per base resource kind.

mod base_controller;
mod namespace_controller;

pub use namespace_controller::run as run_namespace_controller;

use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::core::v1::{ConfigMap, Secret, ServiceAccount};
use kube::runtime::{controller::Action, finalizer};
use kube::Client;

use crate::config::Config;
use crate::error::Error;
use crate::reconcilers::Services;
use crate::store::KubeStore;

/// Shared context for all controllers
pub struct Context {
    /// Kubernetes client
    pub client: Client,
    pub config: Config,
    pub services: Services<KubeStore>,
}

impl Context {
    /// Create a new context
    pub fn new(client: Client, config: Config) -> Self {
        let services = Services::new(KubeStore::new(client.clone()), &config);
        Self {
            client,
            config,
            services,
        }
    }
}

/// Run the credentials (Secret) controller
pub async fn run_credentials_controller(context: Arc<Context>) {
    base_controller::run::<Secret>(context).await
}

/// Run the runtime (ConfigMap) controller
pub async fn run_runtime_controller(context: Arc<Context>) {
    base_controller::run::<ConfigMap>(context).await
}

/// Run the ServiceAccount controller
pub async fn run_service_account_controller(context: Arc<Context>) {
    base_controller::run::<ServiceAccount>(context).await
}

/// Delay before retrying a failed reconciliation
pub fn retry_delay(error: &Error) -> Duration {
    match error {
        Error::Finalizer(inner) => match inner.as_ref() {
            finalizer::Error::ApplyFailed(e) | finalizer::Error::CleanupFailed(e) => retry_delay(e),
            _ => Duration::from_secs(30),
        },
        e if e.is_conflict() => Duration::from_secs(5),
        Error::Propagation { .. } => Duration::from_secs(15),
        Error::Config(_) | Error::MissingObjectKey(_) => Duration::from_secs(300),
        _ => Duration::from_secs(30),
    }
}

fn requeue_on_error(error: &Error) -> Action {
    Action::requeue(retry_delay(error))
}
