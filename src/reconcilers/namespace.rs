//! Namespace reconciler
//!
//! A namespace that becomes a target gets a copy of every base resource.
//! Periodic requeues repair copies that drifted or were removed.

use std::time::Duration;

use k8s_openapi::api::core::v1::Namespace;
use kube::{runtime::controller::Action, Resource, ResourceExt};
use tracing::{debug, info, instrument, warn};

use crate::error::{Error, Result};
use crate::services::{BaseResourceService, Change, Replica};
use crate::store::{ClusterStore, ObjectStore};

use super::Services;

/// Sync every base resource into `ns`
#[instrument(skip_all, fields(namespace = %ns.name_any()))]
pub async fn reconcile<S: ClusterStore>(
    ns: &Namespace,
    services: &Services<S>,
    requeue: Duration,
) -> Result<Action> {
    if !services.namespaces.is_target(ns) {
        debug!("Namespace is excluded or terminating, skipping");
        return Ok(Action::await_change());
    }

    let targets = [ns.name_any()];
    let results = [
        propagate_all(&services.credentials, &targets).await,
        propagate_all(&services.runtimes, &targets).await,
        propagate_all(&services.service_accounts, &targets).await,
    ];

    let mut first_error = None;
    for result in results {
        if let Err(e) = result {
            warn!(error = %e, "Propagation into namespace incomplete");
            first_error.get_or_insert(e);
        }
    }
    if let Some(e) = first_error {
        return Err(e);
    }

    info!("Namespace is up to date");
    Ok(Action::requeue(requeue))
}

async fn propagate_all<K, S>(service: &BaseResourceService<K, S>, targets: &[String]) -> Result<()>
where
    K: Replica,
    S: ObjectStore<K>,
{
    let mut first_error: Option<Error> = None;
    for base in service.list_base().await? {
        if base.meta().deletion_timestamp.is_some() {
            continue;
        }
        if let Err(e) = service.sync(targets, &base, Change::Updated).await {
            first_error.get_or_insert(e);
        }
    }
    first_error.map_or(Ok(()), Err)
}
