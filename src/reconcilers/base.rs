//! Base resource reconciler
//!
//! Handles a single base Secret, ConfigMap or ServiceAccount:
//! - apply: classify the change and sync every target namespace
//! - cleanup: delete the managed copies before the finalizer is released

use std::time::Duration;

use kube::{runtime::controller::Action, ResourceExt};
use tracing::{debug, info, instrument};

use crate::error::Result;
use crate::metrics;
use crate::store::{ClusterStore, ObjectStore};

use super::{Propagated, Services};

/// Propagate a created or updated base resource
#[instrument(skip_all, fields(role = %K::ROLE, name = %base.name_any()))]
pub async fn apply<K, S>(base: &K, services: &Services<S>, requeue: Duration) -> Result<Action>
where
    K: Propagated,
    S: ClusterStore + ObjectStore<K>,
{
    let service = K::service(services);
    if !service.is_base(base) {
        debug!("Not a base resource, ignoring");
        return Ok(Action::await_change());
    }

    let change = service.observe(base);
    let targets = services.namespaces.list_targets().await?;
    metrics::TARGET_NAMESPACES.set(targets.len() as f64);

    info!(change = ?change, namespaces = targets.len(), "Propagating base resource");
    service.sync(&targets, base, change).await?;

    Ok(Action::requeue(requeue))
}

/// Remove the copies of a deleted base resource
#[instrument(skip_all, fields(role = %K::ROLE, name = %base.name_any()))]
pub async fn cleanup<K, S>(base: &K, services: &Services<S>) -> Result<Action>
where
    K: Propagated,
    S: ClusterStore + ObjectStore<K>,
{
    let service = K::service(services);
    let targets = services.namespaces.list_targets().await?;

    info!(namespaces = targets.len(), "Removing copies of deleted base resource");
    service.delete_from(&targets, base).await?;
    service.forget(&base.name_any());

    metrics::CLEANUPS
        .with_label_values(&[K::ROLE.label_value()])
        .inc();

    Ok(Action::await_change())
}
