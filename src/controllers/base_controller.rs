//! Base resource controller
//!
//! Watches the labelled Secrets, ConfigMaps or ServiceAccounts in the base
//! namespace. A finalizer keeps a deleted base around until its copies are gone.

use std::sync::Arc;

use futures::StreamExt;
use kube::{
    runtime::{
        controller::{Action, Controller},
        finalizer::{finalizer, Event as FinalizerEvent},
        watcher::Config as WatcherConfig,
    },
    Api, Resource, ResourceExt,
};
use tracing::{error, info, instrument};

use crate::controllers::{requeue_on_error, Context};
use crate::error::{Error, Result};
use crate::labels::FINALIZER;
use crate::metrics;
use crate::reconcilers::{base as base_reconciler, Propagated};

/// Run the controller for base resources of kind `K`
pub async fn run<K: Propagated>(context: Arc<Context>) {
    let namespace = context.config.base_namespace.clone();
    let api: Api<K> = Api::namespaced(context.client.clone(), &namespace);
    let kind = K::kind(&()).to_string();

    info!(kind = %kind, namespace = %namespace, role = %K::ROLE, "Starting base resource controller");

    Controller::new(api, WatcherConfig::default().labels(&K::ROLE.selector()))
        .shutdown_on_signal()
        .run(reconcile::<K>, error_policy::<K>, context)
        .for_each(|result| {
            let kind = kind.clone();
            async move {
                match result {
                    Ok((obj, _action)) => {
                        info!(
                            kind = %kind,
                            name = %obj.name,
                            namespace = obj.namespace.as_deref().unwrap_or_default(),
                            "Reconciled base resource"
                        );
                    }
                    Err(e) => {
                        error!(kind = %kind, error = %e, "Reconciliation error");
                        metrics::RECONCILIATION_ERRORS.with_label_values(&[&kind]).inc();
                    }
                }
            }
        })
        .await;
}

#[instrument(skip(ctx), fields(name = %obj.name_any(), role = %K::ROLE))]
async fn reconcile<K: Propagated>(obj: Arc<K>, ctx: Arc<Context>) -> Result<Action> {
    let kind = K::kind(&()).to_string();
    let _timer = metrics::RECONCILE_DURATION
        .with_label_values(&[&kind])
        .start_timer();
    metrics::RECONCILIATIONS.with_label_values(&[&kind]).inc();

    let api: Api<K> = Api::namespaced(ctx.client.clone(), &ctx.config.base_namespace);
    let requeue = ctx.config.requeue(K::ROLE);

    finalizer(&api, FINALIZER, obj, |event| async {
        match event {
            FinalizerEvent::Apply(base) => {
                base_reconciler::apply(base.as_ref(), &ctx.services, requeue).await
            }
            FinalizerEvent::Cleanup(base) => {
                base_reconciler::cleanup(base.as_ref(), &ctx.services).await
            }
        }
    })
    .await
    .map_err(|e| Error::Finalizer(Box::new(e)))
}

fn error_policy<K: Propagated>(obj: Arc<K>, error: &Error, _ctx: Arc<Context>) -> Action {
    error!(
        name = %obj.name_any(),
        role = %K::ROLE,
        error = %error,
        "Reconciliation failed, scheduling retry"
    );
    requeue_on_error(error)
}
