//! Namespace controller
//!
//! Watches all namespaces and fills the eligible ones with copies.

use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::core::v1::Namespace;
use kube::{
    runtime::{controller::Action, watcher::Config as WatcherConfig, Controller},
    Api, ResourceExt,
};
use tracing::{error, info, instrument};

use crate::controllers::{requeue_on_error, Context};
use crate::error::{Error, Result};
use crate::metrics;
use crate::reconcilers::namespace as namespace_reconciler;

const KIND: &str = "Namespace";

/// Run the Namespace controller
pub async fn run(context: Arc<Context>) {
    let api: Api<Namespace> = Api::all(context.client.clone());

    info!("Starting Namespace controller");

    Controller::new(api, WatcherConfig::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, context)
        .for_each(|result| async move {
            match result {
                Ok((obj, _action)) => {
                    info!(name = %obj.name, "Reconciled Namespace");
                }
                Err(e) => {
                    error!(error = %e, "Reconciliation error");
                    metrics::RECONCILIATION_ERRORS.with_label_values(&[KIND]).inc();
                }
            }
        })
        .await;
}

#[instrument(skip(ctx), fields(name = %ns.name_any()))]
async fn reconcile(ns: Arc<Namespace>, ctx: Arc<Context>) -> Result<Action> {
    let _timer = metrics::RECONCILE_DURATION
        .with_label_values(&[KIND])
        .start_timer();
    metrics::RECONCILIATIONS.with_label_values(&[KIND]).inc();

    namespace_reconciler::reconcile(&ns, &ctx.services, ctx.config.namespace_requeue_duration).await
}

fn error_policy(ns: Arc<Namespace>, error: &Error, _ctx: Arc<Context>) -> Action {
    error!(
        name = %ns.name_any(),
        error = %error,
        "Reconciliation failed, scheduling retry"
    );
    requeue_on_error(error)
}
