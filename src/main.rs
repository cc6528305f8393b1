//! Config propagation controller
//!
//! Main entry point. Parses the configuration, fills the base resource
//! caches, and runs the namespace and base resource controllers.

use std::sync::Arc;

use clap::Parser;
use kube::Client;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config_propagation_controller::{
    config::{Config, LogFormat},
    controllers::{self, Context},
    metrics,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    init_tracing(config.log_format);
    config.validate()?;

    info!(
        base_namespace = %config.base_namespace,
        excluded = ?config.excluded_namespaces,
        "Starting config propagation controller"
    );

    // Create Kubernetes client
    let client = Client::try_default().await?;
    info!("Connected to Kubernetes API server");

    let metrics_port = config.metrics_port;
    let context = Arc::new(Context::new(client, config));

    // Start metrics server
    let metrics_handle = tokio::spawn(metrics::serve(metrics_port));
    info!("Metrics server starting on port {}", metrics_port);

    let cached = context.services.warm_up().await?;
    info!(base_resources = cached, "Base resource caches synced");
    metrics::mark_ready();

    // Run all controllers concurrently
    let namespace_controller = controllers::run_namespace_controller(context.clone());
    let credentials_controller = controllers::run_credentials_controller(context.clone());
    let runtime_controller = controllers::run_runtime_controller(context.clone());
    let service_account_controller = controllers::run_service_account_controller(context.clone());

    // Handle graceful shutdown
    tokio::select! {
        _ = namespace_controller => {
            error!("Namespace controller exited unexpectedly");
        }
        _ = credentials_controller => {
            error!("Credentials controller exited unexpectedly");
        }
        _ = runtime_controller => {
            error!("Runtime controller exited unexpectedly");
        }
        _ = service_account_controller => {
            error!("ServiceAccount controller exited unexpectedly");
        }
        _ = metrics_handle => {
            error!("Metrics server exited unexpectedly");
        }
        _ = shutdown_signal() => {
            info!("Received shutdown signal, stopping controller");
        }
    }

    metrics::OPERATOR_HEALTH.set(0.0);
    info!("Config propagation controller stopped");
    Ok(())
}

/// Initialize tracing subscriber
fn init_tracing(format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,kube=warn,hyper=warn"));

    let registry = tracing_subscriber::registry().with(env_filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install CTRL+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received CTRL+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
