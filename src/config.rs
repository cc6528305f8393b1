//! Controller configuration
//!
//! Every option can be given as a flag or through its `APP_*` environment
//! variable, which is how the controller is configured in-cluster.

use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::error::{Error, Result};
use crate::labels::Role;

/// Namespaces that never receive copies
pub const DEFAULT_EXCLUDED_NAMESPACES: &str = "istio-system,knative-eventing,knative-serving,\
kube-node-lease,kube-public,kube-system,kyma-installer,kyma-integration,kyma-system,natss,\
compass-system";

/// Log output format
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Json,
    Text,
}

/// Config propagation controller options
#[derive(Parser, Debug, Clone)]
#[command(name = "config-propagation-controller", version, about)]
pub struct Config {
    /// Namespace holding the base resources
    #[arg(long, env = "APP_BASE_NAMESPACE", default_value = "kyma-system")]
    pub base_namespace: String,

    /// Namespaces that never receive copies
    #[arg(
        long,
        env = "APP_EXCLUDED_NAMESPACES",
        value_delimiter = ',',
        default_value = DEFAULT_EXCLUDED_NAMESPACES
    )]
    pub excluded_namespaces: Vec<String>,

    #[arg(long, env = "APP_NAMESPACE_REQUEUE_DURATION", default_value = "1m", value_parser = humantime::parse_duration)]
    pub namespace_requeue_duration: Duration,

    #[arg(long, env = "APP_SECRET_REQUEUE_DURATION", default_value = "1m", value_parser = humantime::parse_duration)]
    pub secret_requeue_duration: Duration,

    #[arg(long, env = "APP_CONFIGMAP_REQUEUE_DURATION", default_value = "1m", value_parser = humantime::parse_duration)]
    pub configmap_requeue_duration: Duration,

    #[arg(long, env = "APP_SERVICE_ACCOUNT_REQUEUE_DURATION", default_value = "1m", value_parser = humantime::parse_duration)]
    pub service_account_requeue_duration: Duration,

    /// Port of the metrics and health endpoints
    #[arg(long, env = "APP_METRICS_PORT", default_value_t = 8080)]
    pub metrics_port: u16,

    #[arg(long, env = "APP_LOG_FORMAT", value_enum, default_value = "json")]
    pub log_format: LogFormat,
}

impl Config {
    /// Requeue interval for base resources of a role
    pub fn requeue(&self, role: Role) -> Duration {
        match role {
            Role::Credentials => self.secret_requeue_duration,
            Role::Runtime => self.configmap_requeue_duration,
            Role::ServiceAccount => self.service_account_requeue_duration,
        }
    }

    /// Reject configurations the controller cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.base_namespace.trim().is_empty() {
            return Err(Error::config("base namespace must not be empty"));
        }
        let zero = [
            ("namespace", self.namespace_requeue_duration),
            ("secret", self.secret_requeue_duration),
            ("configmap", self.configmap_requeue_duration),
            ("service account", self.service_account_requeue_duration),
        ]
        .into_iter()
        .find(|(_, d)| d.is_zero());
        if let Some((kind, _)) = zero {
            return Err(Error::config(format!(
                "{} requeue duration must be greater than zero",
                kind
            )));
        }
        Ok(())
    }
}
