//! Config propagation controller
//!
//! Replicates base credentials (Secrets), runtimes (ConfigMaps) and the
//! function ServiceAccount from a privileged namespace into every other
//! eligible namespace, and keeps the copies in sync.

pub mod config;
pub mod controllers;
pub mod error;
pub mod labels;
pub mod metrics;
pub mod reconcilers;
pub mod services;
pub mod store;

pub use error::{Error, Result};
