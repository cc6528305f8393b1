//! Prometheus metrics for the config propagation controller
//!
//! Reconciliation and per-copy counters, served together with the health
//! endpoints.

mod exporter;

pub use exporter::*;
