//! Propagation services
//!
//! `NamespaceService` picks the target namespaces; the base resource services
//! cache what lives in the base namespace and write the copies.

mod base;
mod credentials;
mod namespace;
mod runtimes;
mod service_account;

pub use base::*;
pub use credentials::*;
pub use namespace::*;
pub use runtimes::*;
pub use service_account::*;
