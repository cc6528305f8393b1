//! Error types for the config propagation controller

use thiserror::Error;

use crate::labels::Role;

/// Result type alias using the controller's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Controller error types
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Object without a field the controller relies on
    #[error("Object is missing {0}")]
    MissingObjectKey(&'static str),

    /// Some copies of a base resource could not be written
    #[error("Propagating {role} '{name}' failed in {failed} of {total} namespaces")]
    Propagation {
        role: Role,
        name: String,
        failed: usize,
        total: usize,
    },

    /// Finalizer error
    #[error("Finalizer error: {0}")]
    Finalizer(#[source] Box<kube::runtime::finalizer::Error<Error>>),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// HTTP status code of an API error, if this is one
    pub fn api_code(&self) -> Option<u16> {
        match self {
            Error::Kube(kube::Error::Api(resp)) => Some(resp.code),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.api_code() == Some(404)
    }

    pub fn is_already_exists(&self) -> bool {
        self.api_code() == Some(409) && self.api_reason() == Some("AlreadyExists")
    }

    pub fn is_conflict(&self) -> bool {
        self.api_code() == Some(409) && self.api_reason() != Some("AlreadyExists")
    }

    fn api_reason(&self) -> Option<&str> {
        match self {
            Error::Kube(kube::Error::Api(resp)) => Some(resp.reason.as_str()),
            _ => None,
        }
    }
}
