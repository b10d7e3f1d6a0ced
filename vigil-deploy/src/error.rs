//! Error types for the deployment coordinator.

use thiserror::Error;

/// A type alias for `Result<T, DeployError>`.
pub type Result<T> = std::result::Result<T, DeployError>;

/// Failures of the deployment coordinator.
#[derive(Debug, Error)]
pub enum DeployError {
    /// The dependency graph contains a cycle; the deployment never starts.
    #[error("dependency cycle among services: {0:?}")]
    DependencyCycle(Vec<String>),

    /// A service deployment failed.
    #[error("service '{service}' failed: {message}")]
    Service {
        /// The failing service.
        service: String,
        /// Failure description.
        message: String,
    },

    /// A service never became healthy within its budget.
    #[error("service '{0}' failed its health gate")]
    Health(String),

    /// A service status update violated the pending → in_progress →
    /// terminal progression.
    #[error("illegal status transition for '{service}': {from} -> {to}")]
    InvalidTransition {
        /// The service whose status was updated.
        service: String,
        /// Status before the update.
        from: String,
        /// Requested status.
        to: String,
    },

    /// Unknown service referenced by an update.
    #[error("unknown service '{0}'")]
    UnknownService(String),

    /// Journal I/O failure.
    #[error("journal i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Journal serialization failure.
    #[error("journal serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DeployError {
    /// Create a service failure.
    #[must_use]
    pub fn service(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Service {
            service: service.into(),
            message: message.into(),
        }
    }
}
