//! The per-service deployment surface.
//!
//! The coordinator is agnostic to how a service actually ships; it drives an
//! injected [`ServiceExecutor`]. A scripted implementation is provided for
//! tests and dry runs.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::{DeployError, Result};

/// Deploys and rolls back individual services.
#[async_trait]
pub trait ServiceExecutor: Send + Sync {
    /// Deploy one service into the environment.
    ///
    /// # Errors
    ///
    /// [`DeployError::Service`] on failure; the coordinator marks the phase
    /// failed and requests rollback.
    async fn deploy(&self, service: &str, environment: &str) -> Result<()>;

    /// Revert one previously deployed service.
    ///
    /// # Errors
    ///
    /// [`DeployError::Service`] when the revert itself fails.
    async fn rollback(&self, service: &str, environment: &str) -> Result<()>;
}

/// Scripted executor: per-service canned outcomes, recorded invocations.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    failures: BTreeMap<String, String>,
    log: std::sync::Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    /// An executor where every deploy succeeds.
    #[must_use]
    pub fn succeeding() -> Self {
        Self::default()
    }

    /// Make one service's deploy fail with the given message.
    #[must_use]
    pub fn with_failure(mut self, service: impl Into<String>, message: impl Into<String>) -> Self {
        self.failures.insert(service.into(), message.into());
        self
    }

    /// The recorded invocations, in order (`deploy:x` / `rollback:x`).
    #[must_use]
    pub fn invocations(&self) -> Vec<String> {
        self.log
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    fn record(&self, entry: String) {
        self.log
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(entry);
    }
}

#[async_trait]
impl ServiceExecutor for ScriptedExecutor {
    async fn deploy(&self, service: &str, _environment: &str) -> Result<()> {
        self.record(format!("deploy:{service}"));
        match self.failures.get(service) {
            Some(message) => Err(DeployError::service(service, message.clone())),
            None => Ok(()),
        }
    }

    async fn rollback(&self, service: &str, _environment: &str) -> Result<()> {
        self.record(format!("rollback:{service}"));
        Ok(())
    }
}
