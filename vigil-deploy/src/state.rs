//! The deployment record and its on-disk journal.
//!
//! One JSON document per deployment at `<state_dir>/<deployment_id>.json`,
//! readable by any process. Writes are serialised per deployment: periodic
//! while logs accumulate, mandatory at every terminal transition.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::error::{DeployError, Result};
use crate::health::HealthStatus;

/// Status of a deployment or of one service within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    /// Created, not started.
    Pending,
    /// Work underway.
    InProgress,
    /// Finished successfully.
    Success,
    /// Finished with a failure.
    Failed,
    /// Failure handled; previously deployed services reverted.
    RolledBack,
}

impl DeploymentStatus {
    /// Whether this status ends the record's lifecycle.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::RolledBack)
    }

    /// snake_case name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::RolledBack => "rolled_back",
        }
    }
}

impl std::fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A timestamped log line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// When the line was recorded.
    pub at: DateTime<Utc>,
    /// The message.
    pub message: String,
}

/// Per-service deployment sub-state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDeployment {
    /// Service name.
    pub service: String,
    /// Current status. Advances pending → in_progress → {success, failed}.
    pub status: DeploymentStatus,
    /// Set when work starts.
    pub started_at: Option<DateTime<Utc>>,
    /// Set at the terminal transition.
    pub completed_at: Option<DateTime<Utc>>,
    /// Last health gate reading.
    pub health: Option<HealthStatus>,
    /// Service-scoped log lines.
    pub logs: Vec<LogEntry>,
}

impl ServiceDeployment {
    fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            status: DeploymentStatus::Pending,
            started_at: None,
            completed_at: None,
            health: None,
            logs: Vec::new(),
        }
    }
}

/// The journaled record of one deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentState {
    /// Unique deployment id.
    pub deployment_id: String,
    /// Target environment tag.
    pub environment: String,
    /// Overall status.
    pub status: DeploymentStatus,
    /// Per-service sub-states.
    pub services: BTreeMap<String, ServiceDeployment>,
    /// Deployment-scoped log lines.
    pub logs: Vec<LogEntry>,
    /// Produced artifacts (image digests, bundle hashes).
    pub artifacts: BTreeMap<String, String>,
    /// Free-form metadata.
    pub metadata: Value,
    /// Whether a rollback was requested after a failure.
    pub rollback_requested: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
    /// Set at the terminal transition.
    pub end_time: Option<DateTime<Utc>>,
}

impl DeploymentState {
    /// Create a fresh pending record for the given services.
    #[must_use]
    pub fn new(services: &[String], environment: impl Into<String>, metadata: Value) -> Self {
        let now = Utc::now();
        Self {
            deployment_id: format!("deploy-{}", Uuid::new_v4()),
            environment: environment.into(),
            status: DeploymentStatus::Pending,
            services: services
                .iter()
                .map(|s| (s.clone(), ServiceDeployment::new(s.clone())))
                .collect(),
            logs: Vec::new(),
            artifacts: BTreeMap::new(),
            metadata,
            rollback_requested: false,
            created_at: now,
            updated_at: now,
            end_time: None,
        }
    }

    /// Update the overall status. Terminal transitions stamp `end_time`.
    pub fn set_status(&mut self, status: DeploymentStatus) {
        self.status = status;
        self.updated_at = Utc::now();
        if status.is_terminal() && self.end_time.is_none() {
            self.end_time = Some(self.updated_at);
        }
        info!(deployment = %self.deployment_id, status = %status, "Deployment status updated");
    }

    /// Advance a service's status.
    ///
    /// # Errors
    ///
    /// [`DeployError::UnknownService`] for an unregistered service, or
    /// [`DeployError::InvalidTransition`] when the update would move a
    /// service backwards or out of a terminal state.
    pub fn set_service_status(
        &mut self,
        service: &str,
        status: DeploymentStatus,
    ) -> Result<()> {
        let entry = self
            .services
            .get_mut(service)
            .ok_or_else(|| DeployError::UnknownService(service.to_owned()))?;

        let legal = matches!(
            (entry.status, status),
            (DeploymentStatus::Pending, DeploymentStatus::InProgress)
                | (
                    DeploymentStatus::InProgress,
                    DeploymentStatus::Success | DeploymentStatus::Failed
                )
                | (
                    DeploymentStatus::Success | DeploymentStatus::Failed,
                    DeploymentStatus::RolledBack
                )
        );
        if !legal {
            return Err(DeployError::InvalidTransition {
                service: service.to_owned(),
                from: entry.status.as_str().to_owned(),
                to: status.as_str().to_owned(),
            });
        }

        let now = Utc::now();
        entry.status = status;
        if status == DeploymentStatus::InProgress && entry.started_at.is_none() {
            entry.started_at = Some(now);
        }
        if matches!(status, DeploymentStatus::Success | DeploymentStatus::Failed) {
            entry.completed_at = Some(now);
        }
        self.updated_at = now;
        Ok(())
    }

    /// Record a health reading for a service.
    pub fn set_service_health(&mut self, service: &str, health: HealthStatus) {
        if let Some(entry) = self.services.get_mut(service) {
            entry.health = Some(health);
            self.updated_at = Utc::now();
        }
    }

    /// Append a deployment-scoped log line.
    pub fn add_log(&mut self, message: impl Into<String>) {
        self.logs.push(LogEntry {
            at: Utc::now(),
            message: message.into(),
        });
        self.updated_at = Utc::now();
    }

    /// Append a service-scoped log line.
    pub fn add_service_log(&mut self, service: &str, message: impl Into<String>) {
        if let Some(entry) = self.services.get_mut(service) {
            entry.logs.push(LogEntry {
                at: Utc::now(),
                message: message.into(),
            });
            self.updated_at = Utc::now();
        }
    }

    /// Whether every service reached success.
    #[must_use]
    pub fn all_services_succeeded(&self) -> bool {
        self.services
            .values()
            .all(|s| s.status == DeploymentStatus::Success)
    }

    /// Services currently in the given status.
    #[must_use]
    pub fn services_with_status(&self, status: DeploymentStatus) -> Vec<String> {
        self.services
            .values()
            .filter(|s| s.status == status)
            .map(|s| s.service.clone())
            .collect()
    }
}

/// Journal writing one JSON document per deployment under a state directory.
#[derive(Debug, Clone)]
pub struct StateJournal {
    state_dir: PathBuf,
}

impl StateJournal {
    /// Journal rooted at `state_dir` (created on first save).
    #[must_use]
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
        }
    }

    /// The document path for a deployment id.
    #[must_use]
    pub fn path_for(&self, deployment_id: &str) -> PathBuf {
        self.state_dir.join(format!("{deployment_id}.json"))
    }

    /// Persist the full record.
    ///
    /// # Errors
    ///
    /// Fails on directory creation, serialization, or write errors.
    pub async fn save(&self, state: &DeploymentState) -> Result<()> {
        tokio::fs::create_dir_all(&self.state_dir).await?;
        let body = serde_json::to_vec_pretty(state)?;
        tokio::fs::write(self.path_for(&state.deployment_id), body).await?;
        Ok(())
    }

    /// Reload a record by id.
    ///
    /// # Errors
    ///
    /// Fails when the document is missing or corrupt.
    pub async fn load(&self, deployment_id: &str) -> Result<DeploymentState> {
        let body = tokio::fs::read(self.path_for(deployment_id)).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Load a record from an explicit path.
    ///
    /// # Errors
    ///
    /// Fails when the document is missing or corrupt.
    pub async fn load_path(path: &Path) -> Result<DeploymentState> {
        let body = tokio::fs::read(path).await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn services() -> Vec<String> {
        vec!["backend".to_owned(), "frontend".to_owned()]
    }

    #[test]
    fn service_status_only_advances() {
        let mut state = DeploymentState::new(&services(), "staging", json!({}));
        state
            .set_service_status("backend", DeploymentStatus::InProgress)
            .unwrap();
        state
            .set_service_status("backend", DeploymentStatus::Success)
            .unwrap();

        // Backwards and repeated terminal transitions are rejected.
        assert!(state
            .set_service_status("backend", DeploymentStatus::InProgress)
            .is_err());
        assert!(state
            .set_service_status("frontend", DeploymentStatus::Success)
            .is_err());
    }

    #[test]
    fn terminal_status_stamps_end_time() {
        let mut state = DeploymentState::new(&services(), "staging", json!({}));
        assert!(state.end_time.is_none());
        state.set_status(DeploymentStatus::Failed);
        assert!(state.end_time.is_some());
        assert_eq!(state.status, DeploymentStatus::Failed);
    }

    #[test]
    fn unknown_service_is_an_error() {
        let mut state = DeploymentState::new(&services(), "staging", json!({}));
        assert!(matches!(
            state.set_service_status("db", DeploymentStatus::InProgress),
            Err(DeployError::UnknownService(_))
        ));
    }

    #[tokio::test]
    async fn journal_round_trip_is_lossless() {
        let dir = assert_fs::TempDir::new().unwrap();
        let journal = StateJournal::new(dir.path());

        let mut state = DeploymentState::new(&services(), "staging", json!({"ticket": "OPS-12"}));
        state
            .set_service_status("backend", DeploymentStatus::InProgress)
            .unwrap();
        state.add_log("backend deploy started");
        state.add_service_log("backend", "pulling image");
        state.set_service_health("backend", HealthStatus::Healthy);
        state.set_status(DeploymentStatus::InProgress);

        journal.save(&state).await.unwrap();
        let reloaded = journal.load(&state.deployment_id).await.unwrap();
        assert_eq!(reloaded, state);
    }
}
