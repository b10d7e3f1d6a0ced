//! The deployment coordinator: plan, execute, gate, roll back.
//!
//! Phases run strictly in order; services inside a phase deploy
//! concurrently. A service counts as deployed only after its health gate
//! passes. On any failure the deployment is marked failed first, then
//! rollback is requested for whatever already succeeded; the overall status
//! advances to rolled back once that completes.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{error, info, warn};

use crate::error::Result;
use crate::executor::ServiceExecutor;
use crate::health::{self, HealthStatus, ReadinessProbe};
use crate::plan;
use crate::state::{DeploymentState, DeploymentStatus, StateJournal};

/// Configuration for one coordinated deployment.
#[derive(Debug, Clone)]
pub struct DeploymentConfig {
    /// Services to deploy.
    pub services: Vec<String>,
    /// Dependency edges: key depends on each listed service.
    pub dependencies: BTreeMap<String, Vec<String>>,
    /// Target environment tag.
    pub environment: String,
    /// Budget for one phase's deployments.
    pub phase_timeout: Duration,
    /// Health gate probe attempts per service.
    pub health_retries: u32,
    /// Pause between health gate attempts.
    pub health_interval: Duration,
    /// Free-form metadata carried into the record.
    pub metadata: Value,
}

impl DeploymentConfig {
    /// A config with production defaults: 15 minute phases, 5 probes every
    /// 30 seconds.
    #[must_use]
    pub fn new(services: Vec<String>, environment: impl Into<String>) -> Self {
        Self {
            services,
            dependencies: BTreeMap::new(),
            environment: environment.into(),
            phase_timeout: Duration::from_secs(900),
            health_retries: 5,
            health_interval: Duration::from_secs(30),
            metadata: Value::Null,
        }
    }

    /// Declare that `service` depends on `on`.
    #[must_use]
    pub fn with_dependency(mut self, service: impl Into<String>, on: impl Into<String>) -> Self {
        self.dependencies
            .entry(service.into())
            .or_default()
            .push(on.into());
        self
    }

    /// Override the health gate policy.
    #[must_use]
    pub const fn with_health_gate(mut self, retries: u32, interval: Duration) -> Self {
        self.health_retries = retries;
        self.health_interval = interval;
        self
    }

    /// Override the phase timeout.
    #[must_use]
    pub const fn with_phase_timeout(mut self, timeout: Duration) -> Self {
        self.phase_timeout = timeout;
        self
    }
}

/// Number of log appends between periodic journal writes.
const FLUSH_EVERY: usize = 5;

/// Coordinates dependency-ordered, health-gated deployments.
pub struct DeploymentCoordinator {
    executor: Arc<dyn ServiceExecutor>,
    probe: Arc<dyn ReadinessProbe>,
    journal: StateJournal,
}

impl DeploymentCoordinator {
    /// Assemble a coordinator from its injected services.
    #[must_use]
    pub fn new(
        executor: Arc<dyn ServiceExecutor>,
        probe: Arc<dyn ReadinessProbe>,
        journal: StateJournal,
    ) -> Self {
        Self {
            executor,
            probe,
            journal,
        }
    }

    /// Run one coordinated deployment.
    ///
    /// Service and health failures are data: the returned record carries the
    /// failed/rolled-back status.
    ///
    /// # Errors
    ///
    /// [`DeployError::DependencyCycle`] before anything starts, or journal
    /// I/O failures.
    pub async fn deploy(&self, config: DeploymentConfig) -> Result<DeploymentState> {
        // A cycle refuses the deployment outright; no record is created.
        let phases = plan::plan(&config.services, &config.dependencies)?;

        let mut state =
            DeploymentState::new(&config.services, &config.environment, config.metadata.clone());
        let mut unflushed = 0usize;
        self.journal.save(&state).await?;

        info!(
            deployment = %state.deployment_id,
            environment = %config.environment,
            phases = phases.len(),
            "Coordinated deployment starting",
        );
        state.set_status(DeploymentStatus::InProgress);
        self.log(&mut state, &mut unflushed, format!(
            "Starting coordinated deployment of {:?} in {} phase(s)",
            config.services,
            phases.len()
        ))
        .await?;

        for (index, phase) in phases.iter().enumerate() {
            self.log(&mut state, &mut unflushed, format!(
                "Phase {}/{}: deploying {:?}",
                index + 1,
                phases.len(),
                phase
            ))
            .await?;

            if let Err(failed_service) = self
                .run_phase(&mut state, &mut unflushed, phase, &config)
                .await?
            {
                return self.fail(state, unflushed, &config, &failed_service).await;
            }
        }

        // Final gate: the whole system must aggregate healthy.
        let mut readings = BTreeMap::new();
        for service in &config.services {
            readings.insert(service.clone(), self.probe.check(service).await);
        }
        let system = health::aggregate(&readings);
        if system != HealthStatus::Healthy {
            warn!(deployment = %state.deployment_id, status = %system, "Final system health not healthy");
            return self.fail(state, unflushed, &config, "system health").await;
        }

        state.set_status(DeploymentStatus::Success);
        state.add_log("Coordinated deployment completed successfully");
        self.journal.save(&state).await?;
        info!(deployment = %state.deployment_id, "Deployment succeeded");
        Ok(state)
    }

    /// Execute one phase: concurrent deploys, then per-service health gates.
    ///
    /// Returns `Ok(Err(service))` naming the first failed service.
    async fn run_phase(
        &self,
        state: &mut DeploymentState,
        unflushed: &mut usize,
        phase: &[String],
        config: &DeploymentConfig,
    ) -> Result<std::result::Result<(), String>> {
        for service in phase {
            state.set_service_status(service, DeploymentStatus::InProgress)?;
            state.add_service_log(service, "deployment started");
        }
        self.journal.save(state).await?;

        let deploys = phase.iter().map(|service| {
            let executor = Arc::clone(&self.executor);
            let environment = config.environment.clone();
            async move {
                let outcome = executor.deploy(service, &environment).await;
                (service.clone(), outcome)
            }
        });
        let phase_run = futures::future::join_all(deploys);
        let outcomes = match tokio::time::timeout(config.phase_timeout, phase_run).await {
            Ok(outcomes) => outcomes,
            Err(_) => {
                // Whole-phase timeout: everything still in progress failed.
                for service in phase {
                    state.add_service_log(service, "phase timeout");
                    state.set_service_status(service, DeploymentStatus::Failed)?;
                }
                return Ok(Err(phase.first().cloned().unwrap_or_default()));
            }
        };

        let mut first_failure: Option<String> = None;
        for (service, outcome) in &outcomes {
            if let Err(err) = outcome {
                error!(service = %service, error = %err, "Service deployment failed");
                state.add_service_log(service, format!("deployment failed: {err}"));
                state.set_service_status(service, DeploymentStatus::Failed)?;
                first_failure.get_or_insert_with(|| service.clone());
            }
        }
        if let Some(service) = first_failure {
            // Services that deployed but were never gated stay ungraded;
            // they did not reach success.
            for (other, outcome) in &outcomes {
                if outcome.is_ok() {
                    state.add_service_log(other, "deploy finished but phase failed before gate");
                    state.set_service_status(other, DeploymentStatus::Failed)?;
                }
            }
            return Ok(Err(service));
        }

        // Health gate: a service succeeds only once it is observably ready.
        for service in phase {
            let status = health::wait_for_health(
                self.probe.as_ref(),
                service,
                config.health_retries,
                config.health_interval,
            )
            .await;
            state.set_service_health(service, status);
            if status == HealthStatus::Healthy {
                state.set_service_status(service, DeploymentStatus::Success)?;
                self.log(state, unflushed, format!("{service} deployed and healthy"))
                    .await?;
            } else {
                state.add_service_log(service, format!("health gate failed: {status}"));
                state.set_service_status(service, DeploymentStatus::Failed)?;
                return Ok(Err(service.clone()));
            }
        }

        Ok(Ok(()))
    }

    /// Failure path: mark failed, persist, then request rollback. Status
    /// advances to rolled back only when something was actually reverted.
    async fn fail(
        &self,
        mut state: DeploymentState,
        mut unflushed: usize,
        config: &DeploymentConfig,
        cause: &str,
    ) -> Result<DeploymentState> {
        state.add_log(format!("Deployment failed: {cause}"));
        state.set_status(DeploymentStatus::Failed);
        self.journal.save(&state).await?;

        state.rollback_requested = true;
        let mut succeeded: Vec<String> = state.services_with_status(DeploymentStatus::Success);
        if succeeded.is_empty() {
            self.log(&mut state, &mut unflushed, "Rollback requested; nothing to revert")
                .await?;
            self.journal.save(&state).await?;
            return Ok(state);
        }

        // Revert newest first so later phases unwind before their
        // dependencies.
        succeeded.sort_by_key(|s| {
            state
                .services
                .get(s)
                .and_then(|svc| svc.started_at)
                .unwrap_or(chrono::DateTime::<chrono::Utc>::MIN_UTC)
        });
        for service in succeeded.iter().rev() {
            match self.executor.rollback(service, &config.environment).await {
                Ok(()) => {
                    state.add_service_log(service, "rolled back");
                    state.set_service_status(service, DeploymentStatus::RolledBack)?;
                }
                Err(err) => {
                    error!(service = %service, error = %err, "Rollback failed");
                    state.add_service_log(service, format!("rollback failed: {err}"));
                }
            }
        }
        state.set_status(DeploymentStatus::RolledBack);
        self.journal.save(&state).await?;
        warn!(deployment = %state.deployment_id, "Deployment rolled back");
        Ok(state)
    }

    /// Append a log line, flushing the journal every few entries.
    async fn log(
        &self,
        state: &mut DeploymentState,
        unflushed: &mut usize,
        message: impl Into<String>,
    ) -> Result<()> {
        state.add_log(message);
        *unflushed += 1;
        if *unflushed >= FLUSH_EVERY {
            self.journal.save(state).await?;
            *unflushed = 0;
        }
        Ok(())
    }
}

impl std::fmt::Debug for DeploymentCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeploymentCoordinator").finish_non_exhaustive()
    }
}
