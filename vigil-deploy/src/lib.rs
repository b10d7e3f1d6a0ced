//! Dependency-ordered, health-gated deployment coordination.
//!
//! Services are layered into parallel-executable phases from their
//! dependency graph; each phase deploys concurrently, passes a per-service
//! health gate, and only then unlocks the next phase. Every deployment is
//! journaled as a single JSON document that survives process restarts, and a
//! failure anywhere marks the deployment failed before rollback is
//! requested.

pub mod coordinator;
pub mod error;
pub mod executor;
pub mod health;
pub mod plan;
pub mod state;

pub use coordinator::{DeploymentConfig, DeploymentCoordinator};
pub use error::{DeployError, Result};
pub use executor::{ScriptedExecutor, ServiceExecutor};
pub use health::{aggregate, classify_body, wait_for_health, HealthStatus, HttpProbe, ReadinessProbe};
pub use plan::plan;
pub use state::{DeploymentState, DeploymentStatus, LogEntry, ServiceDeployment, StateJournal};
