//! Single-writer state store with concurrent snapshot readers.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;

use crate::domains::DomainKind;
use crate::error::{ErrorRecord, RuntimeError};
use crate::message::Message;
use crate::state::{DomainFinding, InvestigationState, RoutingDecision, StateUpdate};

/// In-process store for one investigation record.
///
/// The store is single-writer within one investigation (the graph runtime),
/// while concurrent readers may take snapshots at any time. All writes go
/// through [`StateStore::apply`] so the merge semantics live in one place.
#[derive(Debug, Clone)]
pub struct StateStore {
    inner: Arc<RwLock<InvestigationState>>,
}

impl StateStore {
    /// Wrap a fresh investigation record.
    #[must_use]
    pub fn new(state: InvestigationState) -> Self {
        Self {
            inner: Arc::new(RwLock::new(state)),
        }
    }

    /// A point-in-time copy of the record.
    pub async fn snapshot(&self) -> InvestigationState {
        self.inner.read().await.clone()
    }

    /// Merge an update and return the resulting snapshot.
    ///
    /// # Errors
    ///
    /// Propagates invariant violations from the merge.
    pub async fn apply(&self, update: StateUpdate) -> Result<InvestigationState, RuntimeError> {
        let mut guard = self.inner.write().await;
        update.apply(&mut guard)?;
        Ok(guard.clone())
    }

    /// Append one message.
    pub async fn append_message(&self, message: Message) -> Result<(), RuntimeError> {
        self.apply(StateUpdate::empty().with_message(message))
            .await
            .map(|_| ())
    }

    /// Record the latest parsed result for a tool.
    ///
    /// Re-recording an identical result is a no-op on both `tools_used` and
    /// `tool_results`.
    pub async fn record_tool_result(
        &self,
        name: impl Into<String>,
        value: Value,
    ) -> Result<(), RuntimeError> {
        let mut update = StateUpdate::empty();
        update.tool_results.insert(name.into(), value);
        self.apply(update).await.map(|_| ())
    }

    /// Record a domain completion.
    pub async fn mark_domain_complete(
        &self,
        domain: DomainKind,
        finding: DomainFinding,
    ) -> Result<(), RuntimeError> {
        self.apply(StateUpdate::empty().with_domain_finding(domain, finding))
            .await
            .map(|_| ())
    }

    /// Increment the orchestrator loop counter.
    pub async fn increment_orchestrator_loops(&self) -> Result<u32, RuntimeError> {
        let mut update = StateUpdate::empty();
        update.orchestrator_loop_increment = 1;
        self.apply(update).await.map(|s| s.orchestrator_loops)
    }

    /// Append an error record.
    pub async fn append_error(&self, error: ErrorRecord) -> Result<(), RuntimeError> {
        self.apply(StateUpdate::empty().with_error(error))
            .await
            .map(|_| ())
    }

    /// Append a routing decision to the audit trail.
    pub async fn append_routing(&self, decision: RoutingDecision) -> Result<(), RuntimeError> {
        let mut update = StateUpdate::empty();
        update.routing_decisions.push(decision);
        self.apply(update).await.map(|_| ())
    }

    /// Finalise the timing fields. Permitted even after completion.
    pub async fn finalise_timing(&self) -> InvestigationState {
        let mut guard = self.inner.write().await;
        guard.finalise_timing();
        guard.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::EntityType;
    use serde_json::json;

    #[tokio::test]
    async fn snapshots_are_isolated_from_later_writes() {
        let store = StateStore::new(InvestigationState::new(EntityType::Email, "a@b.c", 7));
        let before = store.snapshot().await;
        store
            .record_tool_result("ip_reputation", json!({"score": 0.2}))
            .await
            .unwrap();
        assert!(before.tool_results.is_empty());
        assert_eq!(store.snapshot().await.tool_results.len(), 1);
    }

    #[tokio::test]
    async fn reprocessing_a_tool_result_is_idempotent() {
        let store = StateStore::new(InvestigationState::new(EntityType::Email, "a@b.c", 7));
        store
            .record_tool_result("ip_reputation", json!({"score": 0.2}))
            .await
            .unwrap();
        store
            .record_tool_result("ip_reputation", json!({"score": 0.2}))
            .await
            .unwrap();

        let state = store.snapshot().await;
        assert_eq!(state.tools_used.len(), 1);
        assert_eq!(state.tool_results["ip_reputation"], json!({"score": 0.2}));
    }

    #[tokio::test]
    async fn timing_finalisation_is_idempotent() {
        let store = StateStore::new(InvestigationState::new(EntityType::Email, "a@b.c", 7));
        let first = store.finalise_timing().await;
        let second = store.finalise_timing().await;
        assert_eq!(first.end_time, second.end_time);
    }
}
