//! Typed state updates and the merge that applies them.
//!
//! Nodes never mutate [`InvestigationState`](super::InvestigationState)
//! directly; they return a [`StateUpdate`] which the runtime merges. Merge
//! semantics: last-writer-wins for scalars, union for sets, append for
//! sequences, map-merge for tool results and domain findings.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use crate::domains::DomainKind;
use crate::error::{ErrorRecord, RuntimeError};
use crate::message::Message;
use crate::phase::Phase;
use crate::state::{DomainFinding, InvestigationState, RoutingDecision};

/// A typed record of everything one node execution changed.
#[derive(Debug, Clone, Default)]
pub struct StateUpdate {
    /// Requested phase transition.
    pub set_phase: Option<Phase>,
    /// Messages to append, in order.
    pub messages: Vec<Message>,
    /// Tool names invoked by this node, unioned into the state's set.
    pub tools_used: BTreeSet<String>,
    /// Tool results to record: `(name, parsed_value)`.
    pub tool_results: BTreeMap<String, Value>,
    /// Warehouse result to record.
    pub snowflake_data: Option<Value>,
    /// Mark the warehouse phase complete.
    pub snowflake_completed: bool,
    /// Domain completions to record.
    pub domain_findings: Vec<(DomainKind, DomainFinding)>,
    /// Final risk score.
    pub risk_score: Option<f64>,
    /// Final confidence score.
    pub confidence_score: Option<f64>,
    /// Increment to the orchestrator loop counter.
    pub orchestrator_loop_increment: u32,
    /// Increment to the tool execution attempt counter.
    pub tool_attempt_increment: u32,
    /// Errors to append.
    pub errors: Vec<ErrorRecord>,
    /// Routing decisions to append.
    pub routing_decisions: Vec<RoutingDecision>,
    /// Phases to mark as skipped due to a fatal error.
    pub skipped_phases: Vec<Phase>,
}

impl StateUpdate {
    /// An update that changes nothing.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether the update changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.set_phase.is_none()
            && self.messages.is_empty()
            && self.tools_used.is_empty()
            && self.tool_results.is_empty()
            && self.snowflake_data.is_none()
            && !self.snowflake_completed
            && self.domain_findings.is_empty()
            && self.risk_score.is_none()
            && self.confidence_score.is_none()
            && self.orchestrator_loop_increment == 0
            && self.tool_attempt_increment == 0
            && self.errors.is_empty()
            && self.routing_decisions.is_empty()
            && self.skipped_phases.is_empty()
    }

    /// Request a phase transition.
    #[must_use]
    pub const fn with_phase(mut self, phase: Phase) -> Self {
        self.set_phase = Some(phase);
        self
    }

    /// Append a message.
    #[must_use]
    pub fn with_message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    /// Append an error record.
    #[must_use]
    pub fn with_error(mut self, error: ErrorRecord) -> Self {
        self.errors.push(error);
        self
    }

    /// Record a domain completion.
    #[must_use]
    pub fn with_domain_finding(mut self, domain: DomainKind, finding: DomainFinding) -> Self {
        self.domain_findings.push((domain, finding));
        self
    }

    /// Apply this update onto `state`.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Invariant`] on an illegal phase transition or
    /// on any mutation of a completed investigation. These are programmer
    /// errors; nodes are expected to produce only legal updates.
    pub fn apply(self, state: &mut InvestigationState) -> Result<(), RuntimeError> {
        if state.current_phase.is_terminal() && !self.is_empty() {
            return Err(RuntimeError::Invariant(format!(
                "investigation {} is complete; refusing further mutation",
                state.investigation_id
            )));
        }

        if let Some(target) = self.set_phase {
            if !state.current_phase.can_transition(target) {
                return Err(RuntimeError::Invariant(format!(
                    "illegal phase transition {} -> {}",
                    state.current_phase, target
                )));
            }
            state.current_phase = target;
        }

        state.messages.extend(self.messages);

        state.tools_used.extend(self.tools_used);
        for (name, value) in self.tool_results {
            state.tools_used.insert(name.clone());
            state.tool_results.insert(name, value);
        }

        if let Some(data) = self.snowflake_data {
            state.snowflake_data = Some(data);
        }
        if self.snowflake_completed {
            state.snowflake_completed = true;
        }

        for (domain, finding) in self.domain_findings {
            // At most one completion per domain; later findings for the same
            // domain are dropped rather than overwriting the first.
            if !state.domains_completed.contains(&domain) {
                state.domains_completed.push(domain);
                state.domain_findings.insert(domain, finding);
            }
        }

        if let Some(risk) = self.risk_score {
            state.risk_score = Some(risk.clamp(0.0, 1.0));
        }
        if let Some(confidence) = self.confidence_score {
            state.confidence_score = Some(confidence.clamp(0.0, 1.0));
        }

        state.orchestrator_loops += self.orchestrator_loop_increment;
        state.tool_execution_attempts += self.tool_attempt_increment;

        state.errors.extend(self.errors);
        state.routing_decisions.extend(self.routing_decisions);
        for phase in self.skipped_phases {
            if !state.skipped_phases.contains(&phase) {
                state.skipped_phases.push(phase);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::EntityType;
    use serde_json::json;

    fn fresh() -> InvestigationState {
        InvestigationState::new(EntityType::IpAddress, "203.0.113.5", 7)
    }

    #[test]
    fn scalar_fields_are_last_writer_wins() {
        let mut state = fresh();
        let mut update = StateUpdate::empty();
        update.risk_score = Some(0.4);
        update.apply(&mut state).unwrap();

        let mut second = StateUpdate::empty();
        second.risk_score = Some(0.9);
        second.apply(&mut state).unwrap();

        assert_eq!(state.risk_score, Some(0.9));
    }

    #[test]
    fn domain_completion_is_recorded_once() {
        let mut state = fresh();
        let finding = DomainFinding::new(0.5, 0.8, vec!["x".into()], json!({}));
        StateUpdate::empty()
            .with_domain_finding(DomainKind::Network, finding.clone())
            .apply(&mut state)
            .unwrap();
        StateUpdate::empty()
            .with_domain_finding(
                DomainKind::Network,
                DomainFinding::new(0.9, 0.9, vec![], json!({})),
            )
            .apply(&mut state)
            .unwrap();

        assert_eq!(state.domains_completed, vec![DomainKind::Network]);
        assert_eq!(state.domain_findings[&DomainKind::Network], finding);
    }

    #[test]
    fn illegal_transition_is_an_invariant_violation() {
        let mut state = fresh();
        let update = StateUpdate::empty().with_phase(Phase::Complete);
        assert!(matches!(
            update.apply(&mut state),
            Err(RuntimeError::Invariant(_))
        ));
    }

    #[test]
    fn complete_state_rejects_mutation() {
        let mut state = fresh();
        state.current_phase = Phase::Complete;
        let update = StateUpdate::empty().with_message(Message::ai("late"));
        assert!(update.apply(&mut state).is_err());
        assert!(StateUpdate::empty().apply(&mut state).is_ok());
    }

    #[test]
    fn tool_results_merge_and_union_tools_used() {
        let mut state = fresh();
        let mut update = StateUpdate::empty();
        update.tool_results.insert("ip_reputation".into(), json!({"v": 1}));
        update.apply(&mut state).unwrap();

        let mut second = StateUpdate::empty();
        second.tool_results.insert("ip_reputation".into(), json!({"v": 2}));
        second.apply(&mut state).unwrap();

        assert_eq!(state.tools_used.len(), 1);
        assert_eq!(state.tool_results["ip_reputation"], json!({"v": 2}));
    }
}
