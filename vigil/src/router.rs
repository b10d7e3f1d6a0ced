//! The router: a pure function from state to the next node.
//!
//! There is no cycle in the graph; the orchestrator is simply re-selected
//! until a ceiling or a phase trigger moves the investigation forward. The
//! router is the single source of truth for legal transitions, and every
//! verdict is recorded in the audit trail by the caller.

use serde::{Deserialize, Serialize};

use crate::domains::{self, DomainKind};
use crate::phase::{Phase, PhaseLimits};
use crate::state::InvestigationState;

/// The node the runtime should execute next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextNode {
    /// Invoke the orchestrator agent.
    Orchestrator,
    /// Execute the pending tool calls of the last model turn.
    Tools,
    /// Invoke one domain agent.
    Domain(DomainKind),
    /// Run the final risk synthesis.
    Summary,
    /// Terminal; stop the loop.
    End,
}

impl NextNode {
    /// Display name used in the routing audit trail.
    #[must_use]
    pub fn name(&self) -> String {
        match self {
            Self::Orchestrator => "orchestrator".to_owned(),
            Self::Tools => "tools".to_owned(),
            Self::Domain(kind) => format!("{kind}_agent"),
            Self::Summary => "summary".to_owned(),
            Self::End => "end".to_owned(),
        }
    }
}

/// A routing verdict: the node, the precedence rule that fired, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    /// The selected node.
    pub node: NextNode,
    /// 1-based precedence rule number.
    pub rule: u8,
    /// Human-readable justification.
    pub reason: String,
}

impl Verdict {
    fn new(node: NextNode, rule: u8, reason: impl Into<String>) -> Self {
        Self {
            node,
            rule,
            reason: reason.into(),
        }
    }
}

/// Whether the current phase has a satisfied forced-progression trigger.
///
/// Triggers per phase:
/// - `snowflake_analysis`: a warehouse tool message was observed, or the
///   phase loop ceiling was reached;
/// - `tool_execution`: enough attempts, enough distinct tools, or the phase
///   loop ceiling;
/// - `domain_analysis`: every required domain completed, or the domain loop
///   ceiling.
#[must_use]
pub fn forced_progression(state: &InvestigationState, limits: &PhaseLimits) -> Option<String> {
    let loops = state.orchestrator_loops;
    match state.current_phase {
        Phase::SnowflakeAnalysis => {
            if state.snowflake_completed
                || state
                    .latest_parsed_tool_payload(crate::warehouse::WAREHOUSE_TOOL_NAME)
                    .is_some()
            {
                Some("warehouse result observed".to_owned())
            } else if loops >= limits.snowflake_loops {
                Some(format!(
                    "snowflake loop ceiling reached ({loops}/{})",
                    limits.snowflake_loops
                ))
            } else {
                None
            }
        }
        Phase::ToolExecution => {
            let mut reasons = Vec::new();
            if state.tool_execution_attempts >= limits.tool_execution_attempts {
                reasons.push(format!("attempts {} reached", state.tool_execution_attempts));
            }
            if state.tools_used.len() as u32 >= limits.tool_count {
                reasons.push(format!("tool count {} reached", state.tools_used.len()));
            }
            if loops >= limits.tool_execution_loops {
                reasons.push(format!(
                    "tool execution loop ceiling reached ({loops}/{})",
                    limits.tool_execution_loops
                ));
            }
            if reasons.is_empty() {
                None
            } else {
                Some(reasons.join(", "))
            }
        }
        Phase::DomainAnalysis => {
            if domains::next_incomplete_domain(state).is_none() {
                Some("all required domains completed".to_owned())
            } else if loops >= limits.domain_loops {
                Some(format!(
                    "domain loop ceiling reached ({loops}/{})",
                    limits.domain_loops
                ))
            } else {
                None
            }
        }
        Phase::Initialization | Phase::Summary | Phase::Complete => None,
    }
}

/// Select the next node for `state`.
///
/// Deterministic and side-effect free: two calls on the same state yield the
/// same verdict. Precedence, highest first:
///
/// 1. global orchestrator ceiling exhausted → summary;
/// 2. unresolved tool calls on the last model turn → tools;
/// 3. phase forced-progression trigger satisfied → orchestrator (which will
///    emit the transition on its next turn);
/// 4. incomplete required domain during domain analysis → that domain's
///    agent, in fixed order;
/// 5. summary phase → summary;
/// 6. complete phase → terminal;
/// 7. otherwise → orchestrator.
#[must_use]
pub fn route(state: &InvestigationState, limits: &PhaseLimits) -> Verdict {
    // Rule 1: recursion safety overrides everything.
    if state.orchestrator_loops >= limits.orchestrator_calls
        && state.current_phase != Phase::Complete
    {
        return Verdict::new(
            NextNode::Summary,
            1,
            format!(
                "orchestrator ceiling reached ({}/{})",
                state.orchestrator_loops, limits.orchestrator_calls
            ),
        );
    }

    // Rule 2: pending tool calls must be answered before any other turn.
    let pending = state.unresolved_tool_calls();
    if !pending.is_empty()
        && matches!(state.last_message(), Some(m) if m.has_tool_calls())
    {
        return Verdict::new(
            NextNode::Tools,
            2,
            format!("{} unresolved tool call(s)", pending.len()),
        );
    }

    // Rule 3: phase triggers force the orchestrator to advance.
    if let Some(reason) = forced_progression(state, limits) {
        // Domain analysis is router-driven: when every domain is done the
        // next stop is the summary itself, not another orchestrator turn.
        if state.current_phase == Phase::DomainAnalysis {
            return Verdict::new(NextNode::Summary, 3, reason);
        }
        return Verdict::new(NextNode::Orchestrator, 3, format!("force progression: {reason}"));
    }

    // Rule 4: sequential domain dispatch.
    if state.current_phase == Phase::DomainAnalysis {
        if let Some(domain) = domains::next_incomplete_domain(state) {
            return Verdict::new(
                NextNode::Domain(domain),
                4,
                format!("next incomplete domain: {domain}"),
            );
        }
    }

    // Rules 5-6: tail phases.
    match state.current_phase {
        Phase::Summary => Verdict::new(NextNode::Summary, 5, "summary phase"),
        Phase::Complete => Verdict::new(NextNode::End, 6, "investigation complete"),
        // Rule 7: default back to the orchestrator.
        _ => Verdict::new(NextNode::Orchestrator, 7, "phase driver"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Message, ToolCall, ToolPayload};
    use crate::phase::Mode;
    use crate::state::{DomainFinding, EntityType};
    use serde_json::json;

    fn state() -> InvestigationState {
        InvestigationState::new(EntityType::IpAddress, "203.0.113.5", 7)
    }

    fn limits() -> PhaseLimits {
        PhaseLimits::for_mode(Mode::Test)
    }

    #[test]
    fn ceiling_forces_summary_before_anything_else() {
        let mut s = state();
        s.current_phase = Phase::ToolExecution;
        s.orchestrator_loops = limits().orchestrator_calls;
        s.messages.push(Message::ai_with_tool_calls(
            "",
            vec![ToolCall::new("c1", "x", json!({}))],
        ));
        let verdict = route(&s, &limits());
        assert_eq!(verdict.node, NextNode::Summary);
        assert_eq!(verdict.rule, 1);
    }

    #[test]
    fn unresolved_calls_route_to_tools() {
        let mut s = state();
        s.current_phase = Phase::SnowflakeAnalysis;
        s.messages.push(Message::ai_with_tool_calls(
            "",
            vec![ToolCall::new("c1", "warehouse_query", json!({}))],
        ));
        let verdict = route(&s, &limits());
        assert_eq!(verdict.node, NextNode::Tools);
        assert_eq!(verdict.rule, 2);
    }

    #[test]
    fn warehouse_result_triggers_forced_progression() {
        let mut s = state();
        s.current_phase = Phase::SnowflakeAnalysis;
        s.messages.push(Message::ai_with_tool_calls(
            "",
            vec![ToolCall::new("c1", crate::warehouse::WAREHOUSE_TOOL_NAME, json!({}))],
        ));
        s.messages.push(Message::tool(
            "c1",
            crate::warehouse::WAREHOUSE_TOOL_NAME,
            ToolPayload::parsed(json!({"rows": []})),
        ));
        let verdict = route(&s, &limits());
        assert_eq!(verdict.node, NextNode::Orchestrator);
        assert_eq!(verdict.rule, 3);
    }

    #[test]
    fn domain_analysis_dispatches_in_order() {
        let mut s = state();
        s.current_phase = Phase::DomainAnalysis;
        let verdict = route(&s, &limits());
        assert_eq!(verdict.node, NextNode::Domain(DomainKind::Network));

        s.domains_completed.push(DomainKind::Network);
        s.domain_findings.insert(
            DomainKind::Network,
            DomainFinding::new(0.1, 0.5, vec![], json!({})),
        );
        let verdict = route(&s, &limits());
        assert_eq!(verdict.node, NextNode::Domain(DomainKind::Device));
        assert_eq!(verdict.rule, 4);
    }

    #[test]
    fn completed_domains_exit_to_summary() {
        let mut s = state();
        s.current_phase = Phase::DomainAnalysis;
        for domain in DomainKind::ANALYSIS_ORDER {
            s.domains_completed.push(domain);
            s.domain_findings
                .insert(domain, DomainFinding::new(0.1, 0.5, vec![], json!({})));
        }
        let verdict = route(&s, &limits());
        assert_eq!(verdict.node, NextNode::Summary);
        assert_eq!(verdict.rule, 3);
    }

    #[test]
    fn domain_ceiling_forces_summary() {
        let mut s = state();
        s.current_phase = Phase::DomainAnalysis;
        s.orchestrator_loops = limits().domain_loops;
        let verdict = route(&s, &limits());
        assert_eq!(verdict.node, NextNode::Summary);
    }

    #[test]
    fn router_is_deterministic() {
        let mut s = state();
        s.current_phase = Phase::ToolExecution;
        s.tool_execution_attempts = 1;
        let first = route(&s, &limits());
        let second = route(&s, &limits());
        assert_eq!(first, second);
    }

    #[test]
    fn terminal_phase_routes_to_end() {
        let mut s = state();
        s.current_phase = Phase::Complete;
        assert_eq!(route(&s, &limits()).node, NextNode::End);
    }

    #[test]
    fn default_phase_driver_is_the_orchestrator() {
        let s = state();
        let verdict = route(&s, &limits());
        assert_eq!(verdict.node, NextNode::Orchestrator);
        assert_eq!(verdict.rule, 7);
    }
}
