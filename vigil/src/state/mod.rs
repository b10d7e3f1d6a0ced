//! The investigation record and its single-writer store.
//!
//! [`InvestigationState`] is owned by the graph runtime and mutated only by
//! merging typed [`StateUpdate`]s returned from nodes. Everything a node
//! observes is a snapshot; everything it changes goes through the merge.

mod journal;
mod store;
mod update;

pub use journal::MessageJournal;
pub use store::StateStore;
pub use update::StateUpdate;

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::domains::DomainKind;
use crate::error::ErrorRecord;
use crate::message::{Message, ToolCall};
use crate::phase::Phase;

/// The kind of entity under investigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    /// An IP address.
    IpAddress,
    /// A platform user id.
    UserId,
    /// An email address.
    Email,
    /// A device identifier.
    DeviceId,
}

impl EntityType {
    /// The warehouse column the entity filter applies to.
    #[must_use]
    pub const fn warehouse_column(&self) -> &'static str {
        match self {
            Self::IpAddress => "IP",
            Self::UserId => "USER_ID",
            Self::Email => "EMAIL",
            Self::DeviceId => "DEVICE_ID",
        }
    }

    /// snake_case name used in prompts and journals.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::IpAddress => "ip_address",
            Self::UserId => "user_id",
            Self::Email => "email",
            Self::DeviceId => "device_id",
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured output of a single domain agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainFinding {
    /// Risk contribution in `[0, 1]`.
    pub risk_score: f64,
    /// Confidence in the finding, in `[0, 1]`.
    pub confidence: f64,
    /// Short human-readable indicators. Capped at 32 entries.
    pub risk_indicators: Vec<String>,
    /// Domain-specific detail payload.
    pub details: Value,
}

impl DomainFinding {
    /// Maximum number of indicators retained per finding.
    pub const MAX_INDICATORS: usize = 32;

    /// Create a finding, clamping scores into `[0, 1]` and capping indicators.
    #[must_use]
    pub fn new(
        risk_score: f64,
        confidence: f64,
        mut risk_indicators: Vec<String>,
        details: Value,
    ) -> Self {
        risk_indicators.truncate(Self::MAX_INDICATORS);
        Self {
            risk_score: risk_score.clamp(0.0, 1.0),
            confidence: confidence.clamp(0.0, 1.0),
            risk_indicators,
            details,
        }
    }
}

/// One router verdict in the audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingDecision {
    /// Precedence rule number that fired (1-based, see the router docs).
    pub rule: u8,
    /// Name of the selected node.
    pub target: String,
    /// Why the rule fired.
    pub reason: String,
    /// Phase at decision time.
    pub phase: Phase,
    /// Orchestrator loop counter at decision time.
    pub orchestrator_loops: u32,
    /// Decision timestamp.
    pub at: DateTime<Utc>,
}

/// The single mutable investigation record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestigationState {
    /// Opaque unique id.
    pub investigation_id: Uuid,
    /// Kind of the subject under investigation.
    pub entity_type: EntityType,
    /// Identifier of the subject under investigation.
    pub entity_id: String,
    /// Lookback window in days, at least 1.
    pub date_range_days: u32,
    /// Current phase of the phase machine.
    pub current_phase: Phase,
    /// Append-only conversation history.
    pub messages: Vec<Message>,
    /// Names of tools invoked at least once.
    pub tools_used: BTreeSet<String>,
    /// Latest parsed result per tool.
    pub tool_results: BTreeMap<String, Value>,
    /// Last parsed warehouse result.
    pub snowflake_data: Option<Value>,
    /// Whether the mandatory warehouse phase has produced data.
    pub snowflake_completed: bool,
    /// Domains whose agent has returned, in completion order.
    pub domains_completed: Vec<DomainKind>,
    /// Findings per completed domain.
    pub domain_findings: BTreeMap<DomainKind, DomainFinding>,
    /// Overall risk, set by summary.
    pub risk_score: Option<f64>,
    /// Overall confidence, set by summary.
    pub confidence_score: Option<f64>,
    /// Monotonic orchestrator invocation counter.
    pub orchestrator_loops: u32,
    /// Monotonic tool execution attempt counter.
    pub tool_execution_attempts: u32,
    /// Investigation start timestamp.
    pub start_time: DateTime<Utc>,
    /// Investigation end timestamp, set at termination.
    pub end_time: Option<DateTime<Utc>>,
    /// Total duration in milliseconds, set at termination.
    pub total_duration_ms: Option<u64>,
    /// Optional user focus instruction, sanitised before use.
    pub custom_user_prompt: Option<String>,
    /// Append-only failure records.
    pub errors: Vec<ErrorRecord>,
    /// Append-only router audit trail.
    pub routing_decisions: Vec<RoutingDecision>,
    /// Phases skipped because a fatal error forced the summary.
    pub skipped_phases: Vec<Phase>,
}

impl InvestigationState {
    /// Create a fresh record in [`Phase::Initialization`].
    #[must_use]
    pub fn new(entity_type: EntityType, entity_id: impl Into<String>, date_range_days: u32) -> Self {
        Self {
            investigation_id: Uuid::new_v4(),
            entity_type,
            entity_id: entity_id.into(),
            date_range_days: date_range_days.max(1),
            current_phase: Phase::Initialization,
            messages: Vec::new(),
            tools_used: BTreeSet::new(),
            tool_results: BTreeMap::new(),
            snowflake_data: None,
            snowflake_completed: false,
            domains_completed: Vec::new(),
            domain_findings: BTreeMap::new(),
            risk_score: None,
            confidence_score: None,
            orchestrator_loops: 0,
            tool_execution_attempts: 0,
            start_time: Utc::now(),
            end_time: None,
            total_duration_ms: None,
            custom_user_prompt: None,
            errors: Vec::new(),
            routing_decisions: Vec::new(),
            skipped_phases: Vec::new(),
        }
    }

    /// Attach a user focus instruction.
    #[must_use]
    pub fn with_custom_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.custom_user_prompt = Some(prompt.into());
        self
    }

    /// The last message, if any.
    #[must_use]
    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Tool calls from the most recent model turn that have not yet been
    /// answered by a tool message.
    ///
    /// An answered call is one whose id appears on a tool message after the
    /// turn that requested it.
    #[must_use]
    pub fn unresolved_tool_calls(&self) -> Vec<&ToolCall> {
        let Some(ai_index) = self
            .messages
            .iter()
            .rposition(|m| matches!(m, Message::Ai { .. }))
        else {
            return Vec::new();
        };
        let calls = self.messages[ai_index].tool_calls();
        if calls.is_empty() {
            return Vec::new();
        }
        let answered: BTreeSet<&str> = self.messages[ai_index + 1..]
            .iter()
            .filter_map(|m| match m {
                Message::Tool { call_id, .. } => Some(call_id.as_str()),
                _ => None,
            })
            .collect();
        calls
            .iter()
            .filter(|c| !answered.contains(c.id.as_str()))
            .collect()
    }

    /// Whether a tool message for the named tool exists in the history.
    #[must_use]
    pub fn has_tool_message(&self, tool_name: &str) -> bool {
        self.messages.iter().any(|m| m.is_tool_result_for(tool_name))
    }

    /// The parsed payload of the most recent tool message for `tool_name`.
    ///
    /// Error and raw payloads are skipped; only structured results count.
    #[must_use]
    pub fn latest_parsed_tool_payload(&self, tool_name: &str) -> Option<&serde_json::Value> {
        self.messages.iter().rev().find_map(|m| match m {
            Message::Tool { name, payload, .. } if name == tool_name => payload.as_parsed(),
            _ => None,
        })
    }

    /// Warehouse rows from the last parsed warehouse result, if present.
    #[must_use]
    pub fn warehouse_rows(&self) -> &[Value] {
        self.snowflake_data
            .as_ref()
            .and_then(|data| data.get("rows"))
            .and_then(Value::as_array)
            .map_or(&[], Vec::as_slice)
    }

    /// Mean of the `MODEL_SCORE` column across warehouse rows.
    ///
    /// Returns `None` when no row carries a score.
    #[must_use]
    pub fn mean_model_score(&self) -> Option<f64> {
        let scores: Vec<f64> = self
            .warehouse_rows()
            .iter()
            .filter_map(|row| row.get("MODEL_SCORE").and_then(Value::as_f64))
            .collect();
        if scores.is_empty() {
            None
        } else {
            Some(scores.iter().sum::<f64>() / scores.len() as f64)
        }
    }

    /// Whether any recorded finding meets the remediation threshold.
    #[must_use]
    pub fn needs_remediation(&self) -> bool {
        self.domain_findings
            .values()
            .any(|f| f.risk_score >= crate::domains::REMEDIATION_THRESHOLD)
    }

    /// Finalise timing fields. Idempotent.
    pub fn finalise_timing(&mut self) {
        if self.end_time.is_none() {
            let end = Utc::now();
            self.end_time = Some(end);
            self.total_duration_ms = Some(
                (end - self.start_time)
                    .num_milliseconds()
                    .max(0)
                    .unsigned_abs(),
            );
        }
    }
}
