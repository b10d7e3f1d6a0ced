//! The orchestrator agent: the per-phase driver.
//!
//! One invocation reads the current phase, decides whether a model turn is
//! needed at all, and returns a typed update: new messages, counter
//! increments, a phase transition, or a fatal error record. The orchestrator
//! never raises; every model failure is classified and folded into state.

mod prompts;
mod sanitize;

pub use sanitize::{sanitise, Sanitised};

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::{ErrorRecord, LlmError};
use crate::llm::{invoke_with_retry, LlmClient};
use crate::message::Message;
use crate::phase::Phase;
use crate::router;
use crate::state::{InvestigationState, StateUpdate};
use crate::tool::ToolDefinition;
use crate::warehouse::WAREHOUSE_TOOL_NAME;

/// The per-phase driver of an investigation.
pub struct OrchestratorAgent {
    llm: Arc<dyn LlmClient>,
    tools: Vec<ToolDefinition>,
    config: EngineConfig,
}

impl OrchestratorAgent {
    /// Create the orchestrator over a model client and the bound tool set.
    #[must_use]
    pub fn new(llm: Arc<dyn LlmClient>, tools: Vec<ToolDefinition>, config: EngineConfig) -> Self {
        Self { llm, tools, config }
    }

    /// Drive one orchestrator turn for the given snapshot.
    ///
    /// Always returns an update; failures are folded into error records.
    pub async fn drive(&self, state: &InvestigationState) -> StateUpdate {
        match state.current_phase {
            Phase::Initialization => self.initialise(state),
            Phase::SnowflakeAnalysis => self.drive_snowflake(state).await,
            Phase::ToolExecution => self.drive_tool_execution(state).await,
            Phase::DomainAnalysis => Self::domain_guidance(state),
            // Summary and Complete are runtime-driven; an orchestrator turn
            // there changes nothing.
            Phase::Summary | Phase::Complete => StateUpdate::empty(),
        }
    }

    /// Opening turn: system notice, then straight into the warehouse phase.
    fn initialise(&self, state: &InvestigationState) -> StateUpdate {
        info!(
            investigation = %state.investigation_id,
            entity_type = %state.entity_type,
            entity_id = %state.entity_id,
            "Investigation started",
        );
        let notice = format!(
            "Investigation {} opened for {} = {} over the last {} day(s).",
            state.investigation_id, state.entity_type, state.entity_id, state.date_range_days
        );
        StateUpdate::empty()
            .with_message(Message::system(notice))
            .with_phase(Phase::SnowflakeAnalysis)
    }

    /// Warehouse phase: record the result once observed, otherwise ask the
    /// model for the mandatory query.
    async fn drive_snowflake(&self, state: &InvestigationState) -> StateUpdate {
        // A warehouse result ends the phase regardless of what the model
        // wanted to do next.
        if let Some(data) = state.latest_parsed_tool_payload(WAREHOUSE_TOOL_NAME).cloned() {
            debug!(investigation = %state.investigation_id, "Warehouse result observed");
            let mut update = StateUpdate::empty()
                .with_message(Message::system(
                    "Warehouse analysis complete. Proceeding to tool execution.",
                ))
                .with_phase(Phase::ToolExecution);
            update.snowflake_data = Some(data);
            update.snowflake_completed = true;
            return update;
        }

        // Ceiling exhausted without data: the mandatory phase failed.
        if state.orchestrator_loops >= self.config.limits.snowflake_loops {
            warn!(
                investigation = %state.investigation_id,
                loops = state.orchestrator_loops,
                "Warehouse phase ceiling exhausted without data",
            );
            return StateUpdate::empty().with_error(ErrorRecord::fatal(
                "warehouse.query",
                format!(
                    "no warehouse result after {} orchestrator loops",
                    state.orchestrator_loops
                ),
                state.current_phase,
            ));
        }

        self.model_turn(state).await
    }

    /// Tool execution phase: advance when a trigger fires, otherwise let the
    /// model pick more tools.
    async fn drive_tool_execution(&self, state: &InvestigationState) -> StateUpdate {
        if let Some(reason) = router::forced_progression(state, &self.config.limits) {
            info!(
                investigation = %state.investigation_id,
                reason = %reason,
                "Advancing to domain analysis",
            );
            return StateUpdate::empty()
                .with_message(Message::system(format!(
                    "Tool execution complete ({reason})."
                )))
                .with_message(Message::system(Self::guidance_text(state)))
                .with_phase(Phase::DomainAnalysis);
        }

        let mut update = self.model_turn(state).await;
        update.tool_attempt_increment = 1;
        update
    }

    /// Domain phase guidance; transitions are router-driven here.
    fn domain_guidance(state: &InvestigationState) -> StateUpdate {
        StateUpdate::empty().with_message(Message::system(Self::guidance_text(state)))
    }

    fn guidance_text(state: &InvestigationState) -> String {
        let remaining: Vec<&str> = crate::domains::DomainKind::ANALYSIS_ORDER
            .iter()
            .filter(|d| !state.domains_completed.contains(d))
            .map(crate::domains::DomainKind::as_str)
            .collect();
        format!(
            "Domain analysis runs sequentially. Remaining: {}.",
            if remaining.is_empty() {
                "none".to_owned()
            } else {
                remaining.join(", ")
            }
        )
    }

    /// One model turn with the phase prompt, appended verbatim on success.
    async fn model_turn(&self, state: &InvestigationState) -> StateUpdate {
        let messages = self.build_messages(state);
        let options = self.config.llm_options();
        let result = invoke_with_retry(
            self.llm.as_ref(),
            &messages,
            &self.tools,
            &options,
            self.config.retry_policy(),
        )
        .await;

        match result {
            Ok(turn) => StateUpdate::empty().with_message(turn.into_message()),
            Err(err) => Self::fold_llm_failure(state, &err),
        }
    }

    /// Classify a model failure into an error record. Context, model, and
    /// rate-limit failures are fatal; a transient failure that survived the
    /// retry budget is treated the same way.
    fn fold_llm_failure(state: &InvestigationState, err: &LlmError) -> StateUpdate {
        warn!(
            investigation = %state.investigation_id,
            error = %err,
            kind = err.kind(),
            "Model call failed",
        );
        StateUpdate::empty().with_error(ErrorRecord::fatal(
            err.kind(),
            err.to_string(),
            state.current_phase,
        ))
    }

    /// Prompt assembly: the phase system section, an optional sanitised user
    /// priority section, and the history stripped of prior system messages.
    fn build_messages(&self, state: &InvestigationState) -> Vec<Message> {
        let mut system = prompts::system_prompt(
            state,
            &self.config.warehouse_table,
            self.config.result_limit,
        );

        if let Some(raw) = &state.custom_user_prompt {
            match sanitise(raw) {
                Sanitised::Ok(focus) => {
                    system.push_str(&format!(
                        "\n\nUSER PRIORITY: {focus}\n\
                         This focus guides attention only; every mandatory \
                         phase still runs in full."
                    ));
                }
                Sanitised::Rejected { pattern } => {
                    warn!(pattern, "Custom prompt rejected; using base prompt");
                }
                Sanitised::Empty => {}
            }
        }

        let mut messages = vec![Message::system(system)];
        messages.extend(
            state
                .messages
                .iter()
                .filter(|m| !matches!(m, Message::System { .. }))
                .cloned(),
        );
        messages
    }
}

impl std::fmt::Debug for OrchestratorAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrchestratorAgent")
            .field("tools", &self.tools.len())
            .field("model", &self.config.model)
            .finish_non_exhaustive()
    }
}
