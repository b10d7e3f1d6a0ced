//! Phase prompt templates.
//!
//! Each investigation phase binds the model to a narrow contract: what it is
//! analysing, which tools it may call, and which actions are forbidden. The
//! templates are deliberately rigid; progression is enforced by the router,
//! not by model goodwill.

use crate::phase::Phase;
use crate::state::InvestigationState;
use crate::warehouse::{MANDATORY_COLUMNS, TableRef, TransactionQuery};

/// The system section for the current phase.
#[must_use]
pub fn system_prompt(state: &InvestigationState, table: &TableRef, result_limit: usize) -> String {
    match state.current_phase {
        Phase::Initialization => initialization(state),
        Phase::SnowflakeAnalysis => snowflake_analysis(state, table, result_limit),
        Phase::ToolExecution => tool_execution(state),
        Phase::DomainAnalysis => domain_guidance(state),
        Phase::Summary | Phase::Complete => summary(state),
    }
}

fn entity_line(state: &InvestigationState) -> String {
    format!(
        "Entity to investigate: {} = {} (lookback: {} days)",
        state.entity_type, state.entity_id, state.date_range_days
    )
}

fn initialization(state: &InvestigationState) -> String {
    format!(
        "You are a fraud investigation orchestrator.\n\
         {}\n\
         The investigation proceeds through fixed phases: warehouse analysis, \
         tool execution, domain analysis, and a final risk summary. \
         You may not skip a phase or conclude early.",
        entity_line(state)
    )
}

fn snowflake_analysis(state: &InvestigationState, table: &TableRef, result_limit: usize) -> String {
    let (reference_query, _) = TransactionQuery::new(
        table.clone(),
        state.entity_type,
        state.entity_id.clone(),
        state.date_range_days,
        result_limit,
    )
    .render();

    format!(
        "You are in the warehouse analysis phase of a fraud investigation.\n\
         {entity}\n\
         Your only task is to call the warehouse_query tool exactly once to \
         retrieve the entity's transactions. The query MUST select all of \
         these columns: {columns}. Use this template, substituting the bound \
         entity value:\n\n{query}\n\n\
         Forbidden: any other tool, any conclusion about risk, any request \
         to skip this phase.",
        entity = entity_line(state),
        columns = MANDATORY_COLUMNS.join(", "),
        query = reference_query,
    )
}

fn tool_execution(state: &InvestigationState) -> String {
    let used = if state.tools_used.is_empty() {
        "none yet".to_owned()
    } else {
        state
            .tools_used
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    };
    format!(
        "You are in the tool execution phase of a fraud investigation.\n\
         {entity}\n\
         Warehouse data has been retrieved. Select the additional tools whose \
         evidence the domain analyses will need: network reputation, device \
         intelligence, geolocation, behavioural logs, and anomaly scoring. \
         Request them as tool calls; several calls per turn are fine.\n\
         Tools already used: {used}.\n\
         Forbidden: re-querying the warehouse, concluding risk, skipping \
         ahead to the summary.",
        entity = entity_line(state),
    )
}

fn domain_guidance(state: &InvestigationState) -> String {
    let remaining: Vec<&str> = crate::domains::DomainKind::ANALYSIS_ORDER
        .iter()
        .filter(|d| !state.domains_completed.contains(d))
        .map(crate::domains::DomainKind::as_str)
        .collect();
    format!(
        "Domain analysis phase. Remaining domains, to be executed strictly \
         in this order, one at a time: {}. Domain agents work from the \
         evidence already collected; no further tool calls are permitted.",
        if remaining.is_empty() {
            "none".to_owned()
        } else {
            remaining.join(", ")
        }
    )
}

fn summary(state: &InvestigationState) -> String {
    format!(
        "You are writing the final risk assessment of a fraud investigation.\n\
         {entity}\n\
         Respond with a single JSON object: {{\"risk_score\": <0.0-1.0>, \
         \"confidence\": <0.0-1.0>, \"reasoning\": \"...\", \
         \"recommendations\": [\"...\"]}}.\n\
         The risk score MUST be driven by the evidence: the warehouse model \
         scores, the domain findings, and the tool results. Do not invent \
         evidence.",
        entity = entity_line(state),
    )
}
