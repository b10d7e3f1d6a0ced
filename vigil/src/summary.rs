//! Final risk synthesis.
//!
//! The summary prefers a model-produced risk score; when the model fails or
//! returns something unusable, the fallback is the mean warehouse model
//! score. The confidence score is always the fixed data-completeness
//! formula, and an investigation terminated by a fatal error gets the
//! deliberate "medium risk, zero confidence" verdict.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::llm::{invoke_with_retry, LlmClient};
use crate::message::Message;
use crate::state::InvestigationState;

/// Risk level bands over the final score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    /// Score at or above 0.8.
    Critical,
    /// Score at or above 0.6.
    High,
    /// Score at or above 0.4.
    Medium,
    /// Score at or above 0.2.
    Low,
    /// Everything below 0.2.
    Minimal,
}

impl RiskLevel {
    /// Map a score in `[0, 1]` to its band.
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            Self::Critical
        } else if score >= 0.6 {
            Self::High
        } else if score >= 0.4 {
            Self::Medium
        } else if score >= 0.2 {
            Self::Low
        } else {
            Self::Minimal
        }
    }

    /// Lowercase band name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Minimal => "minimal",
        }
    }

    /// The standing recommendation for this band.
    #[must_use]
    pub const fn recommendation(&self) -> &'static str {
        match self {
            Self::Critical => "Block the entity and escalate to manual review immediately",
            Self::High => "Require step-up verification before any further activity",
            Self::Medium => "Apply enhanced monitoring and tightened transaction limits",
            Self::Low => "Continue to monitor account activity",
            Self::Minimal => "No immediate action required; monitor routinely",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The synthesised verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryOutcome {
    /// Final risk score in `[0, 1]`.
    pub risk_score: f64,
    /// Final confidence in `[0, 1]`.
    pub confidence_score: f64,
    /// Band over the risk score.
    pub risk_level: RiskLevel,
    /// Narrative explanation.
    pub reasoning: String,
    /// Action recommendations, most important first.
    pub recommendations: Vec<String>,
    /// Whether the risk score came from the model (as opposed to fallback).
    pub llm_backed: bool,
}

impl SummaryOutcome {
    fn from_score(
        risk_score: f64,
        confidence_score: f64,
        reasoning: String,
        mut recommendations: Vec<String>,
        llm_backed: bool,
    ) -> Self {
        let risk_score = risk_score.clamp(0.0, 1.0);
        let risk_level = RiskLevel::from_score(risk_score);
        if recommendations.is_empty() {
            recommendations.push(risk_level.recommendation().to_owned());
        }
        Self {
            risk_score,
            confidence_score: confidence_score.clamp(0.0, 1.0),
            risk_level,
            reasoning,
            recommendations,
            llm_backed,
        }
    }
}

/// The fixed data-completeness confidence formula.
#[must_use]
pub fn confidence_score(state: &InvestigationState) -> f64 {
    let snowflake = if state.snowflake_completed { 1.0 } else { 0.0 };
    (0.2 * snowflake
        + 0.1 * state.tools_used.len() as f64
        + 0.2 * state.domains_completed.len() as f64)
        .min(1.0)
}

/// Synthesise the final verdict for an investigation.
///
/// A fatal error short-circuits to the safety verdict. Otherwise the model
/// is asked once (with the standard retry policy) for a JSON assessment; an
/// unusable answer falls back to the mean warehouse model score.
pub async fn synthesise(
    state: &InvestigationState,
    llm: &dyn LlmClient,
    config: &EngineConfig,
) -> SummaryOutcome {
    if state.errors.iter().any(|e| e.fatal) {
        let first = state
            .errors
            .iter()
            .find(|e| e.fatal)
            .map(|e| format!("{} in {}: {}", e.kind, e.phase, e.message))
            .unwrap_or_default();
        return SummaryOutcome::from_score(
            0.5,
            0.0,
            format!("Investigation terminated early: {first}"),
            Vec::new(),
            false,
        );
    }

    let confidence = confidence_score(state);

    match request_assessment(state, llm, config).await {
        Some(assessment) => {
            info!(
                investigation = %state.investigation_id,
                risk = assessment.risk_score,
                "Model-backed risk assessment",
            );
            SummaryOutcome::from_score(
                assessment.risk_score,
                confidence,
                assessment.reasoning,
                assessment.recommendations,
                true,
            )
        }
        None => {
            let risk = state.mean_model_score().unwrap_or(0.0);
            warn!(
                investigation = %state.investigation_id,
                risk,
                "Falling back to warehouse model score",
            );
            SummaryOutcome::from_score(
                risk,
                confidence,
                format!(
                    "Fallback assessment: mean warehouse model score across {} row(s)",
                    state.warehouse_rows().len()
                ),
                Vec::new(),
                false,
            )
        }
    }
}

/// What the model is asked to return for the final assessment.
#[derive(Debug, Deserialize)]
struct Assessment {
    risk_score: f64,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    recommendations: Vec<String>,
}

/// One model attempt at the final assessment; `None` on any failure.
async fn request_assessment(
    state: &InvestigationState,
    llm: &dyn LlmClient,
    config: &EngineConfig,
) -> Option<Assessment> {
    let messages = vec![
        Message::system(summary_prompt(state)),
        Message::human(evidence_digest(state)),
    ];
    let turn = invoke_with_retry(
        llm,
        &messages,
        &[],
        &config.llm_options(),
        config.retry_policy(),
    )
    .await
    .ok()?;
    parse_assessment(&turn.content)
}

fn summary_prompt(state: &InvestigationState) -> String {
    format!(
        "You are writing the final risk assessment of fraud investigation {}. \
         Respond with a single JSON object: {{\"risk_score\": <0.0-1.0>, \
         \"reasoning\": \"...\", \"recommendations\": [\"...\"]}}. The score \
         must be driven by the evidence provided.",
        state.investigation_id
    )
}

/// Compact digest of the collected evidence for the assessment turn.
fn evidence_digest(state: &InvestigationState) -> String {
    let mut lines = vec![format!(
        "Entity: {} = {} ({} day window)",
        state.entity_type, state.entity_id, state.date_range_days
    )];

    let rows = state.warehouse_rows();
    lines.push(format!("Warehouse rows: {}", rows.len()));
    if let Some(mean) = state.mean_model_score() {
        lines.push(format!("Mean model score: {mean:.3}"));
        let high_risk = rows
            .iter()
            .filter(|r| {
                r.get("MODEL_SCORE")
                    .and_then(Value::as_f64)
                    .is_some_and(|s| s > 0.7)
            })
            .count();
        lines.push(format!("High-score transactions (>0.7): {high_risk}"));
    }

    lines.push(format!(
        "Tools used: {}",
        state
            .tools_used
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    ));

    for (domain, finding) in &state.domain_findings {
        lines.push(format!(
            "Domain {domain}: risk {:.2}, confidence {:.2}, indicators: {}",
            finding.risk_score,
            finding.confidence,
            finding.risk_indicators.join("; ")
        ));
    }

    lines.join("\n")
}

/// Parse the assessment out of a model answer, tolerating prose around the
/// JSON object.
fn parse_assessment(content: &str) -> Option<Assessment> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    if end <= start {
        return None;
    }
    let assessment: Assessment = serde_json::from_str(&content[start..=end]).ok()?;
    if !assessment.risk_score.is_finite() {
        return None;
    }
    Some(assessment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorRecord;
    use crate::llm::{AiTurn, FailingLlm, ScriptedLlm};
    use crate::phase::Phase;
    use crate::state::EntityType;
    use serde_json::json;

    fn state_with_rows(scores: &[f64]) -> InvestigationState {
        let mut state = InvestigationState::new(EntityType::IpAddress, "203.0.113.5", 7);
        let rows: Vec<Value> = scores.iter().map(|s| json!({"MODEL_SCORE": s})).collect();
        state.snowflake_data = Some(json!({"rows": rows, "row_count": scores.len()}));
        state.snowflake_completed = true;
        state
    }

    #[test]
    fn risk_levels_map_the_documented_bands() {
        assert_eq!(RiskLevel::from_score(0.85), RiskLevel::Critical);
        assert_eq!(RiskLevel::from_score(0.8), RiskLevel::Critical);
        assert_eq!(RiskLevel::from_score(0.6), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(0.45), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(0.2), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(0.1), RiskLevel::Minimal);
    }

    #[test]
    fn confidence_follows_the_completeness_formula() {
        let mut state = state_with_rows(&[0.4]);
        state.tools_used.insert("ip_reputation".to_owned());
        state.tools_used.insert("device_intel".to_owned());
        state.domains_completed.push(crate::domains::DomainKind::Network);
        // 0.2 + 2*0.1 + 1*0.2 = 0.6
        assert!((confidence_score(&state) - 0.6).abs() < 1e-9);
    }

    #[test]
    fn confidence_is_capped_at_one() {
        let mut state = state_with_rows(&[0.4]);
        for domain in crate::domains::DomainKind::ANALYSIS_ORDER {
            state.domains_completed.push(domain);
        }
        assert!((confidence_score(&state) - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn fatal_errors_produce_the_safety_verdict() {
        let mut state = state_with_rows(&[0.9]);
        state.errors.push(ErrorRecord::fatal(
            "llm.context_length",
            "too large",
            Phase::ToolExecution,
        ));
        let llm = FailingLlm::context_length("still too large");
        let outcome = synthesise(&state, &llm, &EngineConfig::test()).await;
        assert!((outcome.risk_score - 0.5).abs() < f64::EPSILON);
        assert!(outcome.confidence_score.abs() < f64::EPSILON);
        assert!(!outcome.llm_backed);
        // The safety verdict never consults the model.
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn model_backed_score_is_used_when_parseable() {
        let state = state_with_rows(&[0.2, 0.4]);
        let llm = ScriptedLlm::new(vec![AiTurn::text(
            "Here is my verdict: {\"risk_score\": 0.72, \"reasoning\": \"spike\", \
             \"recommendations\": [\"verify\"]}",
        )]);
        let outcome = synthesise(&state, &llm, &EngineConfig::test()).await;
        assert!((outcome.risk_score - 0.72).abs() < f64::EPSILON);
        assert_eq!(outcome.risk_level, RiskLevel::High);
        assert_eq!(outcome.recommendations, vec!["verify".to_owned()]);
        assert!(outcome.llm_backed);
    }

    #[tokio::test]
    async fn unusable_model_answer_falls_back_to_mean_score() {
        let state = state_with_rows(&[0.3, 0.5]);
        let llm = ScriptedLlm::new(vec![AiTurn::text("I cannot produce JSON today.")]);
        let outcome = synthesise(&state, &llm, &EngineConfig::test()).await;
        assert!((outcome.risk_score - 0.4).abs() < 1e-9);
        assert!(!outcome.llm_backed);
        assert_eq!(outcome.risk_level, RiskLevel::Medium);
    }

    #[tokio::test]
    async fn empty_warehouse_fallback_scores_zero_and_monitors() {
        let mut state = state_with_rows(&[]);
        state.snowflake_data = Some(json!({"rows": [], "row_count": 0}));
        let llm = ScriptedLlm::new(vec![AiTurn::text("no json")]);
        let outcome = synthesise(&state, &llm, &EngineConfig::test()).await;
        assert!(outcome.risk_score.abs() < f64::EPSILON);
        assert_eq!(outcome.risk_level, RiskLevel::Minimal);
        assert!(outcome.recommendations[0].to_lowercase().contains("monitor"));
    }

    #[test]
    fn scores_out_of_range_are_clamped() {
        let outcome =
            SummaryOutcome::from_score(1.4, -0.1, String::new(), Vec::new(), true);
        assert!((outcome.risk_score - 1.0).abs() < f64::EPSILON);
        assert!(outcome.confidence_score.abs() < f64::EPSILON);
    }
}
