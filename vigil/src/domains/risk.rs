//! Risk domain: cross-domain consolidation.
//!
//! Runs last among the analysis domains and folds every prior finding plus
//! the warehouse model scores into one consolidated reading. The summary
//! phase works from this agent's output when the model is unavailable.

use async_trait::async_trait;
use serde_json::json;

use super::{DomainAgent, DomainKind};
use crate::state::{DomainFinding, InvestigationState};

/// Weight of the warehouse model score against the domain consensus.
const MODEL_WEIGHT: f64 = 0.5;

/// Consolidates prior domain findings and model scores.
#[derive(Debug, Clone, Copy, Default)]
pub struct RiskAgent;

#[async_trait]
impl DomainAgent for RiskAgent {
    fn kind(&self) -> DomainKind {
        DomainKind::Risk
    }

    async fn analyse(&self, state: &InvestigationState) -> DomainFinding {
        let prior: Vec<(&DomainKind, &DomainFinding)> = state
            .domain_findings
            .iter()
            .filter(|(kind, _)| **kind != DomainKind::Risk && **kind != DomainKind::Remediation)
            .collect();

        let domain_consensus = if prior.is_empty() {
            0.0
        } else {
            // Confidence-weighted mean over the completed domains.
            let weighted: f64 = prior
                .iter()
                .map(|(_, f)| f.risk_score * f.confidence.max(0.1))
                .sum();
            let weights: f64 = prior.iter().map(|(_, f)| f.confidence.max(0.1)).sum();
            weighted / weights
        };

        let model = state.mean_model_score();
        let risk = model.map_or(domain_consensus, |m| {
            MODEL_WEIGHT * m + (1.0 - MODEL_WEIGHT) * domain_consensus
        });

        let mut indicators: Vec<String> = prior
            .iter()
            .filter(|(_, f)| f.risk_score >= super::REMEDIATION_THRESHOLD)
            .map(|(kind, f)| format!("{kind} domain at {:.2}", f.risk_score))
            .collect();
        if let Some(m) = model {
            indicators.push(format!("mean warehouse model score {m:.3}"));
        }

        // Confidence grows with the number of domains actually consulted.
        let confidence = (0.3 + 0.08 * prior.len() as f64).min(0.95);

        DomainFinding::new(
            risk,
            confidence,
            indicators,
            json!({
                "domain_consensus": domain_consensus,
                "mean_model_score": model,
                "domains_consulted": prior.len(),
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::EntityType;
    use serde_json::json;

    #[tokio::test]
    async fn consolidation_blends_model_and_domains() {
        let mut state = InvestigationState::new(EntityType::IpAddress, "203.0.113.5", 7);
        state.snowflake_data = Some(json!({
            "rows": [{"MODEL_SCORE": 0.8}],
            "row_count": 1,
        }));
        state.domains_completed.push(DomainKind::Network);
        state.domain_findings.insert(
            DomainKind::Network,
            DomainFinding::new(0.4, 0.8, vec![], json!({})),
        );

        let finding = RiskAgent.analyse(&state).await;
        // 0.5 * 0.8 + 0.5 * 0.4
        assert!((finding.risk_score - 0.6).abs() < 1e-9);
    }

    #[tokio::test]
    async fn no_evidence_scores_zero() {
        let state = InvestigationState::new(EntityType::IpAddress, "203.0.113.5", 7);
        let finding = RiskAgent.analyse(&state).await;
        assert!(finding.risk_score.abs() < f64::EPSILON);
    }
}
