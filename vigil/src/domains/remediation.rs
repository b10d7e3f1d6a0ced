//! Remediation domain: mitigation planning for elevated risk.
//!
//! Runs only when the risk consolidation labels any domain at or above the
//! remediation threshold. The finding carries the recommended actions in its
//! details.

use async_trait::async_trait;
use serde_json::json;

use super::{DomainAgent, DomainKind, REMEDIATION_THRESHOLD};
use crate::state::{DomainFinding, InvestigationState};

/// Plans mitigation actions from the elevated findings.
#[derive(Debug, Clone, Copy, Default)]
pub struct RemediationAgent;

#[async_trait]
impl DomainAgent for RemediationAgent {
    fn kind(&self) -> DomainKind {
        DomainKind::Remediation
    }

    async fn analyse(&self, state: &InvestigationState) -> DomainFinding {
        let elevated: Vec<(&DomainKind, &DomainFinding)> = state
            .domain_findings
            .iter()
            .filter(|(kind, f)| {
                **kind != DomainKind::Remediation && f.risk_score >= REMEDIATION_THRESHOLD
            })
            .collect();

        let mut actions = Vec::new();
        for (kind, finding) in &elevated {
            let action = match kind {
                DomainKind::Network | DomainKind::Location => {
                    "Add the observed network origins to step-up screening"
                }
                DomainKind::Device | DomainKind::Web => {
                    "Challenge new devices with strong verification"
                }
                DomainKind::Authentication => "Force credential rotation and re-verification",
                DomainKind::Logs | DomainKind::Merchant => {
                    "Apply velocity and amount limits pending review"
                }
                DomainKind::Risk => "Queue the entity for manual fraud review",
                DomainKind::Remediation => continue,
            };
            actions.push(format!("{action} ({kind} at {:.2})", finding.risk_score));
        }

        let peak = elevated
            .iter()
            .map(|(_, f)| f.risk_score)
            .fold(0.0_f64, f64::max);

        let indicators: Vec<String> = elevated
            .iter()
            .map(|(kind, f)| format!("{kind} requires mitigation ({:.2})", f.risk_score))
            .collect();

        DomainFinding::new(
            peak,
            if elevated.is_empty() { 0.3 } else { 0.8 },
            indicators,
            json!({"actions": actions}),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::EntityType;
    use serde_json::json;

    #[tokio::test]
    async fn actions_cover_each_elevated_domain() {
        let mut state = InvestigationState::new(EntityType::UserId, "u-17", 7);
        state.domain_findings.insert(
            DomainKind::Device,
            DomainFinding::new(0.7, 0.8, vec![], json!({})),
        );
        state.domain_findings.insert(
            DomainKind::Network,
            DomainFinding::new(0.1, 0.8, vec![], json!({})),
        );

        let finding = RemediationAgent.analyse(&state).await;
        let actions = finding.details["actions"].as_array().unwrap();
        assert_eq!(actions.len(), 1);
        assert!(actions[0].as_str().unwrap().contains("device"));
        assert!((finding.risk_score - 0.7).abs() < f64::EPSILON);
    }
}
