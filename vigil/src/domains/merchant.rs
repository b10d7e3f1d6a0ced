//! Merchant domain: payment amount patterns.

use async_trait::async_trait;
use serde_json::json;

use super::evidence;
use super::{DomainAgent, DomainKind};
use crate::state::{DomainFinding, InvestigationState};

/// Analyses payment amounts for structuring and burst patterns.
#[derive(Debug, Clone, Copy, Default)]
pub struct MerchantAgent;

#[async_trait]
impl DomainAgent for MerchantAgent {
    fn kind(&self) -> DomainKind {
        DomainKind::Merchant
    }

    async fn analyse(&self, state: &InvestigationState) -> DomainFinding {
        let mut indicators = Vec::new();
        let mut risk: f64 = 0.0;

        let amounts = evidence::field_values(state, "PAID_AMOUNT_VALUE");

        if !amounts.is_empty() {
            let total: f64 = amounts.iter().sum();
            let mean = total / amounts.len() as f64;
            let max = amounts.iter().cloned().fold(0.0_f64, f64::max);

            // A single payment far above the account's norm.
            if max > mean * 5.0 && max > 500.0 {
                risk += 0.3;
                indicators.push(format!("outlier payment of {max:.2} against mean {mean:.2}"));
            }

            // Identical repeated amounts read as card testing.
            let mut sorted = amounts.clone();
            sorted.sort_by(|a, b| a.total_cmp(b));
            let repeats = sorted.windows(2).filter(|w| (w[0] - w[1]).abs() < 1e-9).count();
            if repeats >= 3 {
                risk += 0.25;
                indicators.push(format!("{} repeated identical amounts", repeats + 1));
            }

            let small_share = amounts.iter().filter(|a| **a < 2.0).count() as f64
                / amounts.len() as f64;
            if small_share > 0.5 && amounts.len() >= 4 {
                risk += 0.25;
                indicators.push("majority of payments under 2.00 (card testing pattern)".to_owned());
            }
        }

        if let Some(anomaly) = evidence::tool_risk(state, "ml_anomaly_detection") {
            risk = risk.max(anomaly);
            if anomaly >= 0.5 {
                indicators.push(format!("anomaly model score {anomaly:.2}"));
            }
        }

        DomainFinding::new(
            risk,
            evidence::data_confidence(state),
            indicators,
            json!({"payment_count": amounts.len()}),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::EntityType;

    #[tokio::test]
    async fn card_testing_pattern_is_flagged() {
        let mut state = InvestigationState::new(EntityType::DeviceId, "d-1", 7);
        state.snowflake_data = Some(json!({
            "rows": [
                {"PAID_AMOUNT_VALUE": 1.0},
                {"PAID_AMOUNT_VALUE": 1.0},
                {"PAID_AMOUNT_VALUE": 1.0},
                {"PAID_AMOUNT_VALUE": 1.0},
            ],
            "row_count": 4,
        }));
        let finding = MerchantAgent.analyse(&state).await;
        assert!(finding.risk_score >= 0.4);
    }
}
