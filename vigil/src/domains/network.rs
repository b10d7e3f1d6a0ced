//! Network domain: IP spread, country diversity, and reputation readings.

use async_trait::async_trait;
use serde_json::json;

use super::evidence;
use super::{DomainAgent, DomainKind};
use crate::state::{DomainFinding, InvestigationState};

/// Analyses the network footprint of the entity's transactions.
#[derive(Debug, Clone, Copy, Default)]
pub struct NetworkAgent;

#[async_trait]
impl DomainAgent for NetworkAgent {
    fn kind(&self) -> DomainKind {
        DomainKind::Network
    }

    async fn analyse(&self, state: &InvestigationState) -> DomainFinding {
        let mut indicators = Vec::new();
        let mut risk: f64 = 0.0;

        let ips = evidence::distinct_strings(state, "IP");
        let countries = evidence::distinct_strings(state, "IP_COUNTRY_CODE");
        let rows = state.warehouse_rows().len();

        if countries.len() > 2 {
            risk += 0.3;
            indicators.push(format!(
                "transactions from {} countries within the window",
                countries.len()
            ));
        }
        if rows > 0 && ips.len() > rows / 2 && ips.len() > 3 {
            risk += 0.2;
            indicators.push(format!("{} distinct IPs across {rows} transactions", ips.len()));
        }

        // External reputation reading, when the orchestrator collected one.
        if let Some(reputation) = evidence::tool_risk(state, "ip_reputation") {
            risk = risk.max(reputation);
            if reputation >= 0.5 {
                indicators.push(format!("IP reputation score {reputation:.2}"));
            }
        }

        let fraud_share = evidence::row_share(state, |row| {
            row.get("IS_FRAUD_TX")
                .and_then(serde_json::Value::as_bool)
                .unwrap_or(false)
        });
        if fraud_share > 0.0 {
            risk += 0.3 * fraud_share;
            indicators.push(format!(
                "{:.0}% of transactions carry a fraud label",
                fraud_share * 100.0
            ));
        }

        DomainFinding::new(
            risk,
            evidence::data_confidence(state),
            indicators,
            json!({
                "distinct_ips": ips.len(),
                "countries": countries,
                "fraud_share": fraud_share,
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
    async fn country_spread_raises_risk() {
        let mut state = InvestigationState::new(EntityType::IpAddress, "203.0.113.5", 7);
        state.snowflake_data = Some(json!({
            "rows": [
                {"IP": "1.1.1.1", "IP_COUNTRY_CODE": "US"},
                {"IP": "2.2.2.2", "IP_COUNTRY_CODE": "RO"},
                {"IP": "3.3.3.3", "IP_COUNTRY_CODE": "NG"},
            ],
            "row_count": 3,
        }));
        let finding = NetworkAgent.analyse(&state).await;
        assert!(finding.risk_score >= 0.3);
        assert!(!finding.risk_indicators.is_empty());
    }

    #[tokio::test]
    async fn no_data_means_low_risk_low_confidence() {
        let state = InvestigationState::new(EntityType::IpAddress, "203.0.113.5", 7);
        let finding = NetworkAgent.analyse(&state).await;
        assert!(finding.risk_score < 0.1);
        assert!((finding.confidence - 0.2).abs() < f64::EPSILON);
    }
}
