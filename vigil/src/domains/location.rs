//! Location domain: geographic consistency of the transaction trail.

use async_trait::async_trait;
use serde_json::json;

use super::evidence;
use super::{DomainAgent, DomainKind};
use crate::state::{DomainFinding, InvestigationState};

/// High-risk country codes that weight the location score.
const WATCHLIST: [&str; 5] = ["NG", "RO", "VN", "ID", "PK"];

/// Analyses geographic consistency across the window.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocationAgent;

#[async_trait]
impl DomainAgent for LocationAgent {
    fn kind(&self) -> DomainKind {
        DomainKind::Location
    }

    async fn analyse(&self, state: &InvestigationState) -> DomainFinding {
        let mut indicators = Vec::new();
        let mut risk: f64 = 0.0;

        let countries = evidence::distinct_strings(state, "IP_COUNTRY_CODE");

        if countries.len() > 1 {
            // Multiple origin countries inside a short window.
            risk += 0.15 * (countries.len() as f64 - 1.0).min(3.0);
            indicators.push(format!(
                "activity from {} countries in {} day(s)",
                countries.len(),
                state.date_range_days
            ));
        }

        let watched: Vec<&String> = countries
            .iter()
            .filter(|c| WATCHLIST.contains(&c.as_str()))
            .collect();
        if !watched.is_empty() {
            risk += 0.2;
            indicators.push(format!(
                "activity from watchlisted geography: {}",
                watched
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
        }

        if let Some(geo) = evidence::tool_risk(state, "geolocation") {
            risk = risk.max(geo);
        }

        DomainFinding::new(
            risk,
            evidence::data_confidence(state),
            indicators,
            json!({"countries": countries}),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::EntityType;

    #[tokio::test]
    async fn watchlisted_geography_is_flagged() {
        let mut state = InvestigationState::new(EntityType::IpAddress, "203.0.113.5", 7);
        state.snowflake_data = Some(json!({
            "rows": [
                {"IP_COUNTRY_CODE": "US"},
                {"IP_COUNTRY_CODE": "NG"},
            ],
            "row_count": 2,
        }));
        let finding = LocationAgent.analyse(&state).await;
        assert!(finding.risk_score >= 0.3);
        assert!(finding
            .risk_indicators
            .iter()
            .any(|i| i.contains("watchlisted")));
    }
}
