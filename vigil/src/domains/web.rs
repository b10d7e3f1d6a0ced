//! Web domain: user agent and session surface analysis.

use async_trait::async_trait;
use serde_json::json;

use super::evidence;
use super::{DomainAgent, DomainKind};
use crate::state::{DomainFinding, InvestigationState};

/// Markers of automation in user agent strings.
const AUTOMATION_MARKERS: [&str; 5] = ["headless", "phantomjs", "selenium", "curl", "python"];

/// Analyses the web surface: user agents and session spread.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebAgent;

#[async_trait]
impl DomainAgent for WebAgent {
    fn kind(&self) -> DomainKind {
        DomainKind::Web
    }

    async fn analyse(&self, state: &InvestigationState) -> DomainFinding {
        let mut indicators = Vec::new();
        let mut risk: f64 = 0.0;

        let agents = evidence::distinct_strings(state, "USER_AGENT");
        let rows = state.warehouse_rows().len();

        let automated: Vec<&String> = agents
            .iter()
            .filter(|ua| {
                let lower = ua.to_lowercase();
                AUTOMATION_MARKERS.iter().any(|m| lower.contains(m))
            })
            .collect();
        if !automated.is_empty() {
            risk += 0.4;
            indicators.push(format!("{} automated user agent(s)", automated.len()));
        }

        if rows >= 3 && agents.len() as f64 / rows as f64 > 0.8 {
            risk += 0.2;
            indicators.push(format!(
                "{} distinct user agents across {rows} transactions",
                agents.len()
            ));
        }

        if let Some(web) = evidence::tool_risk(state, "web_search") {
            risk = risk.max(web);
        }

        DomainFinding::new(
            risk,
            evidence::data_confidence(state),
            indicators,
            json!({"distinct_user_agents": agents.len()}),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::EntityType;

    #[tokio::test]
    async fn automation_markers_are_flagged() {
        let mut state = InvestigationState::new(EntityType::IpAddress, "203.0.113.5", 7);
        state.snowflake_data = Some(json!({
            "rows": [
                {"USER_AGENT": "Mozilla/5.0 (HeadlessChrome)"},
                {"USER_AGENT": "python-requests/2.31"},
            ],
            "row_count": 2,
        }));
        let finding = WebAgent.analyse(&state).await;
        assert!(finding.risk_score >= 0.4);
    }
}
