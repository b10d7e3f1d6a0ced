//! Authentication domain: account identity signals.

use async_trait::async_trait;
use serde_json::json;

use super::evidence;
use super::{DomainAgent, DomainKind};
use crate::state::{DomainFinding, InvestigationState};

/// Analyses identity signals: email spread and auth tool readings.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthenticationAgent;

#[async_trait]
impl DomainAgent for AuthenticationAgent {
    fn kind(&self) -> DomainKind {
        DomainKind::Authentication
    }

    async fn analyse(&self, state: &InvestigationState) -> DomainFinding {
        let mut indicators = Vec::new();
        let mut risk: f64 = 0.0;

        let emails = evidence::distinct_strings(state, "EMAIL");
        let rows = state.warehouse_rows().len();

        // One entity transacting under many emails reads as account abuse.
        if emails.len() > 2 {
            risk += 0.3;
            indicators.push(format!(
                "{} distinct emails across {rows} transactions",
                emails.len()
            ));
        }

        let disposable = emails
            .iter()
            .filter(|e| {
                e.ends_with("@mailinator.com")
                    || e.ends_with("@guerrillamail.com")
                    || e.ends_with("@10minutemail.com")
            })
            .count();
        if disposable > 0 {
            risk += 0.25;
            indicators.push(format!("{disposable} disposable email domain(s)"));
        }

        if let Some(auth) = evidence::tool_risk(state, "auth_events") {
            risk = risk.max(auth);
            if auth >= 0.5 {
                indicators.push(format!("authentication anomaly score {auth:.2}"));
            }
        }

        DomainFinding::new(
            risk,
            evidence::data_confidence(state),
            indicators,
            json!({"distinct_emails": emails.len()}),
        )
    }
}
