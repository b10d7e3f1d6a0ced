//! Logs domain: behavioural density of the transaction trail.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::evidence;
use super::{DomainAgent, DomainKind};
use crate::state::{DomainFinding, InvestigationState};

/// Analyses transaction volume, disputes, and decision history.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogsAgent;

#[async_trait]
impl DomainAgent for LogsAgent {
    fn kind(&self) -> DomainKind {
        DomainKind::Logs
    }

    async fn analyse(&self, state: &InvestigationState) -> DomainFinding {
        let mut indicators = Vec::new();
        let mut risk: f64 = 0.0;

        let rows = state.warehouse_rows().len();
        let disputes = evidence::sum_field(state, "DISPUTES");
        let alerts = evidence::sum_field(state, "FRAUD_ALERTS");

        // Velocity: a dense trail inside a short window.
        let per_day = rows as f64 / f64::from(state.date_range_days.max(1));
        if per_day > 5.0 {
            risk += 0.25;
            indicators.push(format!("{per_day:.1} transactions per day"));
        }

        if disputes > 0.0 {
            risk += (0.1 * disputes).min(0.3);
            indicators.push(format!("{disputes:.0} dispute(s) in the window"));
        }
        if alerts > 0.0 {
            risk += (0.1 * alerts).min(0.3);
            indicators.push(format!("{alerts:.0} fraud alert(s) in the window"));
        }

        let declined = evidence::row_share(state, |row| {
            row.get("NSURE_LAST_DECISION")
                .and_then(Value::as_str)
                .is_some_and(|d| d.eq_ignore_ascii_case("declined"))
        });
        if declined > 0.2 {
            risk += 0.2;
            indicators.push(format!("{:.0}% of decisions were declines", declined * 100.0));
        }

        if let Some(behaviour) = evidence::tool_risk(state, "behaviour_logs") {
            risk = risk.max(behaviour);
        }

        DomainFinding::new(
            risk,
            evidence::data_confidence(state),
            indicators,
            json!({
                "transactions": rows,
                "disputes": disputes,
                "fraud_alerts": alerts,
                "decline_share": declined,
            }),
        )
    }
}
