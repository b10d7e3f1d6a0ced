//! Device domain: identifier churn and fingerprint consistency.

use async_trait::async_trait;
use serde_json::json;

use super::evidence;
use super::{DomainAgent, DomainKind};
use crate::state::{DomainFinding, InvestigationState};

/// Analyses device identifiers and fingerprints across the window.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceAgent;

#[async_trait]
impl DomainAgent for DeviceAgent {
    fn kind(&self) -> DomainKind {
        DomainKind::Device
    }

    async fn analyse(&self, state: &InvestigationState) -> DomainFinding {
        let mut indicators = Vec::new();
        let mut risk: f64 = 0.0;

        let devices = evidence::distinct_strings(state, "DEVICE_ID");
        let fingerprints = evidence::distinct_strings(state, "DEVICE_FINGERPRINT");
        let types = evidence::distinct_strings(state, "DEVICE_TYPE");
        let rows = state.warehouse_rows().len();

        // Many devices over few transactions reads as device cycling.
        if rows >= 3 && devices.len() as f64 / rows as f64 > 0.7 {
            risk += 0.35;
            indicators.push(format!(
                "{} distinct devices across {rows} transactions",
                devices.len()
            ));
        }

        // More fingerprints than devices means fingerprints rotating under
        // a stable identifier.
        if fingerprints.len() > devices.len() && !devices.is_empty() {
            risk += 0.25;
            indicators.push(format!(
                "{} fingerprints over {} device id(s)",
                fingerprints.len(),
                devices.len()
            ));
        }

        if types.len() > 2 {
            risk += 0.1;
            indicators.push(format!("{} device types in the window", types.len()));
        }

        if let Some(intel) = evidence::tool_risk(state, "device_intel") {
            risk = risk.max(intel);
            if intel >= 0.5 {
                indicators.push(format!("device intelligence score {intel:.2}"));
            }
        }

        DomainFinding::new(
            risk,
            evidence::data_confidence(state),
            indicators,
            json!({
                "distinct_devices": devices.len(),
                "distinct_fingerprints": fingerprints.len(),
                "device_types": types,
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::EntityType;

    #[tokio::test]
    async fn device_cycling_raises_risk() {
        let mut state = InvestigationState::new(EntityType::UserId, "u-17", 7);
        state.snowflake_data = Some(json!({
            "rows": [
                {"DEVICE_ID": "d1", "DEVICE_FINGERPRINT": "f1"},
                {"DEVICE_ID": "d2", "DEVICE_FINGERPRINT": "f2"},
                {"DEVICE_ID": "d3", "DEVICE_FINGERPRINT": "f3"},
                {"DEVICE_ID": "d4", "DEVICE_FINGERPRINT": "f4"},
            ],
            "row_count": 4,
        }));
        let finding = DeviceAgent.analyse(&state).await;
        assert!(finding.risk_score >= 0.35);
    }
}
