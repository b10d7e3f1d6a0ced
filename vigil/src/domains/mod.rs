//! Domain agents: specialised analyses over the accumulated evidence.
//!
//! Each agent consumes a read-only state snapshot and produces one
//! [`DomainFinding`](crate::state::DomainFinding). Agents run sequentially in
//! a fixed order; they never issue tool calls (tools are orchestrator-driven)
//! and never call the model.

mod authentication;
mod device;
mod evidence;
mod location;
mod logs;
mod merchant;
mod network;
mod remediation;
mod risk;
mod web;

pub use authentication::AuthenticationAgent;
pub use device::DeviceAgent;
pub use location::LocationAgent;
pub use logs::LogsAgent;
pub use merchant::MerchantAgent;
pub use network::NetworkAgent;
pub use remediation::RemediationAgent;
pub use risk::RiskAgent;
pub use web::WebAgent;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::state::{DomainFinding, InvestigationState};

/// Any labelled risk at or above this score triggers the remediation agent.
pub const REMEDIATION_THRESHOLD: f64 = 0.3;

/// The analysis domains, in execution order.
///
/// The derive order doubles as the sequential execution order; remediation is
/// last and conditional.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainKind {
    /// IP and network reputation analysis.
    Network,
    /// Device identity and fingerprint analysis.
    Device,
    /// Geographic consistency analysis.
    Location,
    /// Behavioural log analysis.
    Logs,
    /// Authentication pattern analysis.
    Authentication,
    /// Web session and user-agent analysis.
    Web,
    /// Merchant and payment pattern analysis.
    Merchant,
    /// Cross-domain risk consolidation.
    Risk,
    /// Mitigation planning; runs only when a labelled risk warrants it.
    Remediation,
}

impl DomainKind {
    /// The mandatory analysis domains in execution order.
    ///
    /// [`DomainKind::Remediation`] is excluded: it joins the required set only
    /// once the risk agent has recorded a finding at or above
    /// [`REMEDIATION_THRESHOLD`].
    pub const ANALYSIS_ORDER: [Self; 8] = [
        Self::Network,
        Self::Device,
        Self::Location,
        Self::Logs,
        Self::Authentication,
        Self::Web,
        Self::Merchant,
        Self::Risk,
    ];

    /// snake_case name used in findings, prompts, and journals.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Device => "device",
            Self::Location => "location",
            Self::Logs => "logs",
            Self::Authentication => "authentication",
            Self::Web => "web",
            Self::Merchant => "merchant",
            Self::Risk => "risk",
            Self::Remediation => "remediation",
        }
    }
}

impl std::fmt::Display for DomainKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The uniform domain agent contract.
///
/// Input is a read-only snapshot; output is one finding. Agents must not
/// issue tool calls and must not call the model more than once (the built-in
/// agents are purely heuristic and call it zero times).
#[async_trait]
pub trait DomainAgent: Send + Sync {
    /// Which domain this agent covers.
    fn kind(&self) -> DomainKind;

    /// Analyse the evidence and produce a finding.
    async fn analyse(&self, state: &InvestigationState) -> DomainFinding;
}

/// The next domain the router should dispatch, honouring the fixed order.
///
/// Returns `None` when every required domain (including a triggered
/// remediation pass) has completed.
#[must_use]
pub fn next_incomplete_domain(state: &InvestigationState) -> Option<DomainKind> {
    for domain in DomainKind::ANALYSIS_ORDER {
        if !state.domains_completed.contains(&domain) {
            return Some(domain);
        }
    }
    if state.needs_remediation() && !state.domains_completed.contains(&DomainKind::Remediation) {
        return Some(DomainKind::Remediation);
    }
    None
}

/// The standard agent set, one per domain, in execution order.
#[must_use]
pub fn standard_agents() -> Vec<Box<dyn DomainAgent>> {
    vec![
        Box::new(NetworkAgent),
        Box::new(DeviceAgent),
        Box::new(LocationAgent),
        Box::new(LogsAgent),
        Box::new(AuthenticationAgent),
        Box::new(WebAgent),
        Box::new(MerchantAgent),
        Box::new(RiskAgent),
        Box::new(RemediationAgent),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{DomainFinding, EntityType, InvestigationState};
    use serde_json::json;

    #[test]
    fn analysis_order_is_the_contractual_sequence() {
        let names: Vec<&str> = DomainKind::ANALYSIS_ORDER.iter().map(DomainKind::as_str).collect();
        assert_eq!(
            names,
            ["network", "device", "location", "logs", "authentication", "web", "merchant", "risk"]
        );
    }

    #[test]
    fn remediation_joins_required_set_only_on_risk() {
        let mut state = InvestigationState::new(EntityType::IpAddress, "203.0.113.5", 7);
        for domain in DomainKind::ANALYSIS_ORDER {
            state.domains_completed.push(domain);
            state.domain_findings.insert(
                domain,
                DomainFinding::new(0.1, 0.5, vec![], json!({})),
            );
        }
        assert_eq!(next_incomplete_domain(&state), None);

        state
            .domain_findings
            .insert(DomainKind::Risk, DomainFinding::new(0.6, 0.7, vec![], json!({})));
        assert_eq!(next_incomplete_domain(&state), Some(DomainKind::Remediation));
    }

    #[test]
    fn domains_run_in_declared_order() {
        let mut state = InvestigationState::new(EntityType::IpAddress, "203.0.113.5", 7);
        assert_eq!(next_incomplete_domain(&state), Some(DomainKind::Network));
        state.domains_completed.push(DomainKind::Network);
        assert_eq!(next_incomplete_domain(&state), Some(DomainKind::Device));
    }
}
