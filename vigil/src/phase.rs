//! Investigation phases, legal transitions, and loop ceilings.
//!
//! The phase machine is a straight line with no backward edges:
//! initialization, warehouse analysis, tool execution, domain analysis,
//! summary, complete. Transitions are requested by the orchestrator but the
//! ceilings defined here give the router the authority to force progression
//! when the model stalls.

use serde::{Deserialize, Serialize};

/// A coarse investigation stage with its own entry rules and safety ceilings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Engine setup; emits the opening system notice.
    Initialization,
    /// Mandatory warehouse query phase.
    SnowflakeAnalysis,
    /// LLM-guided selection and execution of additional tools.
    ToolExecution,
    /// Sequential domain agent execution.
    DomainAnalysis,
    /// Final risk synthesis.
    Summary,
    /// Terminal. No further mutation except timing finalisation.
    Complete,
}

impl Phase {
    /// All phases in progression order.
    pub const ORDER: [Self; 6] = [
        Self::Initialization,
        Self::SnowflakeAnalysis,
        Self::ToolExecution,
        Self::DomainAnalysis,
        Self::Summary,
        Self::Complete,
    ];

    /// The phase's snake_case name as used in logs and journals.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Initialization => "initialization",
            Self::SnowflakeAnalysis => "snowflake_analysis",
            Self::ToolExecution => "tool_execution",
            Self::DomainAnalysis => "domain_analysis",
            Self::Summary => "summary",
            Self::Complete => "complete",
        }
    }

    /// The next phase in the line, if any.
    #[must_use]
    pub const fn successor(&self) -> Option<Self> {
        match self {
            Self::Initialization => Some(Self::SnowflakeAnalysis),
            Self::SnowflakeAnalysis => Some(Self::ToolExecution),
            Self::ToolExecution => Some(Self::DomainAnalysis),
            Self::DomainAnalysis => Some(Self::Summary),
            Self::Summary => Some(Self::Complete),
            Self::Complete => None,
        }
    }

    /// Whether a transition from `self` to `target` is legal.
    ///
    /// Forward-only. Jumping ahead is permitted only toward [`Phase::Summary`]
    /// (forced progression on fatal errors or exhausted budgets); every other
    /// edge must be the immediate successor.
    #[must_use]
    pub fn can_transition(&self, target: Self) -> bool {
        if target <= *self {
            return false;
        }
        self.successor() == Some(target) || target == Self::Summary
    }

    /// Whether the phase is terminal.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runtime mode. Test mode tightens every ceiling and timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Production limits.
    #[default]
    Live,
    /// Tightened limits for deterministic test runs.
    Test,
}

/// Numeric progression policy for the phase machine.
///
/// Every limit has a live and a test value; construction picks by [`Mode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseLimits {
    /// Loop ceiling while waiting for the mandatory warehouse result.
    pub snowflake_loops: u32,
    /// Loop ceiling for the tool execution phase.
    pub tool_execution_loops: u32,
    /// Distinct-tool ceiling for the tool execution phase.
    pub tool_count: u32,
    /// Attempts after which tool execution force-progresses regardless.
    pub tool_execution_attempts: u32,
    /// Loop ceiling for the domain analysis phase.
    pub domain_loops: u32,
    /// Global orchestrator invocation ceiling.
    pub orchestrator_calls: u32,
    /// Runtime recursion budget: orchestrator ceiling plus margin.
    pub recursion_budget: u32,
    /// Wall-clock budget for a whole investigation, in seconds.
    pub wall_clock_secs: u64,
}

impl PhaseLimits {
    /// Limits for the given mode.
    #[must_use]
    pub const fn for_mode(mode: Mode) -> Self {
        match mode {
            Mode::Live => Self {
                snowflake_loops: 8,
                tool_execution_loops: 10,
                tool_count: 10,
                tool_execution_attempts: 4,
                domain_loops: 35,
                orchestrator_calls: 55,
                recursion_budget: 70,
                wall_clock_secs: 180,
            },
            Mode::Test => Self {
                snowflake_loops: 6,
                tool_execution_loops: 8,
                tool_count: 8,
                tool_execution_attempts: 4,
                domain_loops: 30,
                orchestrator_calls: 45,
                recursion_budget: 60,
                wall_clock_secs: 60,
            },
        }
    }
}

impl Default for PhaseLimits {
    fn default() -> Self {
        Self::for_mode(Mode::Live)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_are_forward_only() {
        assert!(Phase::Initialization.can_transition(Phase::SnowflakeAnalysis));
        assert!(Phase::SnowflakeAnalysis.can_transition(Phase::ToolExecution));
        assert!(Phase::ToolExecution.can_transition(Phase::DomainAnalysis));
        assert!(Phase::DomainAnalysis.can_transition(Phase::Summary));
        assert!(Phase::Summary.can_transition(Phase::Complete));

        assert!(!Phase::ToolExecution.can_transition(Phase::SnowflakeAnalysis));
        assert!(!Phase::Complete.can_transition(Phase::Summary));
        assert!(!Phase::Summary.can_transition(Phase::Summary));
    }

    #[test]
    fn forced_jump_only_lands_on_summary() {
        assert!(Phase::Initialization.can_transition(Phase::Summary));
        assert!(Phase::SnowflakeAnalysis.can_transition(Phase::Summary));
        assert!(!Phase::Initialization.can_transition(Phase::DomainAnalysis));
        assert!(!Phase::SnowflakeAnalysis.can_transition(Phase::Complete));
    }

    #[test]
    fn test_mode_tightens_every_limit() {
        let live = PhaseLimits::for_mode(Mode::Live);
        let test = PhaseLimits::for_mode(Mode::Test);
        assert!(test.snowflake_loops < live.snowflake_loops);
        assert!(test.tool_execution_loops < live.tool_execution_loops);
        assert!(test.tool_count < live.tool_count);
        assert!(test.domain_loops < live.domain_loops);
        assert!(test.orchestrator_calls < live.orchestrator_calls);
        assert!(test.recursion_budget < live.recursion_budget);
        assert!(test.wall_clock_secs < live.wall_clock_secs);
    }
}
