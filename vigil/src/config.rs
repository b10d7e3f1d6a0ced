//! Engine configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::llm::{LlmOptions, RetryPolicy};
use crate::phase::{Mode, PhaseLimits};
use crate::warehouse::TableRef;

/// Configuration for one engine instance.
///
/// Defaults follow the live numeric policy; [`EngineConfig::test`] tightens
/// every limit and timeout for deterministic test runs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Live or test limits.
    pub mode: Mode,
    /// Phase machine ceilings.
    pub limits: PhaseLimits,
    /// Model identifier used for orchestration calls.
    pub model: String,
    /// Per-tool-call timeout.
    pub tool_timeout: Duration,
    /// Transactions table location.
    pub warehouse_table: TableRef,
    /// Cap on warehouse result rows.
    pub result_limit: usize,
    /// Directory for the optional append-only message journal.
    pub journal_dir: Option<PathBuf>,
}

impl EngineConfig {
    /// Live configuration with the default model.
    #[must_use]
    pub fn live() -> Self {
        Self::for_mode(Mode::Live)
    }

    /// Test configuration: tightened ceilings, short timeouts.
    #[must_use]
    pub fn test() -> Self {
        Self::for_mode(Mode::Test)
    }

    fn for_mode(mode: Mode) -> Self {
        let tool_timeout = match mode {
            Mode::Live => Duration::from_secs(30),
            Mode::Test => Duration::from_secs(5),
        };
        Self {
            mode,
            limits: PhaseLimits::for_mode(mode),
            model: "claude-3-5-sonnet-20240620".to_owned(),
            tool_timeout,
            warehouse_table: TableRef::transactions_default(),
            result_limit: 100,
            journal_dir: None,
        }
    }

    /// Override the model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Enable the append-only message journal under `dir`.
    #[must_use]
    pub fn with_journal_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.journal_dir = Some(dir.into());
        self
    }

    /// Override the warehouse table.
    #[must_use]
    pub fn with_warehouse_table(mut self, table: TableRef) -> Self {
        self.warehouse_table = table;
        self
    }

    /// LLM call options derived from this configuration.
    #[must_use]
    pub fn llm_options(&self) -> LlmOptions {
        LlmOptions::for_model(self.model.clone(), self.mode)
    }

    /// Retry policy derived from this configuration.
    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::for_mode(self.mode)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::live()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_tightens_timeouts() {
        let live = EngineConfig::live();
        let test = EngineConfig::test();
        assert!(test.tool_timeout < live.tool_timeout);
        assert!(test.limits.wall_clock_secs < live.limits.wall_clock_secs);
        assert!(test.llm_options().timeout < live.llm_options().timeout);
    }
}
