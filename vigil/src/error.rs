//! Error types for the investigation engine.
//!
//! The taxonomy is deliberately flat and tagged: every failure that crosses a
//! component boundary is classified into a stable kind string (for the
//! investigation record) in addition to its typed form. Nodes never raise
//! across the graph boundary; they fold failures into state updates. The
//! typed errors here surface only at the engine API edge and in programmer
//! errors.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::phase::Phase;

/// A type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures reported by the LLM client.
#[derive(Debug, Clone, Error)]
pub enum LlmError {
    /// The conversation exceeded the model's context window. Fatal.
    #[error("context length exceeded: {0}")]
    ContextLength(String),

    /// The configured model does not exist or is not available. Fatal.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// The provider rejected the call for quota reasons. Fatal.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// A retryable failure: network flake, 5xx, timeout.
    #[error("transient LLM failure: {0}")]
    Transient(String),
}

impl LlmError {
    /// Stable kind tag recorded in the investigation error list.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ContextLength(_) => "llm.context_length",
            Self::ModelNotFound(_) => "llm.model_not_found",
            Self::RateLimited(_) => "llm.rate_limit",
            Self::Transient(_) => "llm.transient",
        }
    }

    /// Whether this failure terminates the investigation.
    ///
    /// Transient failures are retried; everything else short-circuits to the
    /// summary phase with a partial verdict.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !matches!(self, Self::Transient(_))
    }
}

/// Failures local to a single tool call.
///
/// These are always recovered by the executor: the failure becomes a tool
/// message with an error payload and the investigation continues.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    /// The requested tool is not registered.
    #[error("tool '{0}' not found")]
    NotFound(String),

    /// The arguments did not satisfy the tool's input schema.
    #[error("invalid arguments for '{tool}': {message}")]
    InvalidArguments {
        /// Tool name.
        tool: String,
        /// Validation failure description.
        message: String,
    },

    /// The tool did not finish within its deadline.
    #[error("tool '{0}' timed out")]
    Timeout(String),

    /// The tool ran and failed.
    #[error("tool '{tool}' failed: {message}")]
    Execution {
        /// Tool name.
        tool: String,
        /// Failure description.
        message: String,
    },
}

impl ToolError {
    /// Stable kind tag recorded in the tool message payload.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "tool.not_found",
            Self::InvalidArguments { .. } => "tool.invalid_arguments",
            Self::Timeout(_) => "tool.timeout",
            Self::Execution { .. } => "tool.execution",
        }
    }

    /// Create an execution error.
    #[must_use]
    pub fn execution(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Execution {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Create an invalid-arguments error.
    #[must_use]
    pub fn invalid_arguments(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArguments {
            tool: tool.into(),
            message: message.into(),
        }
    }
}

/// Failures raised by the warehouse query executor.
///
/// Treated like tool execution failures: recorded, never fatal until the
/// warehouse phase ceiling is exhausted.
#[derive(Debug, Clone, Error)]
#[error("warehouse query failed: {0}")]
pub struct WarehouseError(pub String);

/// Safety terminations enforced by the graph runtime.
#[derive(Debug, Clone, Error)]
pub enum RuntimeError {
    /// The orchestrator invocation budget was exhausted.
    #[error("recursion limit reached after {0} orchestrator calls")]
    RecursionLimit(u32),

    /// The wall-clock budget was exhausted.
    #[error("investigation exceeded the {0}s wall-clock budget")]
    Timeout(u64),

    /// The investigation's cancellation token fired.
    #[error("investigation cancelled: {0}")]
    Cancelled(String),

    /// An invariant of the state machine was violated. Programmer error.
    #[error("invariant violation: {0}")]
    Invariant(String),
}

impl RuntimeError {
    /// Stable kind tag recorded in the investigation error list.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::RecursionLimit(_) => "runtime.recursion_limit",
            Self::Timeout(_) => "runtime.timeout",
            Self::Cancelled(_) => "runtime.cancelled",
            Self::Invariant(_) => "runtime.invariant",
        }
    }
}

/// The top-level error for the engine API.
#[derive(Debug, Error)]
pub enum Error {
    /// LLM client failure.
    #[error(transparent)]
    Llm(#[from] LlmError),

    /// Tool failure that escaped local recovery (registry misuse).
    #[error(transparent)]
    Tool(#[from] ToolError),

    /// Warehouse failure.
    #[error(transparent)]
    Warehouse(#[from] WarehouseError),

    /// Runtime safety termination or invariant violation.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    /// Journal or report I/O failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization failure.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// An error as recorded in the investigation state.
///
/// The record is append-only and survives into the final report, giving every
/// failure a risk level, a reason, and the earliest phase it occurred in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// Stable kind tag, e.g. `llm.context_length`.
    pub kind: String,
    /// Human-readable description.
    pub message: String,
    /// Phase during which the failure occurred.
    pub phase: Phase,
    /// Whether the failure terminated the investigation.
    pub fatal: bool,
}

impl ErrorRecord {
    /// Create a non-fatal error record.
    #[must_use]
    pub fn new(kind: impl Into<String>, message: impl Into<String>, phase: Phase) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            phase,
            fatal: false,
        }
    }

    /// Create a fatal error record.
    #[must_use]
    pub fn fatal(kind: impl Into<String>, message: impl Into<String>, phase: Phase) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            phase,
            fatal: true,
        }
    }
}
