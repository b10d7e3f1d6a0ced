//! Vigil is a phase-structured orchestration engine for fraud
//! investigations.
//!
//! An investigation moves through a fixed phase machine — warehouse
//! analysis, model-guided tool execution, sequential domain analyses, and a
//! final risk summary — driven by a flat runtime loop and a deterministic
//! [`router`]. The model proposes; the router and its ceilings dispose: every
//! phase carries loop budgets that force progression when the model stalls,
//! so an investigation always terminates with an auditable verdict.
//!
//! # Architecture
//!
//! - [`state`] — the single mutable investigation record, mutated only by
//!   merging typed [`state::StateUpdate`]s.
//! - [`phase`] — the phase machine and its live/test ceilings.
//! - [`router`] — the pure function selecting the next node.
//! - [`orchestrator`] — the per-phase driver that talks to the model.
//! - [`tool`] — the tool registry and the order-preserving executor.
//! - [`warehouse`] — the mandatory transaction query contract.
//! - [`domains`] — the nine sequential domain agents.
//! - [`summary`] — risk aggregation and the final verdict.
//! - [`runtime`] — the engine loop, budgets, and cancellation.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use vigil::prelude::*;
//!
//! let registry = ToolRegistry::new().with(Arc::new(warehouse_tool));
//! let engine = Engine::new(llm, registry, EngineConfig::live());
//! let report = engine
//!     .run(InvestigationRequest::new(EntityType::IpAddress, "203.0.113.5", 7))
//!     .await?;
//! println!("risk: {} ({})", report.outcome.risk_score, report.outcome.risk_level);
//! ```

pub mod config;
pub mod domains;
pub mod error;
pub mod llm;
pub mod message;
pub mod orchestrator;
pub mod phase;
pub mod router;
pub mod runtime;
pub mod state;
pub mod summary;
pub mod tool;
pub mod warehouse;

/// Commonly used types, re-exported for application code.
pub mod prelude {
    pub use crate::config::EngineConfig;
    pub use crate::domains::{DomainAgent, DomainKind};
    pub use crate::error::{Error, ErrorRecord, LlmError, Result, RuntimeError, ToolError};
    pub use crate::llm::{AiTurn, FailingLlm, LlmClient, LlmOptions, ScriptedLlm};
    pub use crate::message::{Message, ToolCall, ToolPayload};
    pub use crate::phase::{Mode, Phase, PhaseLimits};
    pub use crate::router::{route, NextNode, Verdict};
    pub use crate::runtime::{
        CancelToken, Engine, InvestigationReport, InvestigationRequest,
    };
    pub use crate::state::{
        DomainFinding, EntityType, InvestigationState, StateStore, StateUpdate,
    };
    pub use crate::summary::{RiskLevel, SummaryOutcome};
    pub use crate::tool::{
        Tool, ToolCategory, ToolContext, ToolDefinition, ToolExecutor, ToolOutput, ToolRegistry,
    };
    pub use crate::warehouse::{
        QueryExecutor, QueryMonitor, QueryOutcome, StaticWarehouse, TableRef, TransactionQuery,
        WarehouseTool, WAREHOUSE_TOOL_NAME,
    };
}
