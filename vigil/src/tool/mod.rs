//! Tools: named capabilities invoked on behalf of the model.
//!
//! Each tool declares a name, a description, a JSON-schema argument surface,
//! and a category; the registry indexes them and renders definitions for LLM
//! binding. The executor (in [`executor`]) is the only component that runs
//! them.

mod executor;

pub use executor::ToolExecutor;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::ToolError;

/// Broad capability category a tool belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    /// Data warehouse access.
    Warehouse,
    /// Threat intelligence lookups.
    ThreatIntel,
    /// Machine-learning scoring and anomaly detection.
    MachineLearning,
    /// Open search over external sources.
    Search,
    /// Network reputation and topology.
    Network,
    /// Anything else.
    Utility,
}

/// Declaration of one tool for registry indexing and LLM binding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// snake_case tool name.
    pub name: String,
    /// What the tool does; guides model selection.
    pub description: String,
    /// JSON Schema for the argument object.
    pub input_schema: Value,
    /// Capability category.
    pub category: ToolCategory,
}

/// Execution context handed to a running tool.
///
/// Tools must respect the deadline and poll for cancellation across their own
/// suspension points.
#[derive(Debug, Clone)]
pub struct ToolContext {
    deadline: Option<Instant>,
    cancelled: watch::Receiver<bool>,
}

impl ToolContext {
    /// A context with a deadline and a cancellation channel.
    #[must_use]
    pub const fn new(deadline: Option<Instant>, cancelled: watch::Receiver<bool>) -> Self {
        Self {
            deadline,
            cancelled,
        }
    }

    /// A context with no deadline and no cancellation. For tests.
    #[must_use]
    pub fn unbounded() -> Self {
        // The sender is dropped immediately; the receiver keeps reporting the
        // last observed value, which stays `false`.
        let (_tx, rx) = watch::channel(false);
        Self {
            deadline: None,
            cancelled: rx,
        }
    }

    /// The absolute deadline, if one applies.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, `None` when unbounded.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Whether the owning unit has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.cancelled.borrow()
    }
}

/// Result of a successful tool invocation.
#[derive(Debug, Clone)]
pub enum ToolOutput {
    /// Structured JSON.
    Json(Value),
    /// Opaque bytes with a declared content type.
    Raw {
        /// The result body.
        bytes: Bytes,
        /// The declared content type.
        content_type: String,
    },
}

impl ToolOutput {
    /// A structured JSON output.
    #[must_use]
    pub const fn json(value: Value) -> Self {
        Self::Json(value)
    }

    /// A raw byte output.
    #[must_use]
    pub fn raw(bytes: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        Self::Raw {
            bytes: bytes.into(),
            content_type: content_type.into(),
        }
    }
}

/// An opaque capability the model can invoke.
#[async_trait]
pub trait Tool: Send + Sync {
    /// snake_case tool name.
    fn name(&self) -> &str;

    /// What the tool does.
    fn description(&self) -> &str;

    /// Capability category.
    fn category(&self) -> ToolCategory;

    /// JSON Schema for the argument object.
    fn input_schema(&self) -> Value;

    /// Run the tool.
    ///
    /// # Errors
    ///
    /// Returns a [`ToolError`] on failure; the executor folds it into the
    /// conversation rather than propagating it.
    async fn invoke(&self, args: Value, ctx: &ToolContext) -> Result<ToolOutput, ToolError>;

    /// Render the registry-facing definition.
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_owned(),
            description: self.description().to_owned(),
            input_schema: self.input_schema(),
            category: self.category(),
        }
    }
}

/// Index of available tools, keyed by name.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any previous tool of the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_owned(), tool);
    }

    /// Register a tool, builder style.
    #[must_use]
    pub fn with(mut self, tool: Arc<dyn Tool>) -> Self {
        self.register(tool);
        self
    }

    /// Look up a tool by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// Whether a tool of this name is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Definitions of every registered tool, for LLM binding.
    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.definition()).collect()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Validate `args` against a tool's declared JSON schema.
///
/// The check covers the parts of JSON Schema the tool surface actually uses:
/// the argument value must be an object, every `required` key must be
/// present, and declared primitive `type` tags must match.
///
/// # Errors
///
/// A description of the first violation found.
pub fn validate_arguments(schema: &Value, args: &Value) -> Result<(), String> {
    let Some(object) = args.as_object() else {
        return Err(format!("arguments must be an object, got {}", type_name(args)));
    };

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for key in required.iter().filter_map(Value::as_str) {
            if !object.contains_key(key) {
                return Err(format!("missing required argument '{key}'"));
            }
        }
    }

    if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
        for (key, value) in object {
            let Some(declared) = properties.get(key).and_then(|p| p.get("type")) else {
                continue;
            };
            let Some(expected) = declared.as_str() else {
                continue;
            };
            if !matches_type(value, expected) {
                return Err(format!(
                    "argument '{key}' should be {expected}, got {}",
                    type_name(value)
                ));
            }
        }
    }

    Ok(())
}

fn matches_type(value: &Value, expected: &str) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
