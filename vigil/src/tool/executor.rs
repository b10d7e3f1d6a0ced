//! The tool executor: validates, runs, and records tool calls.
//!
//! Calls within one model turn run concurrently, but their tool messages are
//! appended in the original request order; the executor buffers each result
//! until its turn comes. Failures never escape: every outcome becomes a tool
//! message, error payloads included.

use std::collections::BTreeSet;

use serde_json::Value;
use tracing::{info_span, warn, Instrument};

use super::{validate_arguments, ToolContext, ToolOutput, ToolRegistry};
use crate::error::ToolError;
use crate::message::{Message, ToolCall, ToolPayload};
use crate::state::StateUpdate;

use std::time::Duration;

/// Runs the tool calls of one model turn.
#[derive(Debug)]
pub struct ToolExecutor {
    registry: ToolRegistry,
    per_call_timeout: Duration,
}

/// Outcome of a single call before it is folded into the state update.
struct CallOutcome {
    call: ToolCall,
    payload: ToolPayload,
    invoked: bool,
}

impl ToolExecutor {
    /// Create an executor over a registry with a per-call timeout.
    #[must_use]
    pub fn new(registry: ToolRegistry, per_call_timeout: Duration) -> Self {
        Self {
            registry,
            per_call_timeout,
        }
    }

    /// The underlying registry.
    #[must_use]
    pub const fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Execute the given calls and fold every outcome into a [`StateUpdate`].
    ///
    /// `answered` holds call ids that already have a tool message; those
    /// calls are not re-invoked (at-most-once per investigation and call id)
    /// but still receive a tool message with an error payload, so every call
    /// of a model turn is answered exactly once. Calls run concurrently;
    /// tool messages are emitted in request order regardless of completion
    /// order.
    pub async fn execute_turn(
        &self,
        calls: &[ToolCall],
        answered: &BTreeSet<String>,
        ctx: &ToolContext,
    ) -> StateUpdate {
        let outcomes = futures::future::join_all(calls.iter().map(|call| async move {
            if answered.contains(&call.id) {
                CallOutcome {
                    call: call.clone(),
                    payload: ToolPayload::error(
                        "tool.execution",
                        format!("call id '{}' was already executed", call.id),
                    ),
                    invoked: false,
                }
            } else {
                self.execute_one(call, ctx).await
            }
        }))
        .await;

        let mut update = StateUpdate::empty();
        for outcome in outcomes {
            if outcome.invoked {
                update.tools_used.insert(outcome.call.name.clone());
            }
            if let ToolPayload::Parsed { value } = &outcome.payload {
                update
                    .tool_results
                    .insert(outcome.call.name.clone(), value.clone());
            }
            update.messages.push(Message::tool(
                outcome.call.id.clone(),
                outcome.call.name.clone(),
                outcome.payload,
            ));
        }
        update
    }

    /// Validate and run one call, classifying every failure into a payload.
    async fn execute_one(&self, call: &ToolCall, ctx: &ToolContext) -> CallOutcome {
        let span = info_span!(
            "tool",
            tool.name = %call.name,
            tool.call_id = %call.id,
            tool.success = tracing::field::Empty,
        );

        async {
            let Some(tool) = self.registry.get(&call.name) else {
                warn!(tool = %call.name, "Tool not found in registry");
                return CallOutcome {
                    call: call.clone(),
                    payload: error_payload(&ToolError::NotFound(call.name.clone())),
                    invoked: false,
                };
            };

            let args = normalise_arguments(&call.arguments);
            if let Err(message) = validate_arguments(&tool.input_schema(), &args) {
                let err = ToolError::invalid_arguments(&call.name, message);
                warn!(tool = %call.name, error = %err, "Argument validation failed");
                return CallOutcome {
                    call: call.clone(),
                    payload: error_payload(&err),
                    invoked: false,
                };
            }

            let invocation = tool.invoke(args, ctx);
            let result = tokio::time::timeout(self.per_call_timeout, invocation).await;

            let payload = match result {
                Err(_) => {
                    let err = ToolError::Timeout(call.name.clone());
                    warn!(tool = %call.name, timeout_ms = self.per_call_timeout.as_millis() as u64, "Tool timed out");
                    error_payload(&err)
                }
                Ok(Err(err)) => {
                    warn!(tool = %call.name, error = %err, "Tool execution failed");
                    error_payload(&err)
                }
                Ok(Ok(output)) => parse_output(output),
            };

            tracing::Span::current().record("tool.success", !payload.is_error());
            CallOutcome {
                call: call.clone(),
                payload,
                invoked: true,
            }
        }
        .instrument(span)
        .await
    }
}

/// Providers differ in whether arguments arrive as an object or a JSON
/// string; accept both.
fn normalise_arguments(arguments: &Value) -> Value {
    match arguments {
        Value::String(s) => serde_json::from_str(s).unwrap_or_else(|_| arguments.clone()),
        other => other.clone(),
    }
}

fn error_payload(err: &ToolError) -> ToolPayload {
    ToolPayload::error(err.kind(), err.to_string())
}

/// Parse a tool output: JSON results become structured payloads, raw bodies
/// are parsed opportunistically and stored raw when that fails.
fn parse_output(output: ToolOutput) -> ToolPayload {
    match output {
        ToolOutput::Json(value) => ToolPayload::parsed(value),
        ToolOutput::Raw {
            bytes,
            content_type,
        } => match serde_json::from_slice::<Value>(&bytes) {
            Ok(value) => ToolPayload::parsed(value),
            Err(_) => ToolPayload::raw(bytes, content_type),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::{Tool, ToolCategory};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Arc;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echoes back the message argument."
        }

        fn category(&self) -> ToolCategory {
            ToolCategory::Utility
        }

        fn input_schema(&self) -> Value {
            json!({
                "type": "object",
                "properties": {"message": {"type": "string"}},
                "required": ["message"],
            })
        }

        async fn invoke(
            &self,
            args: Value,
            _ctx: &ToolContext,
        ) -> Result<ToolOutput, ToolError> {
            Ok(ToolOutput::json(json!({"echo": args["message"]})))
        }
    }

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }

        fn description(&self) -> &str {
            "Never finishes in time."
        }

        fn category(&self) -> ToolCategory {
            ToolCategory::Utility
        }

        fn input_schema(&self) -> Value {
            json!({"type": "object"})
        }

        async fn invoke(
            &self,
            _args: Value,
            _ctx: &ToolContext,
        ) -> Result<ToolOutput, ToolError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(ToolOutput::json(json!(null)))
        }
    }

    struct RawTool;

    #[async_trait]
    impl Tool for RawTool {
        fn name(&self) -> &str {
            "raw"
        }

        fn description(&self) -> &str {
            "Returns a non-JSON body."
        }

        fn category(&self) -> ToolCategory {
            ToolCategory::Utility
        }

        fn input_schema(&self) -> Value {
            json!({"type": "object"})
        }

        async fn invoke(
            &self,
            _args: Value,
            _ctx: &ToolContext,
        ) -> Result<ToolOutput, ToolError> {
            Ok(ToolOutput::raw(&b"<html>not json</html>"[..], "text/html"))
        }
    }

    fn executor() -> ToolExecutor {
        let registry = ToolRegistry::new()
            .with(Arc::new(EchoTool))
            .with(Arc::new(SlowTool))
            .with(Arc::new(RawTool));
        ToolExecutor::new(registry, Duration::from_millis(100))
    }

    #[tokio::test]
    async fn messages_are_emitted_in_request_order() {
        let executor = executor();
        let calls = vec![
            ToolCall::new("c1", "echo", json!({"message": "first"})),
            ToolCall::new("c2", "echo", json!({"message": "second"})),
        ];
        let update = executor
            .execute_turn(&calls, &BTreeSet::new(), &ToolContext::unbounded())
            .await;

        let ids: Vec<&str> = update
            .messages
            .iter()
            .filter_map(|m| match m {
                Message::Tool { call_id, .. } => Some(call_id.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(ids, ["c1", "c2"]);
        assert!(update.tools_used.contains("echo"));
    }

    #[tokio::test]
    async fn invalid_arguments_become_an_error_payload() {
        let executor = executor();
        let calls = vec![ToolCall::new("c1", "echo", json!({"message": 42}))];
        let update = executor
            .execute_turn(&calls, &BTreeSet::new(), &ToolContext::unbounded())
            .await;

        let Message::Tool { payload, .. } = &update.messages[0] else {
            panic!("expected a tool message");
        };
        assert!(matches!(
            payload,
            ToolPayload::Error { kind, .. } if kind == "tool.invalid_arguments"
        ));
        // Validation failures never count as invocations.
        assert!(update.tools_used.is_empty());
        assert!(update.tool_results.is_empty());
    }

    #[tokio::test]
    async fn timeouts_become_an_error_payload() {
        let executor = executor();
        let calls = vec![ToolCall::new("c1", "slow", json!({}))];
        let update = executor
            .execute_turn(&calls, &BTreeSet::new(), &ToolContext::unbounded())
            .await;

        let Message::Tool { payload, .. } = &update.messages[0] else {
            panic!("expected a tool message");
        };
        assert!(matches!(
            payload,
            ToolPayload::Error { kind, .. } if kind == "tool.timeout"
        ));
    }

    #[tokio::test]
    async fn answered_calls_are_not_reinvoked() {
        let executor = executor();
        let calls = vec![
            ToolCall::new("c1", "echo", json!({"message": "again"})),
            ToolCall::new("c2", "echo", json!({"message": "fresh"})),
        ];
        let answered: BTreeSet<String> = ["c1".to_owned()].into();
        let update = executor
            .execute_turn(&calls, &answered, &ToolContext::unbounded())
            .await;

        // Both calls are answered, but the duplicate is an error payload and
        // never counts as an invocation.
        assert_eq!(update.messages.len(), 2);
        let Message::Tool { call_id, payload, .. } = &update.messages[0] else {
            panic!("expected a tool message");
        };
        assert_eq!(call_id, "c1");
        assert!(payload.is_error());
        assert!(matches!(&update.messages[1], Message::Tool { call_id, .. } if call_id == "c2"));
        assert_eq!(update.tool_results.len(), 1);
    }

    #[tokio::test]
    async fn unknown_tool_is_recorded_not_raised() {
        let executor = executor();
        let calls = vec![ToolCall::new("c1", "nonexistent", json!({}))];
        let update = executor
            .execute_turn(&calls, &BTreeSet::new(), &ToolContext::unbounded())
            .await;
        let Message::Tool { payload, .. } = &update.messages[0] else {
            panic!("expected a tool message");
        };
        assert!(payload.is_error());
    }

    #[tokio::test]
    async fn non_json_bodies_are_stored_raw() {
        let executor = executor();
        let calls = vec![ToolCall::new("c1", "raw", json!({}))];
        let update = executor
            .execute_turn(&calls, &BTreeSet::new(), &ToolContext::unbounded())
            .await;
        let Message::Tool { payload, .. } = &update.messages[0] else {
            panic!("expected a tool message");
        };
        assert!(matches!(payload, ToolPayload::Raw { content_type, .. } if content_type == "text/html"));
        // Raw results are not recorded in the parsed result map.
        assert!(update.tool_results.is_empty());
        assert!(update.tools_used.contains("raw"));
    }

    #[tokio::test]
    async fn stringified_arguments_are_accepted() {
        let executor = executor();
        let calls = vec![ToolCall::new(
            "c1",
            "echo",
            Value::String("{\"message\":\"hi\"}".into()),
        )];
        let update = executor
            .execute_turn(&calls, &BTreeSet::new(), &ToolContext::unbounded())
            .await;
        assert_eq!(update.tool_results["echo"], json!({"echo": "hi"}));
    }
}
