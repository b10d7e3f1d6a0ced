//! Conversation records exchanged between the engine and the model.
//!
//! An investigation accumulates an append-only sequence of [`Message`]s.
//! The variants mirror the chat-completion convention: system instructions,
//! human input, model turns (which may request tool calls), and tool results.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Stable identifier for correlating the eventual tool result.
    pub id: String,
    /// Name of the tool to invoke.
    pub name: String,
    /// Arguments as a JSON object.
    pub arguments: Value,
}

impl ToolCall {
    /// Create a new tool call request.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// Parse the arguments into a typed value.
    ///
    /// Handles both object arguments and stringified JSON, since providers
    /// differ in how they encode the payload.
    pub fn parse_arguments<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        match &self.arguments {
            Value::String(s) => serde_json::from_str(s),
            other => serde_json::from_value(other.clone()),
        }
    }
}

/// Result payload carried by a tool message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum ToolPayload {
    /// Structured JSON produced by the tool.
    Parsed {
        /// The parsed value.
        value: Value,
    },
    /// Opaque bytes the executor could not parse as JSON.
    Raw {
        /// The raw result body.
        #[serde(with = "raw_bytes")]
        bytes: Bytes,
        /// Declared content type of the body.
        content_type: String,
    },
    /// The call failed; the failure is recorded in-band, never raised.
    Error {
        /// Error kind tag, e.g. `invalid_arguments` or `timeout`.
        kind: String,
        /// Human-readable description.
        message: String,
    },
}

impl ToolPayload {
    /// Create a parsed JSON payload.
    #[must_use]
    pub const fn parsed(value: Value) -> Self {
        Self::Parsed { value }
    }

    /// Create a raw byte payload with a content type.
    #[must_use]
    pub fn raw(bytes: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        Self::Raw {
            bytes: bytes.into(),
            content_type: content_type.into(),
        }
    }

    /// Create an error payload.
    #[must_use]
    pub fn error(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// The parsed value, if this payload is structured JSON.
    #[must_use]
    pub const fn as_parsed(&self) -> Option<&Value> {
        match self {
            Self::Parsed { value } => Some(value),
            _ => None,
        }
    }

    /// Whether this payload records a failed call.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

/// A record in the investigation conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    /// Instructions injected by the engine.
    System {
        /// The instruction text.
        content: String,
    },
    /// Input originating from the requesting user.
    Human {
        /// The input text.
        content: String,
    },
    /// A model turn: free text, tool call requests, or both.
    Ai {
        /// Textual content of the turn.
        content: String,
        /// Tool calls requested by the model, in request order.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    /// The result of one tool call.
    Tool {
        /// Id of the [`ToolCall`] this answers.
        call_id: String,
        /// Name of the tool that ran.
        name: String,
        /// The result payload.
        payload: ToolPayload,
    },
}

impl Message {
    /// Create a system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::System {
            content: content.into(),
        }
    }

    /// Create a human message.
    #[must_use]
    pub fn human(content: impl Into<String>) -> Self {
        Self::Human {
            content: content.into(),
        }
    }

    /// Create a model turn with text only.
    #[must_use]
    pub fn ai(content: impl Into<String>) -> Self {
        Self::Ai {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    /// Create a model turn that requests tool calls.
    #[must_use]
    pub fn ai_with_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self::Ai {
            content: content.into(),
            tool_calls,
        }
    }

    /// Create a tool result message.
    #[must_use]
    pub fn tool(
        call_id: impl Into<String>,
        name: impl Into<String>,
        payload: ToolPayload,
    ) -> Self {
        Self::Tool {
            call_id: call_id.into(),
            name: name.into(),
            payload,
        }
    }

    /// Whether this is a model turn carrying at least one tool call.
    #[must_use]
    pub fn has_tool_calls(&self) -> bool {
        matches!(self, Self::Ai { tool_calls, .. } if !tool_calls.is_empty())
    }

    /// The tool calls of a model turn, empty otherwise.
    #[must_use]
    pub fn tool_calls(&self) -> &[ToolCall] {
        match self {
            Self::Ai { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }

    /// Textual content for system, human, and model turns.
    #[must_use]
    pub fn text_content(&self) -> Option<&str> {
        match self {
            Self::System { content } | Self::Human { content } | Self::Ai { content, .. } => {
                Some(content)
            }
            Self::Tool { .. } => None,
        }
    }

    /// Whether this is a tool result for the named tool.
    #[must_use]
    pub fn is_tool_result_for(&self, tool_name: &str) -> bool {
        matches!(self, Self::Tool { name, .. } if name == tool_name)
    }
}

mod raw_bytes {
    //! Serde adapter storing raw payload bytes as base64-free byte vectors.

    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        bytes.as_ref().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        Vec::<u8>::deserialize(deserializer).map(Bytes::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ai_turn_reports_tool_calls() {
        let call = ToolCall::new("call_1", "warehouse_query", json!({"limit": 10}));
        let msg = Message::ai_with_tool_calls("querying", vec![call]);
        assert!(msg.has_tool_calls());
        assert_eq!(msg.tool_calls().len(), 1);
        assert_eq!(msg.tool_calls()[0].name, "warehouse_query");
    }

    #[test]
    fn text_turns_have_no_tool_calls() {
        assert!(!Message::ai("done").has_tool_calls());
        assert!(Message::system("rules").tool_calls().is_empty());
    }

    #[test]
    fn tool_call_arguments_parse_from_string_or_object() {
        #[derive(Deserialize)]
        struct Args {
            limit: u32,
        }

        let object = ToolCall::new("a", "t", json!({"limit": 5}));
        assert_eq!(object.parse_arguments::<Args>().unwrap().limit, 5);

        let stringified = ToolCall::new("b", "t", Value::String("{\"limit\":7}".into()));
        assert_eq!(stringified.parse_arguments::<Args>().unwrap().limit, 7);
    }

    #[test]
    fn payload_serde_round_trip() {
        let payloads = [
            ToolPayload::parsed(json!({"rows": []})),
            ToolPayload::raw(&b"plain text"[..], "text/plain"),
            ToolPayload::error("timeout", "tool exceeded 30s"),
        ];
        for payload in payloads {
            let encoded = serde_json::to_string(&payload).unwrap();
            let decoded: ToolPayload = serde_json::from_str(&encoded).unwrap();
            assert_eq!(decoded, payload);
        }
    }

    #[test]
    fn message_serde_round_trip() {
        let msg = Message::tool("call_9", "ip_reputation", ToolPayload::parsed(json!({"score": 0.1})));
        let encoded = serde_json::to_string(&msg).unwrap();
        let decoded: Message = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, msg);
        assert!(decoded.is_tool_result_for("ip_reputation"));
    }
}
