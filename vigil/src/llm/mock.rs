//! Deterministic model backends for tests.
//!
//! [`ScriptedLlm`] returns a fixed sequence of turns, repeating the final
//! turn once the script is exhausted. [`FailingLlm`] fails every call with a
//! fixed classification. Both are used by the seeded end-to-end scenarios.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use super::{AiTurn, LlmClient, LlmOptions};
use crate::error::LlmError;
use crate::message::Message;
use crate::tool::ToolDefinition;

/// A model that replays a fixed script of turns.
#[derive(Debug)]
pub struct ScriptedLlm {
    turns: Vec<AiTurn>,
    cursor: AtomicUsize,
}

impl ScriptedLlm {
    /// Create a scripted model. The final turn repeats once exhausted.
    #[must_use]
    pub fn new(turns: Vec<AiTurn>) -> Self {
        Self {
            turns,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Number of calls served so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.cursor.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn invoke(
        &self,
        _messages: &[Message],
        _tools: &[ToolDefinition],
        _options: &LlmOptions,
    ) -> Result<AiTurn, LlmError> {
        let index = self.cursor.fetch_add(1, Ordering::SeqCst);
        self.turns
            .get(index)
            .or_else(|| self.turns.last())
            .cloned()
            .ok_or_else(|| LlmError::Transient("scripted model has no turns".to_owned()))
    }
}

/// A model that fails every call with a fixed error.
#[derive(Debug)]
pub struct FailingLlm {
    error: LlmError,
    calls: AtomicUsize,
}

impl FailingLlm {
    /// Fail with [`LlmError::Transient`].
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self::with(LlmError::Transient(message.into()))
    }

    /// Fail with [`LlmError::ContextLength`].
    #[must_use]
    pub fn context_length(message: impl Into<String>) -> Self {
        Self::with(LlmError::ContextLength(message.into()))
    }

    /// Fail with [`LlmError::RateLimited`].
    #[must_use]
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::with(LlmError::RateLimited(message.into()))
    }

    /// Fail with the given error.
    #[must_use]
    pub fn with(error: LlmError) -> Self {
        Self {
            error,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of calls attempted so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmClient for FailingLlm {
    async fn invoke(
        &self,
        _messages: &[Message],
        _tools: &[ToolDefinition],
        _options: &LlmOptions,
    ) -> Result<AiTurn, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(self.error.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ToolCall;
    use crate::phase::Mode;
    use serde_json::json;

    #[tokio::test]
    async fn scripted_model_replays_then_repeats_last() {
        let client = ScriptedLlm::new(vec![
            AiTurn::with_tool_calls(
                "querying",
                vec![ToolCall::new("c1", "warehouse_query", json!({}))],
            ),
            AiTurn::text("done"),
        ]);
        let options = LlmOptions::for_model("mock", Mode::Test);

        let first = client.invoke(&[], &[], &options).await.unwrap();
        assert_eq!(first.tool_calls.len(), 1);

        let second = client.invoke(&[], &[], &options).await.unwrap();
        assert_eq!(second.content, "done");

        let third = client.invoke(&[], &[], &options).await.unwrap();
        assert_eq!(third.content, "done");
        assert_eq!(client.calls(), 3);
    }
}
