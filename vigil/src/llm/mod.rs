//! Provider-agnostic LLM client contract.
//!
//! The orchestrator is oblivious to whether the model behind [`LlmClient`]
//! is real, mocked, or deterministic; it sees a single `invoke` operation
//! returning a model turn. Failure classification and the transient-retry
//! policy live here so every call site behaves identically.

mod mock;

pub use mock::{FailingLlm, ScriptedLlm};

use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::error::LlmError;
use crate::message::{Message, ToolCall};
use crate::phase::Mode;
use crate::tool::ToolDefinition;

/// One model turn: text, tool call requests, or both.
#[derive(Debug, Clone, Default)]
pub struct AiTurn {
    /// Textual content.
    pub content: String,
    /// Requested tool calls, in request order.
    pub tool_calls: Vec<ToolCall>,
}

impl AiTurn {
    /// A text-only turn.
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    /// A turn requesting tool calls.
    #[must_use]
    pub fn with_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            content: content.into(),
            tool_calls,
        }
    }

    /// Convert the turn into a conversation message.
    #[must_use]
    pub fn into_message(self) -> Message {
        Message::ai_with_tool_calls(self.content, self.tool_calls)
    }
}

/// Call options: model, sampling, budget, and deadline.
#[derive(Debug, Clone)]
pub struct LlmOptions {
    /// Model identifier.
    pub model: String,
    /// Sampling temperature. Orchestration uses a focused 0.3.
    pub temperature: f32,
    /// Token budget, sized per model.
    pub max_tokens: u32,
    /// Hard deadline for one call.
    pub timeout: Duration,
}

impl LlmOptions {
    /// Default orchestration temperature.
    pub const ORCHESTRATION_TEMPERATURE: f32 = 0.3;

    /// Options for the given model and mode.
    ///
    /// The token budget follows the model family; the call deadline is 90
    /// seconds live and 15 seconds in test mode.
    #[must_use]
    pub fn for_model(model: impl Into<String>, mode: Mode) -> Self {
        let model = model.into();
        let max_tokens = max_tokens_for(&model);
        let timeout = match mode {
            Mode::Live => Duration::from_secs(90),
            Mode::Test => Duration::from_secs(15),
        };
        Self {
            model,
            temperature: Self::ORCHESTRATION_TEMPERATURE,
            max_tokens,
            timeout,
        }
    }
}

/// Token budget by model family. Conservative default for unknown models.
fn max_tokens_for(model: &str) -> u32 {
    let lower = model.to_lowercase();
    if lower.contains("haiku") {
        4096
    } else if lower.contains("sonnet") || lower.contains("opus") {
        8000
    } else {
        4096
    }
}

/// The single operation every model backend implements.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Request one completion with the tool set bound.
    ///
    /// # Errors
    ///
    /// Returns a classified [`LlmError`]; transient failures are retried by
    /// [`invoke_with_retry`], everything else is terminal for the caller.
    async fn invoke(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        options: &LlmOptions,
    ) -> Result<AiTurn, LlmError>;
}

/// Retry policy for transient model failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum retries after the initial attempt.
    pub max_retries: u32,
    /// Base delay; doubles per attempt with jitter.
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Policy for the given mode. Test mode keeps waits negligible.
    #[must_use]
    pub const fn for_mode(mode: Mode) -> Self {
        match mode {
            Mode::Live => Self {
                max_retries: 2,
                base_delay: Duration::from_millis(500),
            },
            Mode::Test => Self {
                max_retries: 2,
                base_delay: Duration::from_millis(5),
            },
        }
    }

    /// Delay before the given retry (0-based), exponential with jitter.
    fn delay(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.saturating_mul(1 << attempt.min(8));
        // Jitter in [0.5, 1.5) keeps concurrent investigations from
        // synchronising their retries.
        exp.mul_f64(0.5 + fastrand::f64())
    }
}

/// Invoke the model, retrying transient failures per `policy`.
///
/// Non-transient failures return immediately; a transient failure that
/// survives every retry is returned as-is for the caller to treat as fatal.
///
/// # Errors
///
/// The last classified [`LlmError`] observed.
pub async fn invoke_with_retry(
    client: &dyn LlmClient,
    messages: &[Message],
    tools: &[ToolDefinition],
    options: &LlmOptions,
    policy: RetryPolicy,
) -> Result<AiTurn, LlmError> {
    let mut attempt = 0;
    loop {
        match client.invoke(messages, tools, options).await {
            Ok(turn) => return Ok(turn),
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                if attempt >= policy.max_retries {
                    return Err(err);
                }
                let delay = policy.delay(attempt);
                warn!(
                    error = %err,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Transient LLM failure, retrying",
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_budget_follows_model_family() {
        assert_eq!(max_tokens_for("claude-3-5-haiku"), 4096);
        assert_eq!(max_tokens_for("claude-3-5-sonnet-20240620"), 8000);
        assert_eq!(max_tokens_for("claude-3-opus"), 8000);
        assert_eq!(max_tokens_for("some-other-model"), 4096);
    }

    #[test]
    fn test_mode_shortens_the_deadline() {
        let live = LlmOptions::for_model("claude-3-5-sonnet", Mode::Live);
        let test = LlmOptions::for_model("claude-3-5-sonnet", Mode::Test);
        assert!(test.timeout < live.timeout);
        assert!((live.temperature - 0.3).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn transient_failures_are_retried_then_surface() {
        let client = FailingLlm::transient("503 upstream");
        let options = LlmOptions::for_model("m", Mode::Test);
        let result = invoke_with_retry(
            &client,
            &[],
            &[],
            &options,
            RetryPolicy::for_mode(Mode::Test),
        )
        .await;
        assert!(matches!(result, Err(LlmError::Transient(_))));
        // Initial attempt plus two retries.
        assert_eq!(client.calls(), 3);
    }

    #[tokio::test]
    async fn fatal_failures_are_not_retried() {
        let client = FailingLlm::context_length("prompt too large");
        let options = LlmOptions::for_model("m", Mode::Test);
        let result = invoke_with_retry(
            &client,
            &[],
            &[],
            &options,
            RetryPolicy::for_mode(Mode::Test),
        )
        .await;
        assert!(matches!(result, Err(LlmError::ContextLength(_))));
        assert_eq!(client.calls(), 1);
    }
}
