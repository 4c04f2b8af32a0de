use async_trait::async_trait;
use omnigate_core::{ChatMessage, OmnigateError, OmnigateResult, Role};
use serde::{Deserialize, Serialize};

/// Token accounting reported by a provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// Result of a completion or chat call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub content: String,
    pub usage: Usage,
}

/// Contract of an AI model provider.
///
/// Provider errors surface as [`OmnigateError::TaskExecution`] so the executor
/// can retry them.
#[async_trait]
pub trait AiProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, prompt: &str, options: &serde_json::Value)
        -> OmnigateResult<Completion>;

    async fn chat(
        &self,
        messages: &[ChatMessage],
        options: &serde_json::Value,
    ) -> OmnigateResult<Completion>;

    /// Lightweight liveness check.
    async fn health(&self) -> OmnigateResult<()> {
        Ok(())
    }
}

/// Provider that answers with its input. Used when no real provider is wired.
#[derive(Debug, Default, Clone)]
pub struct EchoProvider;

impl EchoProvider {
    pub fn new() -> Self {
        Self
    }

    fn usage(prompt: &str, content: &str) -> Usage {
        let prompt_tokens = prompt.split_whitespace().count() as u64;
        let completion_tokens = content.split_whitespace().count() as u64;
        Usage {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

#[async_trait]
impl AiProvider for EchoProvider {
    fn name(&self) -> &str {
        "echo"
    }

    async fn complete(
        &self,
        prompt: &str,
        _options: &serde_json::Value,
    ) -> OmnigateResult<Completion> {
        Ok(Completion {
            content: prompt.to_string(),
            usage: Self::usage(prompt, prompt),
        })
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        _options: &serde_json::Value,
    ) -> OmnigateResult<Completion> {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .ok_or_else(|| {
                OmnigateError::TaskExecution("chat requires at least one user message".into())
            })?;
        let prompt = messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        Ok(Completion {
            content: last_user.content.clone(),
            usage: Self::usage(&prompt, &last_user.content),
        })
    }
}
