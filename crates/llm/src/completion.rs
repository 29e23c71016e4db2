//! Completion Client
//!
//! The text-in/text-out boundary the orchestrator talks to. Planner and step
//! executor only ever need `complete(prompt, system_prompt?)`, so they depend
//! on this trait instead of the richer `LlmProvider` surface; tests substitute
//! scripted implementations.

use std::sync::Arc;

use async_trait::async_trait;

use crate::provider::LlmProvider;
use crate::types::{LlmError, LlmRequestOptions, LlmResult, Message};

/// System prompt used when the caller does not supply one.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an AI assistant for IT support. You help with \
troubleshooting, incident management, and technical guidance. Provide clear, concise responses \
and step-by-step solutions when applicable.";

/// Asynchronous text completion.
///
/// Implementations may fail, and may return non-JSON text even when the
/// prompt asks for JSON; callers own the degrade paths.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, prompt: &str, system_prompt: Option<&str>) -> LlmResult<String>;

    /// Short label for logs and health output.
    fn describe(&self) -> String {
        "completion-client".to_string()
    }
}

/// `CompletionClient` backed by any `LlmProvider`.
pub struct ProviderCompletionClient {
    provider: Arc<dyn LlmProvider>,
    default_system_prompt: String,
}

impl ProviderCompletionClient {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            default_system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.default_system_prompt = system_prompt.into();
        self
    }

    pub fn provider(&self) -> &Arc<dyn LlmProvider> {
        &self.provider
    }
}

#[async_trait]
impl CompletionClient for ProviderCompletionClient {
    async fn complete(&self, prompt: &str, system_prompt: Option<&str>) -> LlmResult<String> {
        let system = system_prompt
            .unwrap_or(&self.default_system_prompt)
            .to_string();

        let response = self
            .provider
            .send_message(
                vec![Message::user(prompt)],
                Some(system),
                LlmRequestOptions::default(),
            )
            .await?;

        response.content.ok_or_else(|| LlmError::ParseError {
            message: format!("{} returned no text content", self.provider.name()),
        })
    }

    fn describe(&self) -> String {
        format!("{}/{}", self.provider.name(), self.provider.model())
    }
}
