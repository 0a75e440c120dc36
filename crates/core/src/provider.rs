//! The abstraction over the remote assistant.
//!
//! A client knows how to send a transcript plus the protocol system prompt
//! to a chat-completion endpoint and return the assistant's reply text.
//! Retry and timeout policy live inside implementations; callers see a
//! single request/response exchange.
//!
//! Implementations: OpenAI-compatible endpoints, Anthropic Messages API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::message::Transcript;

/// Sampling parameters shared by every client implementation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatOptions {
    /// The model identifier (e.g., "claude-sonnet-4-20250514", "gpt-4o")
    pub model: String,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

fn default_temperature() -> f32 {
    0.2
}

impl ChatOptions {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            temperature: default_temperature(),
            max_tokens: None,
        }
    }
}

/// The core ChatClient trait.
///
/// The task loop calls `send()` once per iteration without knowing which
/// backend is in use.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// A human-readable name for this client (e.g., "anthropic", "openrouter").
    fn name(&self) -> &str;

    /// Send the transcript and return the assistant's reply text.
    async fn send(
        &self,
        transcript: &Transcript,
        system_prompt: &str,
    ) -> std::result::Result<String, ProviderError>;
}
