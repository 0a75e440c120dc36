//! Builds the configured [`ChatClient`].

use std::sync::Arc;

use steward_config::AppConfig;
use steward_core::error::ProviderError;
use steward_core::provider::{ChatClient, ChatOptions};
use tracing::info;

use crate::anthropic::{self, AnthropicClient};
use crate::openai_compat::OpenAiCompatClient;
use crate::retry::RetryPolicy;

/// Build the chat client selected by `config.provider`.
///
/// `anthropic` uses the native Messages API; every other name is treated as
/// an OpenAI-compatible endpoint.
pub fn build_client(config: &AppConfig) -> Result<Arc<dyn ChatClient>, ProviderError> {
    let api_key = config.api_key.clone().unwrap_or_default();
    if api_key.is_empty() && !is_local(&config.provider) {
        return Err(ProviderError::NotConfigured(format!(
            "no API key for provider '{}'; set STEWARD_API_KEY or api_key in config.toml",
            config.provider
        )));
    }

    let options = ChatOptions {
        model: config.model.clone(),
        temperature: config.temperature,
        max_tokens: Some(config.max_tokens),
    };
    let retry = RetryPolicy::from_config(&config.http);
    let timeout = config.http.request_timeout();

    info!(
        provider = %config.provider,
        model = %config.model,
        max_attempts = retry.max_attempts,
        "Building chat client"
    );

    let client: Arc<dyn ChatClient> = if config.provider == "anthropic" {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| default_base_url("anthropic"));
        Arc::new(
            AnthropicClient::new(api_key, options)?
                .with_base_url(base_url)
                .with_timeout(timeout)
                .with_retry(retry),
        )
    } else {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| default_base_url(&config.provider));
        Arc::new(
            OpenAiCompatClient::new(&config.provider, base_url, api_key, options)?
                .with_timeout(timeout)
                .with_retry(retry),
        )
    };
    Ok(client)
}

/// Providers served from the local machine, which need no key.
fn is_local(provider: &str) -> bool {
    matches!(provider, "ollama" | "vllm" | "llamacpp" | "llama.cpp")
}

/// Get the default base URL for well-known providers.
pub fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "anthropic" => anthropic::DEFAULT_BASE_URL.into(),
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "openai" => "https://api.openai.com/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "deepseek" => "https://api.deepseek.com/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        "together" => "https://api.together.xyz/v1".into(),
        "fireworks" => "https://api.fireworks.ai/inference/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        "llamacpp" | "llama.cpp" => "http://localhost:8080/v1".into(),
        _ => "https://api.openai.com/v1".into(),
    }
}
