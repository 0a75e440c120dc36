//! Anthropic native chat client.
//!
//! Uses Anthropic's Messages API directly (not OpenAI-compatible proxy).
//!
//! - `x-api-key` header authentication (not Bearer)
//! - `anthropic-version` header
//! - System prompt as top-level field
//! - Strict user/assistant alternation, so consecutive turns are merged

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use steward_core::error::ProviderError;
use steward_core::message::Transcript;
use steward_core::provider::{ChatClient, ChatOptions};
use tracing::{debug, trace};

use crate::http::{build_http_client, chat_turns, check_status, map_send_error};
use crate::retry::{AttemptFailure, RetryPolicy};

const ANTHROPIC_VERSION: &str = "2023-06-01";
pub(crate) const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Anthropic native Messages API client.
pub struct AnthropicClient {
    name: String,
    base_url: String,
    api_key: String,
    options: ChatOptions,
    timeout: Duration,
    retry: RetryPolicy,
    client: reqwest::Client,
}

impl AnthropicClient {
    /// Create a new Anthropic client.
    pub fn new(api_key: impl Into<String>, options: ChatOptions) -> Result<Self, ProviderError> {
        Ok(Self {
            name: "anthropic".into(),
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            options,
            timeout: Duration::from_secs(120),
            retry: RetryPolicy::default(),
            client: build_http_client()?,
        })
    }

    /// Create with a custom base URL (e.g., for testing or proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn request_body(&self, transcript: &Transcript, system_prompt: &str) -> serde_json::Value {
        let messages: Vec<AnthropicMessage> = chat_turns(transcript, true)
            .into_iter()
            .map(|(role, content)| AnthropicMessage { role, content })
            .collect();

        let mut body = serde_json::json!({
            "model": self.options.model,
            "messages": messages,
            "max_tokens": self.options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "temperature": self.options.temperature,
        });
        if !system_prompt.is_empty() {
            body["system"] = serde_json::json!(system_prompt);
        }
        body
    }

    async fn attempt(&self, url: &str, body: &serde_json::Value) -> Result<String, AttemptFailure> {
        let response = self
            .client
            .post(url)
            .timeout(self.timeout)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| map_send_error(e, self.timeout))?;

        let response = check_status(response).await?;

        let api_resp: AnthropicResponse = response.json().await.map_err(|e| {
            AttemptFailure::from(ProviderError::InvalidResponse(format!(
                "Failed to parse Anthropic response: {e}"
            )))
        })?;

        let text: Vec<String> = api_resp
            .content
            .into_iter()
            .filter_map(|block| match block {
                ResponseBlock::Text { text } => Some(text),
                ResponseBlock::Other => None,
            })
            .collect();

        if text.is_empty() {
            return Err(ProviderError::InvalidResponse("No text content in response".into()).into());
        }
        Ok(text.join(""))
    }
}

#[async_trait]
impl ChatClient for AnthropicClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(
        &self,
        transcript: &Transcript,
        system_prompt: &str,
    ) -> std::result::Result<String, ProviderError> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = self.request_body(transcript, system_prompt);

        debug!(client = "anthropic", model = %self.options.model, "Sending messages request");
        trace!(body = %body, "Request body");

        self.retry
            .run(&self.name, |_| self.attempt(&url, &body))
            .await
    }
}

// ── Anthropic API types ─────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ResponseBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[cfg(test)]
mod tests {
    use super::*;
    use steward_core::message::Message;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> AnthropicClient {
        AnthropicClient::new("ak-test", ChatOptions::new("claude-test"))
            .unwrap()
            .with_base_url(server.uri())
            .with_retry(RetryPolicy::new(
                3,
                Duration::from_millis(1),
                Duration::from_millis(10),
            ))
    }

    fn transcript() -> Transcript {
        let mut t = Transcript::new();
        t.push(Message::user("summarize"));
        t.push(Message::tool("read_file", "contents"));
        t
    }

    #[test]
    fn system_prompt_is_top_level_and_turns_merge() {
        let client = AnthropicClient::new("ak", ChatOptions::new("claude-test")).unwrap();
        let body = client.request_body(&transcript(), "PROTOCOL");
        assert_eq!(body["system"], "PROTOCOL");
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(body["max_tokens"], 4096);
    }

    #[tokio::test]
    async fn joins_text_blocks() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "ak-test"))
            .and(header("anthropic-version", ANTHROPIC_VERSION))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "msg_1",
                "content": [
                    { "type": "text", "text": "Hello, " },
                    { "type": "thinking", "thinking": "..." },
                    { "type": "text", "text": "world" }
                ]
            })))
            .mount(&server)
            .await;

        let reply = client_for(&server).send(&transcript(), "sys").await.unwrap();
        assert_eq!(reply, "Hello, world");
    }

    #[tokio::test]
    async fn overloaded_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(504))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": [{ "type": "text", "text": "ok" }]
            })))
            .mount(&server)
            .await;

        let reply = client_for(&server).send(&transcript(), "sys").await.unwrap();
        assert_eq!(reply, "ok");
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn forbidden_is_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let err = client_for(&server).send(&transcript(), "sys").await.unwrap_err();
        assert!(err.is_auth());
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }
}
