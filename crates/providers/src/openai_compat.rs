//! OpenAI-compatible chat client.
//!
//! Works with: OpenAI, OpenRouter, Ollama, vLLM, Together AI, Groq, and any
//! endpoint exposing `/chat/completions`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use steward_core::error::ProviderError;
use steward_core::message::Transcript;
use steward_core::provider::{ChatClient, ChatOptions};
use tracing::{debug, trace};

use crate::http::{build_http_client, chat_turns, check_status, map_send_error};
use crate::retry::{AttemptFailure, RetryPolicy};

/// An OpenAI-compatible chat client.
pub struct OpenAiCompatClient {
    name: String,
    base_url: String,
    api_key: String,
    options: ChatOptions,
    timeout: Duration,
    retry: RetryPolicy,
    client: reqwest::Client,
}

impl OpenAiCompatClient {
    /// Create a new OpenAI-compatible client.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        options: ChatOptions,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            options,
            timeout: Duration::from_secs(120),
            retry: RetryPolicy::default(),
            client: build_http_client()?,
        })
    }

    /// Create an OpenRouter client (convenience constructor).
    pub fn openrouter(api_key: impl Into<String>, options: ChatOptions) -> Result<Self, ProviderError> {
        Self::new("openrouter", "https://openrouter.ai/api/v1", api_key, options)
    }

    /// Create an OpenAI client (convenience constructor).
    pub fn openai(api_key: impl Into<String>, options: ChatOptions) -> Result<Self, ProviderError> {
        Self::new("openai", "https://api.openai.com/v1", api_key, options)
    }

    /// Set the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn request_body(&self, transcript: &Transcript, system_prompt: &str) -> serde_json::Value {
        let mut messages = vec![ApiMessage {
            role: "system",
            content: system_prompt.to_string(),
        }];
        messages.extend(
            chat_turns(transcript, false)
                .into_iter()
                .map(|(role, content)| ApiMessage { role, content }),
        );

        let mut body = serde_json::json!({
            "model": self.options.model,
            "messages": messages,
            "temperature": self.options.temperature,
            "stream": false,
        });
        if let Some(max_tokens) = self.options.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }
        body
    }

    async fn attempt(&self, url: &str, body: &serde_json::Value) -> Result<String, AttemptFailure> {
        let response = self
            .client
            .post(url)
            .timeout(self.timeout)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| map_send_error(e, self.timeout))?;

        let response = check_status(response).await?;

        let api_response: ApiResponse = response.json().await.map_err(|e| {
            AttemptFailure::from(ProviderError::InvalidResponse(format!(
                "Failed to parse response: {e}"
            )))
        })?;

        let choice = api_response.choices.into_iter().next().ok_or_else(|| {
            AttemptFailure::from(ProviderError::InvalidResponse(
                "No choices in response".into(),
            ))
        })?;

        Ok(choice.message.content.unwrap_or_default())
    }
}

#[async_trait]
impl ChatClient for OpenAiCompatClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(
        &self,
        transcript: &Transcript,
        system_prompt: &str,
    ) -> std::result::Result<String, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.request_body(transcript, system_prompt);

        debug!(
            client = %self.name,
            model = %self.options.model,
            messages = transcript.len(),
            "Sending chat completion request"
        );
        trace!(body = %body, "Request body");

        self.retry
            .run(&self.name, |_| self.attempt(&url, &body))
            .await
    }
}

// ── OpenAI API types ────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use steward_core::message::Message;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn completion(text: &str) -> serde_json::Value {
        serde_json::json!({
            "id": "chatcmpl-1",
            "model": "test-model",
            "choices": [{ "index": 0, "message": { "role": "assistant", "content": text } }]
        })
    }

    fn client_for(server: &MockServer) -> OpenAiCompatClient {
        OpenAiCompatClient::new("test", server.uri(), "sk-test", ChatOptions::new("test-model"))
            .unwrap()
            .with_retry(RetryPolicy::new(
                3,
                Duration::from_millis(1),
                Duration::from_millis(10),
            ))
    }

    fn transcript() -> Transcript {
        let mut t = Transcript::new();
        t.push(Message::user("list R files"));
        t
    }

    #[test]
    fn request_body_starts_with_system_prompt() {
        let client = OpenAiCompatClient::openai("sk", ChatOptions::new("gpt-4o")).unwrap();
        let body = client.request_body(&transcript(), "PROTOCOL");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], "PROTOCOL");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["model"], "gpt-4o");
        assert!(body.get("max_tokens").is_none());
    }

    #[tokio::test]
    async fn retries_unavailable_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("third time")))
            .mount(&server)
            .await;

        let reply = client_for(&server).send(&transcript(), "sys").await.unwrap();
        assert_eq!(reply, "third time");
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn rate_limit_exhaustion_surfaces_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let err = client_for(&server).send(&transcript(), "sys").await.unwrap_err();
        assert!(matches!(err, ProviderError::ApiError { status_code: 429, .. }));
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn auth_failure_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = client_for(&server).send(&transcript(), "sys").await.unwrap_err();
        assert!(matches!(err, ProviderError::AuthError { status_code: 401, .. }));
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn server_error_fails_immediately() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let err = client_for(&server).send(&transcript(), "sys").await.unwrap_err();
        assert!(matches!(
            err,
            ProviderError::ApiError { status_code: 500, ref message } if message == "boom"
        ));
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn slow_responses_time_out_and_retry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(completion("late"))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let err = client_for(&server)
            .with_timeout(Duration::from_millis(50))
            .send(&transcript(), "sys")
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Timeout(_)));
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn missing_choices_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})))
            .mount(&server)
            .await;

        let err = client_for(&server).send(&transcript(), "sys").await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse(_)));
    }
}
