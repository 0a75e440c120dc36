//! Shared HTTP plumbing: status classification and transcript flattening.

use std::time::Duration;

use steward_core::error::ProviderError;
use steward_core::message::{Role, Transcript};
use tracing::warn;

use crate::retry::AttemptFailure;

/// Build the shared reqwest client.
pub(crate) fn build_http_client() -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .build()
        .map_err(|e| ProviderError::NotConfigured(format!("Failed to create HTTP client: {e}")))
}

/// Map a transport-level reqwest error.
pub(crate) fn map_send_error(err: reqwest::Error, timeout: Duration) -> AttemptFailure {
    if err.is_timeout() {
        ProviderError::Timeout(format!("no response within {}s", timeout.as_secs())).into()
    } else {
        ProviderError::Network(err.to_string()).into()
    }
}

/// Turn a non-success status into the matching error; pass successes through.
pub(crate) async fn check_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, AttemptFailure> {
    let status = response.status().as_u16();
    if response.status().is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs);

    let body = response.text().await.unwrap_or_default();

    if status == 401 || status == 403 {
        return Err(ProviderError::AuthError {
            status_code: status,
            message: if body.is_empty() {
                "Invalid API key or insufficient permissions".into()
            } else {
                body
            },
        }
        .into());
    }

    warn!(status, body = %body, "Provider returned error");
    Err(AttemptFailure {
        error: ProviderError::ApiError {
            status_code: status,
            message: body,
        },
        retry_after,
    })
}

/// Prefix used when a tool message is replayed to an API that only knows
/// user and assistant turns.
pub(crate) const TOOL_RESULT_PREFIX: &str = "Tool result:\n";

/// Flatten the transcript into `(role, content)` chat turns.
///
/// Tool messages become user turns. With `merge_consecutive`, adjacent turns
/// of the same role are joined, for APIs that require strict alternation.
pub(crate) fn chat_turns(transcript: &Transcript, merge_consecutive: bool) -> Vec<(&'static str, String)> {
    let mut turns: Vec<(&'static str, String)> = Vec::with_capacity(transcript.len());
    for message in transcript {
        let (role, content) = match message.role {
            Role::User => ("user", message.content.clone()),
            Role::Assistant => ("assistant", message.content.clone()),
            Role::Tool => ("user", format!("{TOOL_RESULT_PREFIX}{}", message.content)),
        };
        match turns.last_mut() {
            Some((last_role, last_content)) if merge_consecutive && *last_role == role => {
                last_content.push_str("\n\n");
                last_content.push_str(&content);
            }
            _ => turns.push((role, content)),
        }
    }
    turns
}
