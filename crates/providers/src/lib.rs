//! Remote chat clients for Steward.
//!
//! All clients implement the `steward_core::ChatClient` trait. Each one
//! retries transient failures (429, 503, 504, timeouts) with bounded
//! exponential backoff and never retries authentication failures.

pub mod anthropic;
pub mod factory;
mod http;
pub mod openai_compat;
pub mod retry;

pub use anthropic::AnthropicClient;
pub use factory::{build_client, default_base_url};
pub use openai_compat::OpenAiCompatClient;
pub use retry::{AttemptFailure, RetryPolicy};
