//! Shared test helpers for engine tests.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;

use steward_core::error::ProviderError;
use steward_core::message::Transcript;
use steward_core::provider::ChatClient;

/// A chat client that replays a scripted sequence of replies.
///
/// Panics if more calls are made than replies provided.
pub struct ScriptedClient {
    replies: Mutex<VecDeque<Result<String, ProviderError>>>,
    calls: Mutex<usize>,
    last_system_prompt: Mutex<Option<String>>,
}

impl ScriptedClient {
    pub fn new(replies: Vec<String>) -> Self {
        Self::with_results(replies.into_iter().map(Ok).collect())
    }

    pub fn with_results(replies: Vec<Result<String, ProviderError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: Mutex::new(0),
            last_system_prompt: Mutex::new(None),
        }
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }

    pub fn last_system_prompt(&self) -> Option<String> {
        self.last_system_prompt.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ChatClient for ScriptedClient {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn send(&self, _transcript: &Transcript, system_prompt: &str) -> Result<String, ProviderError> {
        *self.calls.lock().unwrap() += 1;
        *self.last_system_prompt.lock().unwrap() = Some(system_prompt.to_string());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("ScriptedClient: no more replies (call #{})", self.call_count()))
    }
}

/// A client whose first call fails with `error`.
pub fn failing_client(error: ProviderError) -> Arc<ScriptedClient> {
    Arc::new(ScriptedClient::with_results(vec![Err(error)]))
}

/// A reply containing one tool-call decision block.
pub fn block(action: &str, input: serde_json::Value) -> String {
    format!(
        "[DECISION]\nACTION: {action}\nINPUT: {input}\nREASONING: next step\nSTATUS: continue\n[/DECISION]"
    )
}

/// A reply that finishes the task with `answer`.
pub fn done(answer: &str) -> String {
    format!("{answer}\n\n[DECISION]\nACTION: final_answer\nINPUT: {{}}\nREASONING: task complete\nSTATUS: done\n[/DECISION]")
}
