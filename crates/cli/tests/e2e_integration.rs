//! End-to-end integration tests for the Steward task engine.
//!
//! These tests exercise the full pipeline from task to outcome: the HTTP
//! chat client, decision parsing, the approval gate, and the built-in
//! workspace tools running against a temporary directory.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use steward_agent::{EngineConfig, TaskEngine, TaskOutcome, TaskRequest};
use steward_config::ToolsConfig;
use steward_core::approval::ApprovalVerdict;
use steward_core::error::ProviderError;
use steward_core::message::{Role, Transcript};
use steward_core::provider::{ChatClient, ChatOptions};
use steward_providers::{OpenAiCompatClient, RetryPolicy};
use steward_security::{AuditLogger, AuditOutcome, CallbackPolicy};
use steward_tools::default_registry_with_audit;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ── Mock client ──────────────────────────────────────────────────────────

/// A chat client that replays scripted replies in sequence.
struct ScriptedClient {
    replies: Mutex<VecDeque<String>>,
    calls: Mutex<usize>,
}

impl ScriptedClient {
    fn new(replies: Vec<String>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: Mutex::new(0),
        }
    }

    fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait::async_trait]
impl ChatClient for ScriptedClient {
    fn name(&self) -> &str {
        "e2e_scripted"
    }

    async fn send(&self, _transcript: &Transcript, _system_prompt: &str) -> Result<String, ProviderError> {
        *self.calls.lock().unwrap() += 1;
        let reply = self.replies.lock().unwrap().pop_front();
        Ok(reply.expect("ScriptedClient exhausted"))
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────

fn decision(action: &str, input: serde_json::Value, status: &str) -> String {
    format!(
        "[DECISION]\nACTION: {action}\nINPUT: {input}\nREASONING: working on it\nSTATUS: {status}\n[/DECISION]"
    )
}

fn final_answer(answer: &str) -> String {
    format!("{answer}\n\n{}", decision("final_answer", json!({}), "done"))
}

fn completion(text: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-e2e",
        "choices": [{ "index": 0, "message": { "role": "assistant", "content": text } }]
    })
}

fn r_project() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("clean.R"), "x <- read.csv('data.csv')\n").unwrap();
    std::fs::write(dir.path().join("model.R"), "fit <- lm(y ~ x)\n").unwrap();
    std::fs::create_dir(dir.path().join("plots")).unwrap();
    std::fs::write(dir.path().join("plots").join("figures.R"), "plot(fit)\n").unwrap();
    std::fs::write(dir.path().join("README.md"), "# Analysis\n").unwrap();
    dir
}

fn tools_config(workspace: &Path) -> ToolsConfig {
    ToolsConfig {
        workspace: Some(workspace.to_path_buf()),
        allowed_roots: Vec::new(),
        forbidden_paths: Vec::new(),
    }
}

fn engine_for(client: Arc<dyn ChatClient>, workspace: &Path, audit: Arc<AuditLogger>) -> TaskEngine {
    let registry = default_registry_with_audit(&tools_config(workspace), audit).unwrap();
    TaskEngine::new(client, Arc::new(registry), EngineConfig::default())
}

fn fast_client(server: &MockServer) -> OpenAiCompatClient {
    OpenAiCompatClient::new("e2e", server.uri(), "sk-test", ChatOptions::new("test-model"))
        .unwrap()
        .with_retry(RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(10)))
}

// ── List files, then answer ──────────────────────────────────────────────

#[tokio::test]
async fn lists_r_files_over_http_then_answers() {
    let project = r_project();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(&decision(
            "list_files",
            json!({"pattern": "*.R"}),
            "continue",
        ))))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(completion(&final_answer("There are 3 R scripts."))),
        )
        .expect(1)
        .mount(&server)
        .await;

    let audit = Arc::new(AuditLogger::new());
    let engine = engine_for(Arc::new(fast_client(&server)), project.path(), audit.clone());
    let outcome = engine
        .run_task(TaskRequest::new("List the R files").with_audit(audit.clone()))
        .await;

    assert_eq!(outcome.answer(), Some("There are 3 R scripts."));
    let messages = outcome.transcript().messages();
    assert_eq!(messages.len(), 3);
    let listing = &messages[1];
    assert!(listing.is_executed_tool_result());
    assert!(listing.content.contains("clean.R"));
    assert!(listing.content.contains("plots/figures.R"));
    assert!(!listing.content.contains("README.md"));
    assert_eq!(audit.entries_by_outcome(&AuditOutcome::Approved).len(), 1);
}

// ── Malformed INPUT ──────────────────────────────────────────────────────

#[tokio::test]
async fn malformed_input_requests_reformat() {
    let project = r_project();
    let client = Arc::new(ScriptedClient::new(vec![
        "[DECISION]\nACTION: list_files\nINPUT: {\"pattern\": \"*.R\"\nREASONING: list\nSTATUS: continue\n[/DECISION]"
            .into(),
    ]));
    let engine = engine_for(client.clone(), project.path(), Arc::new(AuditLogger::new()));
    let outcome = engine
        .run_task(TaskRequest::new("List the R files").with_max_iterations(1))
        .await;

    assert!(matches!(outcome, TaskOutcome::MaxIterationsExceeded { .. }));
    assert_eq!(client.calls(), 1);
    let messages = outcome.transcript().messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].role, Role::User);
    assert!(messages[1].content.contains("INPUT is not valid JSON"));
    assert!(!messages.iter().any(|m| m.is_executed_tool_result()));
}

// ── Safe mode ───────────────────────────────────────────────────────────

#[tokio::test]
async fn safe_mode_blocks_write_file() {
    let project = r_project();
    let client = Arc::new(ScriptedClient::new(vec![
        decision(
            "write_file",
            json!({"path": "summary.txt", "content": "3 scripts"}),
            "continue",
        ),
        final_answer("I could not write the summary without approval."),
    ]));
    let audit = Arc::new(AuditLogger::new());
    let engine = engine_for(client, project.path(), audit.clone());
    let outcome = engine
        .run_task(TaskRequest::new("Write a summary").with_safe_mode(true).with_audit(audit.clone()))
        .await;

    assert!(outcome.is_completed());
    assert!(!project.path().join("summary.txt").exists());
    let rejection = &outcome.transcript().messages()[1];
    assert_eq!(rejection.role, Role::Tool);
    assert!(rejection.content.contains("requires approval"));
    assert_eq!(audit.entries_by_outcome(&AuditOutcome::RequiresApproval).len(), 1);
}

#[tokio::test]
async fn approved_write_lands_in_workspace() {
    let project = r_project();
    let client = Arc::new(ScriptedClient::new(vec![
        decision(
            "write_file",
            json!({"path": "out/summary.txt", "content": "3 scripts"}),
            "continue",
        ),
        final_answer("Summary written."),
    ]));
    let engine = engine_for(client, project.path(), Arc::new(AuditLogger::new()));
    let policy = CallbackPolicy::new(|_, input, _| ApprovalVerdict::approve(input.clone()));
    let outcome = engine
        .run_task(TaskRequest::new("Write a summary").with_approval(Arc::new(policy)))
        .await;

    assert!(outcome.is_completed());
    let written = std::fs::read_to_string(project.path().join("out").join("summary.txt")).unwrap();
    assert_eq!(written, "3 scripts");
}

// ── Transient failures are retried ───────────────────────────────────

#[tokio::test]
async fn retries_through_two_503s() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("third time lucky")))
        .expect(1)
        .mount(&server)
        .await;

    let mut transcript = Transcript::new();
    transcript.push(steward_core::message::Message::user("hello"));
    let reply = fast_client(&server).send(&transcript, "PROTOCOL").await.unwrap();
    assert_eq!(reply, "third time lucky");
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn exhausted_retries_abort_the_task() {
    let project = r_project();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let engine = engine_for(Arc::new(fast_client(&server)), project.path(), Arc::new(AuditLogger::new()));
    let outcome = engine.run_task(TaskRequest::new("anything")).await;
    match outcome {
        TaskOutcome::Aborted { transcript, .. } => assert_eq!(transcript.len(), 1),
        other => panic!("expected an aborted task, got {other:?}"),
    }
}

// ── Budget of one ───────────────────────────────────────────────────────────

#[tokio::test]
async fn single_iteration_budget_keeps_tool_result() {
    let project = r_project();
    let client = Arc::new(ScriptedClient::new(vec![decision(
        "read_file",
        json!({"path": "model.R"}),
        "continue",
    )]));
    let engine = engine_for(client.clone(), project.path(), Arc::new(AuditLogger::new()));
    let outcome = engine
        .run_task(TaskRequest::new("Explain model.R").with_max_iterations(1))
        .await;

    assert!(matches!(outcome, TaskOutcome::MaxIterationsExceeded { .. }));
    assert_eq!(client.calls(), 1);
    let transcript = outcome.transcript();
    assert_eq!(transcript.len(), 2);
    let result = &transcript.messages()[1].content;
    assert!(result.starts_with("Tool `read_file` {\"path\":\"model.R\"} succeeded"));
    assert!(result.contains("lm(y ~ x)"));
}

// ── Sandbox ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn traversal_outside_workspace_is_a_failed_result() {
    let project = r_project();
    let client = Arc::new(ScriptedClient::new(vec![
        decision("read_file", json!({"path": "../secrets.txt"}), "continue"),
        final_answer("Not allowed."),
    ]));
    let audit = Arc::new(AuditLogger::new());
    let engine = engine_for(client, project.path(), audit.clone());
    let outcome = engine.run_task(TaskRequest::new("Read secrets")).await;

    let result = &outcome.transcript().messages()[1];
    assert!(result.is_executed_tool_result());
    assert_eq!(result.metadata["success"], json!(false));
    assert_eq!(audit.entries_by_outcome(&AuditOutcome::Denied).len(), 1);
}
