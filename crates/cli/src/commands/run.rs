//! `steward run`: run one task to completion.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use clap::Args;
use steward_agent::{EngineConfig, TaskEngine, TaskEvent, TaskOutcome};
use steward_config::AppConfig;
use steward_core::approval::{ApprovalPolicy, ApprovalRequest, ApprovalVerdict};
use steward_security::{AuditLogger, AuditOutcome, TracingSink};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// What the assistant should do
    pub task: String,

    /// Project context to send along with the task
    #[arg(long, conflicts_with = "context_file")]
    pub context: Option<String>,

    /// Read the project context from a file
    #[arg(long, value_name = "FILE")]
    pub context_file: Option<PathBuf>,

    /// Only allow these tools (comma-separated)
    #[arg(long, value_delimiter = ',', value_name = "NAMES")]
    pub tools: Option<Vec<String>>,

    /// Override the iteration budget
    #[arg(long, value_name = "N")]
    pub max_iterations: Option<u32>,

    /// Override safe mode: `--safe-mode` turns it on, `--safe-mode=false` off
    #[arg(
        long,
        value_name = "BOOL",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true"
    )]
    pub safe_mode: Option<bool>,

    /// Ask on the terminal before running mutating tools
    #[arg(long)]
    pub interactive_approval: bool,

    /// Write the finished transcript to this file as JSON
    #[arg(long, value_name = "FILE")]
    pub transcript_out: Option<PathBuf>,

    /// Override the workspace directory
    #[arg(long, value_name = "DIR")]
    pub workspace: Option<PathBuf>,

    /// Log full prompts and replies
    #[arg(long)]
    pub debug: bool,
}

pub async fn run(config_path: Option<&Path>, args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = super::load_config(config_path).map_err(|e| format!("Failed to load config: {e}"))?;
    if let Some(workspace) = &args.workspace {
        config.tools.workspace = Some(workspace.clone());
    }
    if args.debug {
        config.agent.debug = true;
    }
    tracing::debug!(
        provider = %config.provider,
        model = %config.model,
        workspace = %config.tools.workspace_dir().display(),
        "Loaded configuration"
    );

    let client = match steward_providers::build_client(&config) {
        Ok(client) => client,
        Err(e) => {
            print_key_help(&config);
            return Err(e.into());
        }
    };

    let audit = Arc::new(AuditLogger::with_sinks(vec![Box::new(TracingSink)]));
    let registry = steward_tools::default_registry_with_audit(&config.tools, Arc::clone(&audit))?;
    let engine = TaskEngine::new(client, Arc::new(registry), EngineConfig::from_config(&config.agent));

    let context = match &args.context_file {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("Failed to read context file {}: {e}", path.display()))?,
        None => args.context.clone().unwrap_or_default(),
    };

    let cancel = CancellationToken::new();
    let (tx, rx) = mpsc::unbounded_channel();

    let mut request = engine
        .request(args.task.clone())
        .with_context(context)
        .with_cancellation(cancel.clone())
        .with_events(tx)
        .with_audit(Arc::clone(&audit));
    if let Some(tools) = args.tools.clone() {
        request = request.with_allowed_tools(tools);
    }
    if let Some(max) = args.max_iterations {
        request = request.with_max_iterations(max);
    }
    if let Some(safe_mode) = args.safe_mode {
        request = request.with_safe_mode(safe_mode);
    }
    if args.interactive_approval {
        request = request.with_approval(Arc::new(TerminalApproval));
    }

    let ctrl_c = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\n  Cancelling after the current step...");
                cancel.cancel();
            }
        }
    });
    let printer = tokio::spawn(print_events(rx));

    let outcome = engine.run_task(request).await;
    ctrl_c.abort();
    // The request (and its sender) is gone, so the printer drains and exits.
    let _ = printer.await;

    if let Some(path) = &args.transcript_out {
        let json = serde_json::to_string_pretty(outcome.transcript())?;
        tokio::fs::write(path, json)
            .await
            .map_err(|e| format!("Failed to write transcript to {}: {e}", path.display()))?;
        eprintln!("  Transcript written to {}", path.display());
    }

    let denied = audit
        .entries()
        .iter()
        .filter(|e| e.outcome != AuditOutcome::Approved)
        .count();
    if denied > 0 {
        eprintln!("  {denied} tool call(s) were not approved");
    }

    match outcome {
        TaskOutcome::Completed { answer, .. } => {
            println!("{answer}");
            Ok(())
        }
        TaskOutcome::MaxIterationsExceeded { transcript } => Err(format!(
            "No final answer within the iteration budget ({} messages in transcript)",
            transcript.len()
        )
        .into()),
        TaskOutcome::Aborted { reason, .. } => Err(format!("Task aborted: {reason}").into()),
    }
}

fn print_key_help(config: &AppConfig) {
    eprintln!();
    eprintln!("  ERROR: No usable API key for provider `{}`.", config.provider);
    eprintln!();
    eprintln!("  Set one of these environment variables:");
    eprintln!("    STEWARD_API_KEY     (generic)");
    eprintln!("    ANTHROPIC_API_KEY   (for Anthropic)");
    eprintln!("    OPENAI_API_KEY      (for OpenAI)");
    eprintln!();
    eprintln!("  Or add `api_key` to your config file:");
    eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
    eprintln!();
}

async fn print_events(mut rx: mpsc::UnboundedReceiver<TaskEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            TaskEvent::RemoteCall { iteration } => eprintln!("  [{iteration}] thinking..."),
            TaskEvent::ToolCall { action, input, .. } => eprintln!("      -> {action} {input}"),
            TaskEvent::ToolResult {
                tool,
                success,
                elapsed_ms,
                ..
            } => {
                let mark = if success { "ok" } else { "failed" };
                eprintln!("      <- {tool} {mark} ({elapsed_ms} ms)");
            }
            TaskEvent::Rejected { action, reason } => eprintln!("      x  {action}: {reason}"),
            TaskEvent::Finished { outcome_kind, iterations } => {
                eprintln!("  {outcome_kind} after {iterations} iteration(s)");
            }
            TaskEvent::StateChanged { .. } | TaskEvent::Decision { .. } => {}
        }
    }
}

/// Asks on the terminal before running a mutating tool. Read-only tools
/// run without a prompt.
struct TerminalApproval;

#[async_trait]
impl ApprovalPolicy for TerminalApproval {
    async fn decide(&self, request: &ApprovalRequest<'_>) -> ApprovalVerdict {
        let input = request.input.clone();
        if request.capability.is_read_only() {
            return ApprovalVerdict::approve(input);
        }

        let prompt = format!(
            "\n  The assistant wants to run `{}` ({})\n    input:  {}\n    reason: {}\n  Allow? [y/N] ",
            request.action,
            request.capability,
            serde_json::Value::Object(input.clone()),
            request.reasoning,
        );
        let answer = tokio::task::spawn_blocking(move || ask(&prompt)).await;
        match answer {
            Ok(Some(true)) => ApprovalVerdict::approve(input),
            Ok(_) => ApprovalVerdict::reject(input, "the operator declined this call"),
            Err(e) => ApprovalVerdict::reject(input, format!("approval prompt failed: {e}")),
        }
    }
}

fn ask(prompt: &str) -> Option<bool> {
    let mut stderr = std::io::stderr();
    stderr.write_all(prompt.as_bytes()).ok()?;
    stderr.flush().ok()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line).ok()?;
    Some(matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}
