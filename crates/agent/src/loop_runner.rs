//! The task loop.
//!
//! Each iteration makes one call to the assistant and appends exactly one
//! message to the transcript: a tool result, a rejection, a reformat
//! request, or the final answer. The loop ends on a final answer, when the
//! iteration budget runs out, on a fatal transport/auth failure, or when
//! the host cancels.

use std::sync::Arc;
use std::time::{Duration, Instant};

use steward_config::AgentConfig;
use steward_core::approval::{ApprovalPolicy, ApprovalRequest};
use steward_core::message::{Message, Transcript};
use steward_core::provider::ChatClient;
use steward_core::tool::ToolRegistry;
use steward_security::{ApprovalGate, AuditLogger};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::events::{TaskEvent, TaskEventSender, TaskState, emit};
use crate::executor::{DEFAULT_TOOL_TIMEOUT, ToolExecutor};
use crate::parser::{DecisionParser, DecisionSource, ToolDecision};
use crate::prompt;

/// Default iteration budget per run.
pub const DEFAULT_MAX_ITERATIONS: u32 = 20;

/// Engine-wide settings, fixed at construction.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Budget for requests that don't set one
    pub max_iterations: u32,
    /// Safe mode for requests that don't set it
    pub safe_mode: bool,
    pub tool_timeout: Duration,
    /// Bound on each approval decision; `None` waits indefinitely
    pub approval_timeout: Option<Duration>,
    /// Log full prompts and replies at debug level
    pub debug: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            safe_mode: true,
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
            approval_timeout: None,
            debug: false,
        }
    }
}

impl EngineConfig {
    pub fn from_config(agent: &AgentConfig) -> Self {
        Self {
            max_iterations: agent.max_iterations,
            safe_mode: agent.safe_mode,
            tool_timeout: agent.tool_timeout(),
            approval_timeout: agent.approval_timeout(),
            debug: agent.debug,
        }
    }
}

/// One task for the engine to run.
pub struct TaskRequest {
    pub task: String,
    /// Opaque project context, sent once with the task
    pub context: String,
    /// Restrict the run to these tools (`None` = every registered tool)
    pub allowed_tools: Option<Vec<String>>,
    pub max_iterations: u32,
    pub safe_mode: bool,
    /// Host approval policy; overrides safe mode when present
    pub approval: Option<Arc<dyn ApprovalPolicy>>,
    pub cancel: CancellationToken,
    pub events: Option<TaskEventSender>,
    /// Shared audit log for approval verdicts
    pub audit: Option<Arc<AuditLogger>>,
}

impl std::fmt::Debug for TaskRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRequest")
            .field("task", &self.task)
            .field("context_len", &self.context.len())
            .field("allowed_tools", &self.allowed_tools)
            .field("max_iterations", &self.max_iterations)
            .field("safe_mode", &self.safe_mode)
            .field("has_approval", &self.approval.is_some())
            .finish_non_exhaustive()
    }
}

impl TaskRequest {
    /// A request with the default budget and safe mode on.
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            context: String::new(),
            allowed_tools: None,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            safe_mode: true,
            approval: None,
            cancel: CancellationToken::new(),
            events: None,
            audit: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    pub fn with_allowed_tools<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_tools = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_safe_mode(mut self, enabled: bool) -> Self {
        self.safe_mode = enabled;
        self
    }

    pub fn with_approval(mut self, policy: Arc<dyn ApprovalPolicy>) -> Self {
        self.approval = Some(policy);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_events(mut self, events: TaskEventSender) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_audit(mut self, audit: Arc<AuditLogger>) -> Self {
        self.audit = Some(audit);
        self
    }
}

/// Why a run was aborted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// The assistant could not be reached (retries exhausted or fatal API error)
    Transport(String),
    /// The API rejected the credentials
    Authentication(String),
    /// The host cancelled the run
    Cancelled,
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(msg) => write!(f, "transport failure: {msg}"),
            Self::Authentication(msg) => write!(f, "authentication failed: {msg}"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// How a run ended. Every variant carries the full transcript.
#[derive(Debug, Clone)]
pub enum TaskOutcome {
    Completed { answer: String, transcript: Transcript },
    MaxIterationsExceeded { transcript: Transcript },
    Aborted { reason: AbortReason, transcript: Transcript },
}

impl TaskOutcome {
    pub fn transcript(&self) -> &Transcript {
        match self {
            Self::Completed { transcript, .. }
            | Self::MaxIterationsExceeded { transcript }
            | Self::Aborted { transcript, .. } => transcript,
        }
    }

    pub fn into_transcript(self) -> Transcript {
        match self {
            Self::Completed { transcript, .. }
            | Self::MaxIterationsExceeded { transcript }
            | Self::Aborted { transcript, .. } => transcript,
        }
    }

    pub fn answer(&self) -> Option<&str> {
        match self {
            Self::Completed { answer, .. } => Some(answer),
            _ => None,
        }
    }

    pub fn state(&self) -> TaskState {
        match self {
            Self::Completed { .. } => TaskState::Completed,
            Self::MaxIterationsExceeded { .. } => TaskState::MaxIterationsExceeded,
            Self::Aborted { .. } => TaskState::Aborted,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// Runs tasks against one assistant and one tool registry.
///
/// The engine holds no per-run state, so independent runs may share it.
pub struct TaskEngine {
    client: Arc<dyn ChatClient>,
    registry: Arc<ToolRegistry>,
    parser: DecisionParser,
    config: EngineConfig,
}

impl TaskEngine {
    pub fn new(client: Arc<dyn ChatClient>, registry: Arc<ToolRegistry>, config: EngineConfig) -> Self {
        Self {
            client,
            registry,
            parser: DecisionParser::new(),
            config,
        }
    }

    /// Replace the decision parser (e.g. to drop the lenient JSON stage).
    pub fn with_parser(mut self, parser: DecisionParser) -> Self {
        self.parser = parser;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// A request seeded with this engine's default budget and safe mode.
    pub fn request(&self, task: impl Into<String>) -> TaskRequest {
        TaskRequest::new(task)
            .with_max_iterations(self.config.max_iterations)
            .with_safe_mode(self.config.safe_mode)
    }

    /// Run a task from scratch.
    pub async fn run_task(&self, request: TaskRequest) -> TaskOutcome {
        let mut transcript = Transcript::new();
        transcript.push(Message::user(prompt::task_message(&request.task, &request.context)));
        self.drive(transcript, request).await
    }

    /// Continue a prior transcript with a fresh iteration budget.
    ///
    /// A non-empty `request.task` is appended as a follow-up user message;
    /// `request.context` is ignored since it was sent with the original task.
    pub async fn resume(&self, mut transcript: Transcript, request: TaskRequest) -> TaskOutcome {
        if !request.task.trim().is_empty() {
            transcript.push(Message::user(request.task.clone()));
        }
        self.drive(transcript, request).await
    }

    async fn drive(&self, mut transcript: Transcript, request: TaskRequest) -> TaskOutcome {
        let started = Instant::now();
        let events = request.events.as_ref();
        let max_iterations = if request.max_iterations == 0 {
            warn!("max_iterations was 0; running a single iteration");
            1
        } else {
            request.max_iterations
        };

        let registry = match &request.allowed_tools {
            Some(names) => Arc::new(self.registry.allowed_subset(names)),
            None => Arc::clone(&self.registry),
        };
        let allowed_names: Vec<String> = registry.names().into_iter().map(String::from).collect();
        let system_prompt = prompt::build_system_prompt(&registry.definitions());
        let executor = ToolExecutor::new(Arc::clone(&registry), self.config.tool_timeout);
        let mut gate = ApprovalGate::new(request.safe_mode, request.approval.clone())
            .with_timeout(self.config.approval_timeout);
        if let Some(audit) = &request.audit {
            gate = gate.with_audit(Arc::clone(audit));
        }

        info!(
            task_id = %transcript.id,
            client = self.client.name(),
            tools = ?allowed_names,
            max_iterations,
            safe_mode = request.safe_mode,
            approver = gate.actor(),
            "Starting task"
        );
        if self.config.debug {
            debug!(task_id = %transcript.id, prompt = %system_prompt, "System prompt");
        }
        emit(events, TaskEvent::StateChanged { state: TaskState::Running });

        let mut iteration: u32 = 0;
        let outcome = loop {
            if request.cancel.is_cancelled() {
                info!(task_id = %transcript.id, iteration, "Task cancelled");
                break TaskOutcome::Aborted {
                    reason: AbortReason::Cancelled,
                    transcript,
                };
            }
            if iteration >= max_iterations {
                warn!(task_id = %transcript.id, iterations = iteration, "Max iterations reached");
                break TaskOutcome::MaxIterationsExceeded { transcript };
            }
            iteration += 1;

            debug!(task_id = %transcript.id, iteration, messages = transcript.len(), "Task loop iteration");
            emit(events, TaskEvent::RemoteCall { iteration });

            let reply = match self.client.send(&transcript, &system_prompt).await {
                Ok(reply) => reply,
                Err(e) => {
                    warn!(task_id = %transcript.id, iteration, error = %e, "Assistant call failed");
                    let reason = if e.is_auth() {
                        AbortReason::Authentication(e.to_string())
                    } else {
                        AbortReason::Transport(e.to_string())
                    };
                    break TaskOutcome::Aborted { reason, transcript };
                }
            };
            if self.config.debug {
                debug!(task_id = %transcript.id, iteration, reply = %reply, "Assistant reply");
            }

            let decision = self.parser.parse(&reply);
            emit(events, TaskEvent::Decision { kind: decision.kind().into() });

            match decision {
                ToolDecision::Unparseable { reason, .. } => {
                    debug!(task_id = %transcript.id, iteration, reason = %reason, "Unparseable reply");
                    transcript.push(Message::user(prompt::reformat_request(&reason)));
                }
                ToolDecision::FinalAnswer { text } => {
                    transcript.push(Message::assistant(text.clone()));
                    break TaskOutcome::Completed {
                        answer: text,
                        transcript,
                    };
                }
                ToolDecision::ToolCall {
                    action,
                    input,
                    reasoning,
                    source,
                } => {
                    if source == DecisionSource::Inferred {
                        warn!(task_id = %transcript.id, action = %action, "Tool call inferred from unstructured reply");
                    }
                    emit(
                        events,
                        TaskEvent::ToolCall {
                            action: action.clone(),
                            input: serde_json::Value::Object(input.clone()),
                            reasoning: reasoning.clone(),
                        },
                    );

                    let tool = match registry.lookup(&action) {
                        Ok(tool) => tool,
                        Err(_) => {
                            let names: Vec<&str> = allowed_names.iter().map(String::as_str).collect();
                            let message = prompt::tool_not_allowed(&action, &input, &names);
                            info!(task_id = %transcript.id, action = %action, "Tool not allowed");
                            emit(
                                events,
                                TaskEvent::Rejected {
                                    action: action.clone(),
                                    reason: message.clone(),
                                },
                            );
                            transcript.push(Message::tool(&action, message));
                            continue;
                        }
                    };

                    emit(events, TaskEvent::StateChanged { state: TaskState::AwaitingApproval });
                    let verdict = gate
                        .review(&ApprovalRequest {
                            action: &action,
                            input: &input,
                            reasoning: &reasoning,
                            capability: tool.capability(),
                        })
                        .await;
                    emit(events, TaskEvent::StateChanged { state: TaskState::Running });

                    if !verdict.approved() {
                        let reason = verdict.reason_or_default().to_string();
                        info!(
                            task_id = %transcript.id,
                            action = %action,
                            status = ?verdict.status,
                            "Tool call not approved"
                        );
                        emit(
                            events,
                            TaskEvent::Rejected {
                                action: action.clone(),
                                reason: reason.clone(),
                            },
                        );
                        transcript.push(Message::tool(&action, prompt::rejection(&action, &input, &reason)));
                        continue;
                    }

                    let result = executor.execute(&action, verdict.input).await;
                    info!(
                        task_id = %transcript.id,
                        iteration,
                        tool = %action,
                        success = result.success,
                        elapsed_ms = result.elapsed.as_millis() as u64,
                        "Tool executed"
                    );
                    emit(
                        events,
                        TaskEvent::ToolResult {
                            tool: result.tool.clone(),
                            success: result.success,
                            output: result.output.clone(),
                            elapsed_ms: result.elapsed.as_millis() as u64,
                        },
                    );
                    transcript.push(Message::tool_result(&result));
                }
            }
        };

        let state = outcome.state();
        info!(
            task_id = %outcome.transcript().id,
            outcome = %state,
            iterations = iteration,
            messages = outcome.transcript().len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Task finished"
        );
        emit(events, TaskEvent::StateChanged { state });
        emit(
            events,
            TaskEvent::Finished {
                outcome_kind: state,
                iterations: iteration,
            },
        );
        outcome
    }
}
