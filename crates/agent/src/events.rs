//! Task events: what a UI observes while a task runs.
//!
//! Events are delivered over an optional unbounded channel per run. A
//! dropped receiver never fails the run.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// The sending half a host passes in with a task.
pub type TaskEventSender = mpsc::UnboundedSender<TaskEvent>;

/// Lifecycle of one task run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Running,
    AwaitingApproval,
    Completed,
    MaxIterationsExceeded,
    Aborted,
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Running => "running",
            Self::AwaitingApproval => "awaiting_approval",
            Self::Completed => "completed",
            Self::MaxIterationsExceeded => "max_iterations_exceeded",
            Self::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// Events emitted by the engine during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskEvent {
    /// The run moved to a new state.
    StateChanged { state: TaskState },

    /// The engine is about to call the assistant (1-based iteration).
    RemoteCall { iteration: u32 },

    /// The reply was parsed (`tool_call`, `final_answer` or `unparseable`).
    Decision { kind: String },

    /// A tool call was proposed.
    ToolCall {
        action: String,
        input: serde_json::Value,
        reasoning: String,
    },

    /// A tool finished.
    ToolResult {
        tool: String,
        success: bool,
        output: serde_json::Value,
        elapsed_ms: u64,
    },

    /// A tool call was blocked before execution.
    Rejected { action: String, reason: String },

    /// The run ended.
    Finished { outcome_kind: TaskState, iterations: u32 },
}

impl TaskEvent {
    /// Event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::StateChanged { .. } => "state_changed",
            Self::RemoteCall { .. } => "remote_call",
            Self::Decision { .. } => "decision",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::Rejected { .. } => "rejected",
            Self::Finished { .. } => "finished",
        }
    }
}

/// Send `event` if anyone is listening.
pub(crate) fn emit(events: Option<&TaskEventSender>, event: TaskEvent) {
    if let Some(tx) = events {
        // A closed receiver only means nobody is watching.
        let _ = tx.send(event);
    }
}
