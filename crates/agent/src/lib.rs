//! The Steward task loop.
//!
//! A run follows an **Ask → Decide → Gate → Act** cycle:
//!
//! 1. **Ask** the assistant for its next step, sending the transcript so far
//! 2. **Decide** what the reply means: a tool call, a final answer, or noise
//! 3. **Gate** tool calls through the approval policy
//! 4. **Act** on approved calls and append the result to the transcript
//!
//! The loop continues until the assistant gives a final answer, the
//! iteration budget runs out, the host cancels, or the assistant becomes
//! unreachable.

pub mod events;
pub mod executor;
pub mod loop_runner;
pub mod parser;
pub mod prompt;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use events::{TaskEvent, TaskEventSender, TaskState};
pub use executor::{DEFAULT_TOOL_TIMEOUT, ToolExecutor, validate_input};
pub use loop_runner::{
    AbortReason, DEFAULT_MAX_ITERATIONS, EngineConfig, TaskEngine, TaskOutcome, TaskRequest,
};
pub use parser::{
    DecisionParser, DecisionSource, DecisionStage, DelimitedBlockStage, FINAL_ANSWER_ACTION,
    JsonScanStage, ToolDecision,
};
