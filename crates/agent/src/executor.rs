//! Runs one approved tool call and captures the outcome.
//!
//! Every failure mode (unknown tool, bad input, tool error, timeout, panic)
//! becomes a failed [`ToolResult`] so the assistant can see it and react.
//! Calls are never retried.

use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use steward_core::error::ToolError;
use steward_core::tool::{ToolInput, ToolRegistry, ToolResult};
use tracing::{debug, warn};

use crate::parser::json_type_name;

/// Default per-call time limit.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(60);

pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `action` with `input`. Always returns a result, never an error.
    ///
    /// The result records the input it ran with.
    pub async fn execute(&self, action: &str, input: ToolInput) -> ToolResult {
        let recorded = input.clone();
        self.run(action, input).await.with_input(recorded)
    }

    async fn run(&self, action: &str, input: ToolInput) -> ToolResult {
        let start = Instant::now();

        let tool = match self.registry.lookup(action) {
            Ok(tool) => tool,
            Err(e) => return ToolResult::failure(action, e.to_string(), start.elapsed()),
        };

        if let Err(e) = validate_input(action, &tool.parameters_schema(), &input) {
            debug!(tool = action, error = %e, "Rejected tool input");
            return ToolResult::failure(action, e.to_string(), start.elapsed());
        }

        let mut handle = tokio::spawn(async move { tool.execute(input).await });
        let outcome = match tokio::time::timeout(self.timeout, &mut handle).await {
            Ok(Ok(Ok(output))) => Ok(output),
            Ok(Ok(Err(e))) => Err(e.to_string()),
            Ok(Err(join_err)) if join_err.is_panic() => Err(format!(
                "Tool `{action}` panicked: {}",
                panic_message(join_err.into_panic())
            )),
            Ok(Err(join_err)) => Err(format!("Tool `{action}` was cancelled: {join_err}")),
            Err(_) => {
                handle.abort();
                Err(ToolError::Timeout {
                    tool_name: action.to_string(),
                    timeout_secs: self.timeout.as_secs(),
                }
                .to_string())
            }
        };

        let elapsed = start.elapsed();
        match outcome {
            Ok(output) => {
                debug!(tool = action, elapsed_ms = elapsed.as_millis() as u64, "Tool succeeded");
                ToolResult::success(action, output, elapsed)
            }
            Err(error) => {
                warn!(tool = action, elapsed_ms = elapsed.as_millis() as u64, error = %error, "Tool failed");
                ToolResult::failure(action, error, elapsed)
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".into()
    }
}

/// Check required parameters and declared types. Extra keys are ignored.
pub fn validate_input(tool_name: &str, schema: &Value, input: &ToolInput) -> Result<(), ToolError> {
    let invalid = |reason: String| ToolError::InvalidInput {
        tool_name: tool_name.to_string(),
        reason,
    };

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for name in required.iter().filter_map(Value::as_str) {
            if !input.contains_key(name) {
                return Err(invalid(format!("missing required parameter '{name}'")));
            }
        }
    }

    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return Ok(());
    };
    for (name, value) in input {
        let Some(expected) = properties
            .get(name)
            .and_then(|p| p.get("type"))
            .and_then(Value::as_str)
        else {
            continue;
        };
        if !matches_type(expected, value) {
            return Err(invalid(format!(
                "parameter '{name}' must be {expected}, got {}",
                json_type_name(value)
            )));
        }
    }
    Ok(())
}

fn matches_type(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        _ => true,
    }
}
