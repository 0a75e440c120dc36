//! Tool trait and registry.
//!
//! Tools are what give the assistant the ability to act: list files,
//! read files, write files, describe the project, etc. Each tool declares
//! whether it only reads or also mutates state; the approval gate keys
//! its safe-mode policy off that declaration.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::error::ToolError;

/// Tool input: a JSON object mapping parameter names to values.
pub type ToolInput = serde_json::Map<String, serde_json::Value>;

/// Whether a tool only observes or also changes the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    ReadOnly,
    Mutating,
}

impl Capability {
    pub fn is_read_only(self) -> bool {
        matches!(self, Self::ReadOnly)
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ReadOnly => write!(f, "read-only"),
            Self::Mutating => write!(f, "mutating"),
        }
    }
}

/// A tool definition included in the system prompt so the assistant knows what it can call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,

    /// Read-only or mutating
    pub capability: Capability,
}

/// The outcome of one tool execution. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Name of the tool that ran
    pub tool: String,

    /// The input the tool ran with
    #[serde(default)]
    pub input: ToolInput,

    /// Whether the tool executed successfully
    pub success: bool,

    /// The output value, or an error description when `success` is false
    pub output: serde_json::Value,

    /// Wall-clock time spent in the tool
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,
}

impl ToolResult {
    pub fn success(tool: impl Into<String>, output: serde_json::Value, elapsed: Duration) -> Self {
        Self {
            tool: tool.into(),
            input: ToolInput::new(),
            success: true,
            output,
            elapsed,
        }
    }

    pub fn failure(tool: impl Into<String>, error: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            tool: tool.into(),
            input: ToolInput::new(),
            success: false,
            output: serde_json::Value::String(error.into()),
            elapsed,
        }
    }

    /// Record the input the call ran with.
    pub fn with_input(mut self, input: ToolInput) -> Self {
        self.input = input;
        self
    }

    /// Render the result as transcript text for the assistant.
    ///
    /// The header names the call (tool and input) so the assistant can match
    /// each result to the request that produced it.
    pub fn render(&self) -> String {
        let body = match &self.output {
            serde_json::Value::String(s) => s.clone(),
            other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
        };
        let call = describe_call(&self.tool, &self.input);
        let ms = self.elapsed.as_millis();
        if self.success {
            format!("Tool {call} succeeded ({ms} ms):\n{body}")
        } else {
            format!("Tool {call} failed ({ms} ms): {body}")
        }
    }
}

/// Compact label for a tool call: `` `name` `` followed by the input as
/// single-line JSON, or just the name when the input is empty.
pub fn describe_call(tool: &str, input: &ToolInput) -> String {
    if input.is_empty() {
        format!("`{tool}`")
    } else {
        format!("`{tool}` {}", serde_json::Value::Object(input.clone()))
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

/// The core Tool trait.
///
/// Each host capability implements this trait. Tools are registered in the
/// [`ToolRegistry`] once at engine construction.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "list_files", "write_file").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the assistant).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Whether this tool only reads or also mutates state.
    fn capability(&self) -> Capability;

    /// Execute the tool with the given input.
    async fn execute(&self, input: ToolInput) -> std::result::Result<serde_json::Value, ToolError>;

    /// Convert this tool into a ToolDefinition for the system prompt.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
            capability: self.capability(),
        }
    }
}

/// A registry of available tools.
///
/// Built once, then shared read-only (behind an `Arc`) by every task run.
#[derive(Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Fails if a tool with the same name is already present.
    pub fn register(&mut self, tool: Box<dyn Tool>) -> std::result::Result<(), ToolError> {
        self.register_arc(Arc::from(tool))
    }

    /// Register a shared tool.
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) -> std::result::Result<(), ToolError> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(ToolError::Duplicate(name));
        }
        self.tools.insert(name, tool);
        Ok(())
    }

    /// Look up a tool by name.
    pub fn lookup(&self, name: &str) -> std::result::Result<Arc<dyn Tool>, ToolError> {
        self.tools
            .get(name)
            .cloned()
            .ok_or_else(|| ToolError::NotFound(name.to_string()))
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// A registry restricted to the given names. Unknown names are skipped.
    pub fn allowed_subset<S: AsRef<str>>(&self, names: &[S]) -> ToolRegistry {
        let mut subset = ToolRegistry::new();
        for name in names {
            let name = name.as_ref();
            match self.tools.get(name) {
                Some(tool) => {
                    subset.tools.insert(name.to_string(), Arc::clone(tool));
                }
                None => warn!(tool = %name, "Allowed tool is not registered, ignoring"),
            }
        }
        subset
    }

    /// Get all tool definitions, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<_> = self.tools.values().map(|t| t.to_definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// List all registered tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}
