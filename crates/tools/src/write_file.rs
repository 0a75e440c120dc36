//! Write file tool.

use async_trait::async_trait;
use serde_json::{Value, json};
use steward_core::error::ToolError;
use steward_core::tool::{Capability, Tool, ToolInput};

use crate::sandbox::{Sandbox, required_str};

const NAME: &str = "write_file";

pub struct WriteFileTool {
    sandbox: Sandbox,
}

impl WriteFileTool {
    pub fn new(sandbox: Sandbox) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Write content to a file in the workspace. Creates the file and any missing \
         parent directories; overwrites the file if it exists."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The file path to write to, relative to the workspace"
                },
                "content": {
                    "type": "string",
                    "description": "The content to write"
                }
            },
            "required": ["path", "content"]
        })
    }

    fn capability(&self) -> Capability {
        Capability::Mutating
    }

    async fn execute(&self, input: ToolInput) -> Result<Value, ToolError> {
        let raw = required_str(NAME, &input, "path")?;
        let content = required_str(NAME, &input, "content")?;
        let path = self.sandbox.resolve(NAME, raw)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                ToolError::failed(NAME, format!("Failed to create directories for '{raw}': {e}"))
            })?;
        }

        tokio::fs::write(&path, content)
            .await
            .map_err(|e| ToolError::failed(NAME, format!("Failed to write file '{raw}': {e}")))?;

        tracing::info!(path = %path.display(), bytes = content.len(), "File written");
        Ok(Value::String(format!(
            "Wrote {} bytes to {raw}",
            content.len()
        )))
    }
}
