//! Read file tool.

use async_trait::async_trait;
use serde_json::{Value, json};
use steward_core::error::ToolError;
use steward_core::tool::{Capability, Tool, ToolInput};
use tokio::io::AsyncReadExt;

use crate::sandbox::{Sandbox, required_str};

const NAME: &str = "read_file";

/// Contents beyond this many bytes are cut off.
pub const MAX_READ_BYTES: usize = 256 * 1024;

pub struct ReadFileTool {
    sandbox: Sandbox,
}

impl ReadFileTool {
    pub fn new(sandbox: Sandbox) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Read the UTF-8 contents of a file in the workspace. Large files are truncated."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The file path to read, relative to the workspace"
                }
            },
            "required": ["path"]
        })
    }

    fn capability(&self) -> Capability {
        Capability::ReadOnly
    }

    async fn execute(&self, input: ToolInput) -> Result<Value, ToolError> {
        let raw = required_str(NAME, &input, "path")?;
        let path = self.sandbox.resolve(NAME, raw)?;
        let read_error = |e: std::io::Error| ToolError::failed(NAME, format!("Failed to read file '{raw}': {e}"));

        let file = tokio::fs::File::open(&path).await.map_err(read_error)?;
        let metadata = file.metadata().await.map_err(read_error)?;
        if !metadata.is_file() {
            return Err(ToolError::failed(NAME, format!("'{raw}' is not a regular file")));
        }

        // One byte past the cap tells us whether anything was cut.
        let mut bytes = Vec::with_capacity((metadata.len() as usize).min(MAX_READ_BYTES + 1));
        file.take(MAX_READ_BYTES as u64 + 1)
            .read_to_end(&mut bytes)
            .await
            .map_err(read_error)?;

        Ok(Value::String(truncate(&bytes, metadata.len())))
    }
}

/// Decode as UTF-8 (lossy) and cut at [`MAX_READ_BYTES`] on a char boundary.
/// `total` is the file size reported in the truncation marker.
fn truncate(bytes: &[u8], total: u64) -> String {
    if bytes.len() <= MAX_READ_BYTES {
        return String::from_utf8_lossy(bytes).into_owned();
    }
    let mut text = String::from_utf8_lossy(&bytes[..MAX_READ_BYTES]).into_owned();
    // A multi-byte char split at the cut decodes to U+FFFD; drop it.
    if text.ends_with(char::REPLACEMENT_CHARACTER) {
        text.pop();
    }
    let total = total.max(bytes.len() as u64);
    text.push_str(&format!(
        "\n[... truncated: showing first {MAX_READ_BYTES} of {total} bytes]"
    ));
    text
}
