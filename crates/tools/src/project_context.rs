//! A compact overview of the workspace for the assistant.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use serde_json::{Value, json};
use steward_core::error::ToolError;
use steward_core::tool::{Capability, Tool, ToolInput};
use walkdir::WalkDir;

use crate::sandbox::Sandbox;

const NAME: &str = "get_project_context";

/// Directories that never contribute to the overview.
const SKIPPED_DIRS: &[&str] = &["target", "node_modules", "__pycache__", "venv"];

pub struct ProjectContextTool {
    sandbox: Sandbox,
}

impl ProjectContextTool {
    pub fn new(sandbox: Sandbox) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for ProjectContextTool {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Summarize the workspace: its name, top-level entries, and file counts by extension."
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    fn capability(&self) -> Capability {
        Capability::ReadOnly
    }

    async fn execute(&self, _input: ToolInput) -> Result<Value, ToolError> {
        let root = self.sandbox.resolve(NAME, ".")?;
        tokio::task::spawn_blocking(move || summarize(&root))
            .await
            .map_err(|e| ToolError::failed(NAME, format!("workspace scan aborted: {e}")))?
    }
}

fn is_hidden_or_skipped(name: &str) -> bool {
    name.starts_with('.') || SKIPPED_DIRS.contains(&name)
}

fn summarize(root: &Path) -> Result<Value, ToolError> {
    let name = root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| root.display().to_string());

    let mut top_level = Vec::new();
    let entries = std::fs::read_dir(root)
        .map_err(|e| ToolError::failed(NAME, format!("cannot read workspace: {e}")))?;
    for entry in entries.flatten() {
        let entry_name = entry.file_name().to_string_lossy().into_owned();
        if entry_name.starts_with('.') {
            continue;
        }
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        top_level.push(if is_dir { format!("{entry_name}/") } else { entry_name });
    }
    top_level.sort();

    let mut by_extension: BTreeMap<String, usize> = BTreeMap::new();
    let mut total_files = 0usize;
    let walker = WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden_or_skipped(&e.file_name().to_string_lossy()));
    for entry in walker.filter_map(Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        total_files += 1;
        let ext = entry
            .path()
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_else(|| "(none)".into());
        *by_extension.entry(ext).or_default() += 1;
    }

    Ok(json!({
        "name": name,
        "root": root.display().to_string(),
        "top_level": top_level,
        "total_files": total_files,
        "files_by_extension": by_extension,
    }))
}
