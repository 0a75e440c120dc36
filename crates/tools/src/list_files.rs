//! Recursive glob search under the workspace.

use async_trait::async_trait;
use serde_json::{Value, json};
use steward_core::error::ToolError;
use steward_core::tool::{Capability, Tool, ToolInput};
use walkdir::WalkDir;

use crate::sandbox::{Sandbox, required_str};

const NAME: &str = "list_files";

/// Upper bound on returned paths.
pub const MAX_RESULTS: usize = 1000;

pub struct ListFilesTool {
    sandbox: Sandbox,
}

impl ListFilesTool {
    pub fn new(sandbox: Sandbox) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "List files whose names match a glob pattern (`*`, `?`, `[abc]`), searching \
         recursively under a directory of the workspace. Hidden entries are skipped."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "File name pattern, e.g. \"*.R\" or \"test_?.py\""
                },
                "path": {
                    "type": "string",
                    "description": "Directory to search, relative to the workspace (default: workspace root)"
                }
            },
            "required": ["pattern"]
        })
    }

    fn capability(&self) -> Capability {
        Capability::ReadOnly
    }

    async fn execute(&self, input: ToolInput) -> Result<Value, ToolError> {
        let pattern = required_str(NAME, &input, "pattern")?.to_string();
        let dir = input.get("path").and_then(|v| v.as_str()).unwrap_or(".");

        let matcher = glob::Pattern::new(&pattern).map_err(|e| ToolError::InvalidInput {
            tool_name: NAME.into(),
            reason: format!("invalid pattern '{pattern}': {e}"),
        })?;
        let root = self.sandbox.resolve(NAME, dir)?;
        if !root.is_dir() {
            return Err(ToolError::failed(NAME, format!("'{dir}' is not a directory")));
        }

        let walk_root = root.clone();
        let policy = self.sandbox.policy().clone();
        let (files, truncated) = tokio::task::spawn_blocking(move || {
            let walker = WalkDir::new(&walk_root)
                .follow_links(false)
                .into_iter()
                .filter_entry(|e| {
                    if e.depth() == 0 {
                        return true;
                    }
                    if e.file_name().to_string_lossy().starts_with('.') {
                        return false;
                    }
                    let permitted = policy.permits(e.path());
                    if !permitted {
                        tracing::debug!(path = %e.path().display(), "Skipping forbidden entry");
                    }
                    permitted
                });
            let mut files: Vec<String> = walker
                .filter_map(Result::ok)
                .filter(|entry| entry.file_type().is_file())
                .filter(|entry| matcher.matches(&entry.file_name().to_string_lossy()))
                .map(|entry| {
                    entry
                        .path()
                        .strip_prefix(&walk_root)
                        .unwrap_or(entry.path())
                        .to_string_lossy()
                        .replace('\\', "/")
                })
                .collect();
            files.sort();
            let truncated = files.len() > MAX_RESULTS;
            files.truncate(MAX_RESULTS);
            (files, truncated)
        })
        .await
        .map_err(|e| ToolError::failed(NAME, format!("directory walk aborted: {e}")))?;

        tracing::debug!(pattern = %pattern, root = %root.display(), count = files.len(), "Listed files");

        Ok(json!({
            "root": dir,
            "pattern": pattern,
            "count": files.len(),
            "truncated": truncated,
            "files": files,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use steward_security::PathPolicy;

    fn tool(dir: &std::path::Path) -> ListFilesTool {
        ListFilesTool::new(Sandbox::new(PathPolicy::new(dir, Vec::new(), Vec::new())))
    }

    fn input(value: Value) -> ToolInput {
        value.as_object().cloned().unwrap()
    }

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("R/utils")).unwrap();
        std::fs::create_dir_all(dir.path().join(".git")).unwrap();
        std::fs::write(dir.path().join("analysis.R"), "").unwrap();
        std::fs::write(dir.path().join("R/model.R"), "").unwrap();
        std::fs::write(dir.path().join("R/utils/helpers.R"), "").unwrap();
        std::fs::write(dir.path().join("README.md"), "").unwrap();
        std::fs::write(dir.path().join(".git/config.R"), "").unwrap();
        dir
    }

    #[test]
    fn tool_definition() {
        let dir = tempfile::tempdir().unwrap();
        let tool = tool(dir.path());
        assert_eq!(tool.name(), "list_files");
        assert_eq!(tool.capability(), Capability::ReadOnly);
        assert_eq!(tool.parameters_schema()["required"], json!(["pattern"]));
    }

    #[tokio::test]
    async fn finds_matches_recursively_sorted() {
        let dir = fixture();
        let out = tool(dir.path()).execute(input(json!({"pattern": "*.R"}))).await.unwrap();
        assert_eq!(
            out["files"],
            json!(["R/model.R", "R/utils/helpers.R", "analysis.R"])
        );
        assert_eq!(out["count"], 3);
        assert_eq!(out["truncated"], false);
    }

    #[tokio::test]
    async fn searches_within_subdirectory() {
        let dir = fixture();
        let out = tool(dir.path())
            .execute(input(json!({"pattern": "*.R", "path": "R/utils"})))
            .await
            .unwrap();
        assert_eq!(out["files"], json!(["helpers.R"]));
    }

    #[tokio::test]
    async fn question_mark_matches_single_char() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a1.txt", "a22.txt", "b1.txt"] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }
        let out = tool(dir.path()).execute(input(json!({"pattern": "a?.txt"}))).await.unwrap();
        assert_eq!(out["files"], json!(["a1.txt"]));
    }

    #[tokio::test]
    async fn caps_results_to_the_sorted_head() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..(MAX_RESULTS + 5) {
            std::fs::write(dir.path().join(format!("f{i:04}.log")), "").unwrap();
        }
        let out = tool(dir.path()).execute(input(json!({"pattern": "*.log"}))).await.unwrap();
        assert_eq!(out["count"], MAX_RESULTS);
        assert_eq!(out["truncated"], true);
        let files = out["files"].as_array().unwrap();
        assert_eq!(files[0], "f0000.log");
        assert_eq!(files[MAX_RESULTS - 1], format!("f{:04}.log", MAX_RESULTS - 1));
    }

    #[tokio::test]
    async fn forbidden_subdirectories_are_pruned() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        std::fs::create_dir(root.join("secret")).unwrap();
        std::fs::write(root.join("secret/key.txt"), "hunter2").unwrap();
        std::fs::write(root.join("notes.txt"), "").unwrap();
        let forbidden = vec![root.join("secret").to_string_lossy().into_owned()];
        let tool = ListFilesTool::new(Sandbox::new(PathPolicy::new(&root, Vec::new(), forbidden)));

        let out = tool.execute(input(json!({"pattern": "*"}))).await.unwrap();
        assert_eq!(out["files"], json!(["notes.txt"]));
    }

    #[tokio::test]
    async fn missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = tool(dir.path())
            .execute(input(json!({"pattern": "*", "path": "nope"})))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed { .. }));
    }

    #[tokio::test]
    async fn invalid_pattern_is_invalid_input() {
        let dir = tempfile::tempdir().unwrap();
        let err = tool(dir.path()).execute(input(json!({"pattern": "[a"}))).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidInput { .. }));
    }
}
