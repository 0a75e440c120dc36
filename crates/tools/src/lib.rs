//! Built-in host tools for Steward.
//!
//! Tools let the assistant inspect and change the workspace: list and read
//! files, write files, and get a project overview. Every path goes through
//! the [`Sandbox`], which resolves it against the workspace and enforces the
//! configured forbidden paths and allowed roots.

pub mod fn_tool;
pub mod list_files;
pub mod project_context;
pub mod read_file;
pub mod sandbox;
pub mod write_file;

use std::sync::Arc;

use steward_config::ToolsConfig;
use steward_core::error::ToolError;
use steward_core::tool::ToolRegistry;
use steward_security::AuditLogger;

pub use fn_tool::FnTool;
pub use list_files::ListFilesTool;
pub use project_context::ProjectContextTool;
pub use read_file::ReadFileTool;
pub use sandbox::Sandbox;
pub use write_file::WriteFileTool;

/// Create a registry with every built-in tool, sandboxed per `config`.
pub fn default_registry(config: &ToolsConfig) -> Result<ToolRegistry, ToolError> {
    registry_with_sandbox(Sandbox::from_config(config))
}

/// Like [`default_registry`], recording refused paths in `audit`.
pub fn default_registry_with_audit(
    config: &ToolsConfig,
    audit: Arc<AuditLogger>,
) -> Result<ToolRegistry, ToolError> {
    registry_with_sandbox(Sandbox::from_config(config).with_audit(audit))
}

fn registry_with_sandbox(sandbox: Sandbox) -> Result<ToolRegistry, ToolError> {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(ListFilesTool::new(sandbox.clone())))?;
    registry.register(Box::new(ReadFileTool::new(sandbox.clone())))?;
    registry.register(Box::new(WriteFileTool::new(sandbox.clone())))?;
    registry.register(Box::new(ProjectContextTool::new(sandbox)))?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use steward_core::tool::Capability;

    #[test]
    fn registers_all_builtins() {
        let registry = default_registry(&ToolsConfig::default()).unwrap();
        assert_eq!(
            registry.names(),
            vec!["get_project_context", "list_files", "read_file", "write_file"]
        );
        let mutating: Vec<_> = registry
            .definitions()
            .into_iter()
            .filter(|d| d.capability == Capability::Mutating)
            .map(|d| d.name)
            .collect();
        assert_eq!(mutating, vec!["write_file"]);
    }
}
