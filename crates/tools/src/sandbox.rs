//! Shared path handling for the file tools.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use steward_config::ToolsConfig;
use steward_core::error::ToolError;
use steward_security::{AuditEvent, AuditLogger, AuditOutcome, PathPolicy};
use tracing::warn;

/// Resolves tool-supplied paths against the workspace and records refusals.
#[derive(Debug, Clone)]
pub struct Sandbox {
    policy: PathPolicy,
    audit: Option<Arc<AuditLogger>>,
}

impl Sandbox {
    pub fn new(policy: PathPolicy) -> Self {
        Self {
            policy,
            audit: None,
        }
    }

    pub fn from_config(config: &ToolsConfig) -> Self {
        Self::new(PathPolicy::new(
            config.workspace_dir(),
            config.allowed_roots.clone(),
            config.forbidden_paths.clone(),
        ))
    }

    /// Record refused paths in `audit`.
    pub fn with_audit(mut self, audit: Arc<AuditLogger>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn workspace(&self) -> &Path {
        self.policy.workspace()
    }

    pub fn policy(&self) -> &PathPolicy {
        &self.policy
    }

    /// Resolve `raw` for `tool_name`, mapping refusals to `PermissionDenied`.
    pub fn resolve(&self, tool_name: &str, raw: &str) -> Result<PathBuf, ToolError> {
        self.policy.resolve(raw).map_err(|e| {
            warn!(tool = tool_name, path = raw, error = %e, "Path denied");
            if let Some(audit) = &self.audit {
                audit.log(
                    AuditEvent::PathDenied { path: raw.into() },
                    tool_name,
                    raw,
                    AuditOutcome::Denied,
                    Some(e.to_string()),
                );
            }
            ToolError::PermissionDenied {
                tool_name: tool_name.into(),
                reason: e.to_string(),
            }
        })
    }
}

/// Read a required string parameter.
pub(crate) fn required_str<'a>(
    tool_name: &str,
    input: &'a steward_core::ToolInput,
    key: &str,
) -> Result<&'a str, ToolError> {
    input
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ToolError::InvalidInput {
            tool_name: tool_name.into(),
            reason: format!("missing '{key}' argument"),
        })
}
