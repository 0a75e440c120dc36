//! Closure-backed tools for hosts and tests.

use std::future::Future;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;
use steward_core::error::ToolError;
use steward_core::tool::{Capability, Tool, ToolInput};

type Handler = dyn Fn(ToolInput) -> BoxFuture<'static, Result<Value, ToolError>> + Send + Sync;

/// A tool whose behavior is an async closure.
///
/// ```ignore
/// let clock = FnTool::new("now", "Current UTC time", json!({"type": "object"}),
///     Capability::ReadOnly, |_| async { Ok(json!(chrono::Utc::now().to_rfc3339())) });
/// ```
pub struct FnTool {
    name: String,
    description: String,
    schema: Value,
    capability: Capability,
    handler: Box<Handler>,
}

impl FnTool {
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: Value,
        capability: Capability,
        handler: F,
    ) -> Self
    where
        F: Fn(ToolInput) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            schema,
            capability,
            handler: Box::new(move |input| -> BoxFuture<'static, Result<Value, ToolError>> {
                Box::pin(handler(input))
            }),
        }
    }
}

impl std::fmt::Debug for FnTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnTool")
            .field("name", &self.name)
            .field("capability", &self.capability)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        self.schema.clone()
    }

    fn capability(&self) -> Capability {
        self.capability
    }

    async fn execute(&self, input: ToolInput) -> Result<Value, ToolError> {
        (self.handler)(input).await
    }
}
