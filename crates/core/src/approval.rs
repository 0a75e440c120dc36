//! The approval decision interface behind safe mode.
//!
//! Every tool call the assistant proposes is put to an [`ApprovalPolicy`]
//! before it reaches the executor. "No callback" and "host callback" are
//! two implementations of the same trait (see `steward-security`).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::tool::{Capability, ToolInput};

/// A pending tool call awaiting a verdict.
#[derive(Debug, Clone)]
pub struct ApprovalRequest<'a> {
    /// The tool the assistant wants to run
    pub action: &'a str,
    /// The proposed input
    pub input: &'a ToolInput,
    /// The assistant's stated reasoning
    pub reasoning: &'a str,
    /// The tool's declared capability
    pub capability: Capability,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Approved,
    /// Denied by the policy or the host.
    Rejected,
    /// Blocked because the call mutates state and nobody can confirm it.
    RequiresApproval,
    /// The approver did not answer in time.
    TimedOut,
}

/// The gate's decision for one tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalVerdict {
    pub status: ApprovalStatus,
    /// The input to execute with; policies may narrow or rewrite it.
    pub input: ToolInput,
    /// Why the call was not approved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ApprovalVerdict {
    pub fn approve(input: ToolInput) -> Self {
        Self {
            status: ApprovalStatus::Approved,
            input,
            reason: None,
        }
    }

    pub fn reject(input: ToolInput, reason: impl Into<String>) -> Self {
        Self {
            status: ApprovalStatus::Rejected,
            input,
            reason: Some(reason.into()),
        }
    }

    pub fn requires_approval(input: ToolInput, reason: impl Into<String>) -> Self {
        Self {
            status: ApprovalStatus::RequiresApproval,
            input,
            reason: Some(reason.into()),
        }
    }

    pub fn timed_out(input: ToolInput, reason: impl Into<String>) -> Self {
        Self {
            status: ApprovalStatus::TimedOut,
            input,
            reason: Some(reason.into()),
        }
    }

    pub fn approved(&self) -> bool {
        self.status == ApprovalStatus::Approved
    }

    /// The rejection reason, or a generic one.
    pub fn reason_or_default(&self) -> &str {
        self.reason.as_deref().unwrap_or("rejected by approval policy")
    }
}

/// Decides whether a proposed tool call may run.
#[async_trait]
pub trait ApprovalPolicy: Send + Sync {
    async fn decide(&self, request: &ApprovalRequest<'_>) -> ApprovalVerdict;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdict_constructors() {
        let input = ToolInput::new();
        assert!(ApprovalVerdict::approve(input.clone()).approved());

        let rejected = ApprovalVerdict::reject(input.clone(), "no");
        assert!(!rejected.approved());
        assert_eq!(rejected.reason_or_default(), "no");

        let blocked = ApprovalVerdict::requires_approval(input.clone(), "requires approval");
        assert_eq!(blocked.status, ApprovalStatus::RequiresApproval);

        let late = ApprovalVerdict::timed_out(input, "too slow");
        assert_eq!(late.status, ApprovalStatus::TimedOut);
        assert!(!late.approved());
    }

    #[test]
    fn verdict_serializes_status_snake_case() {
        let verdict = ApprovalVerdict::requires_approval(ToolInput::new(), "x");
        let json = serde_json::to_string(&verdict).unwrap();
        assert!(json.contains(r#""status":"requires_approval""#));
    }
}
