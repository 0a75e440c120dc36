//! Decides whether a proposed tool call may run.
//!
//! Three policies cover the modes a host can run in:
//!
//! | mode                    | policy            | read-only | mutating          |
//! |-------------------------|-------------------|-----------|-------------------|
//! | `safe_mode = false`     | [`AutoApprove`]    | approved  | approved          |
//! | `safe_mode = true`      | [`SafeModePolicy`] | approved  | requires approval |
//! | host callback supplied  | [`CallbackPolicy`] | host      | host              |
//!
//! The [`ApprovalGate`] picks one, bounds it with an optional timeout, and
//! records every verdict in its audit log. It never runs tools itself.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use steward_core::approval::{ApprovalPolicy, ApprovalRequest, ApprovalStatus, ApprovalVerdict};
use steward_core::tool::ToolInput;
use tracing::{debug, warn};

use crate::audit::{AuditEvent, AuditLogger, AuditOutcome, TracingSink};

/// Approves every call. Used when safe mode is off.
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoApprove;

#[async_trait]
impl ApprovalPolicy for AutoApprove {
    async fn decide(&self, request: &ApprovalRequest<'_>) -> ApprovalVerdict {
        ApprovalVerdict::approve(request.input.clone())
    }
}

/// Lets read-only tools through and blocks mutating ones.
#[derive(Debug, Default, Clone, Copy)]
pub struct SafeModePolicy;

#[async_trait]
impl ApprovalPolicy for SafeModePolicy {
    async fn decide(&self, request: &ApprovalRequest<'_>) -> ApprovalVerdict {
        if request.capability.is_read_only() {
            return ApprovalVerdict::approve(request.input.clone());
        }
        ApprovalVerdict::requires_approval(
            request.input.clone(),
            format!(
                "Tool `{}` is {} and requires approval in safe mode; \
                 the host must supply an approval callback to run it",
                request.action, request.capability
            ),
        )
    }
}

/// Host-supplied approval closure: `(action, input, reasoning) -> verdict`.
pub type ApprovalFn = dyn Fn(&str, &ToolInput, &str) -> ApprovalVerdict + Send + Sync;

/// Defers every call, read-only or not, to a host closure.
///
/// The closure's verdict is final, including any rewritten input.
pub struct CallbackPolicy {
    callback: Box<ApprovalFn>,
}

impl CallbackPolicy {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&str, &ToolInput, &str) -> ApprovalVerdict + Send + Sync + 'static,
    {
        Self {
            callback: Box::new(callback),
        }
    }
}

impl std::fmt::Debug for CallbackPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackPolicy").finish_non_exhaustive()
    }
}

#[async_trait]
impl ApprovalPolicy for CallbackPolicy {
    async fn decide(&self, request: &ApprovalRequest<'_>) -> ApprovalVerdict {
        (self.callback)(request.action, request.input, request.reasoning)
    }
}

/// The per-run approval gate.
pub struct ApprovalGate {
    policy: Arc<dyn ApprovalPolicy>,
    actor: &'static str,
    timeout: Option<Duration>,
    audit: Arc<AuditLogger>,
}

impl std::fmt::Debug for ApprovalGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApprovalGate")
            .field("actor", &self.actor)
            .field("timeout", &self.timeout)
            .field("audit", &self.audit)
            .finish()
    }
}

impl ApprovalGate {
    /// Select the policy: a host callback wins, otherwise safe mode decides.
    pub fn new(safe_mode: bool, callback: Option<Arc<dyn ApprovalPolicy>>) -> Self {
        let (policy, actor): (Arc<dyn ApprovalPolicy>, &'static str) = match callback {
            Some(policy) => (policy, "callback"),
            None if safe_mode => (Arc::new(SafeModePolicy), "safe_mode"),
            None => (Arc::new(AutoApprove), "auto"),
        };
        Self {
            policy,
            actor,
            timeout: None,
            audit: Arc::new(AuditLogger::with_sinks(vec![Box::new(TracingSink)])),
        }
    }

    /// Bound each policy decision. Expiry yields a `TimedOut` verdict.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Record verdicts in a shared audit log instead of the gate's own.
    pub fn with_audit(mut self, audit: Arc<AuditLogger>) -> Self {
        self.audit = audit;
        self
    }

    /// The audit log of every verdict this gate has issued.
    pub fn audit(&self) -> &AuditLogger {
        &self.audit
    }

    /// Which policy is in charge ("auto", "safe_mode" or "callback").
    pub fn actor(&self) -> &'static str {
        self.actor
    }

    /// Put one proposed call to the policy.
    pub async fn review(&self, request: &ApprovalRequest<'_>) -> ApprovalVerdict {
        let verdict = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, self.policy.decide(request)).await {
                Ok(verdict) => verdict,
                Err(_) => {
                    warn!(
                        action = request.action,
                        timeout_ms = limit.as_millis() as u64,
                        "Approval timed out"
                    );
                    ApprovalVerdict::timed_out(
                        request.input.clone(),
                        format!(
                            "approval for `{}` was not given within {}s",
                            request.action,
                            limit.as_secs_f64()
                        ),
                    )
                }
            },
            None => self.policy.decide(request).await,
        };

        debug!(
            actor = self.actor,
            action = request.action,
            status = ?verdict.status,
            "Approval verdict"
        );
        self.record(request, &verdict);
        verdict
    }

    fn record(&self, request: &ApprovalRequest<'_>, verdict: &ApprovalVerdict) {
        let tool_name = request.action.to_string();
        let (event, outcome) = match verdict.status {
            ApprovalStatus::Approved => (AuditEvent::ToolApproval { tool_name }, AuditOutcome::Approved),
            ApprovalStatus::Rejected => (AuditEvent::ToolDenied { tool_name }, AuditOutcome::Rejected),
            ApprovalStatus::RequiresApproval => (
                AuditEvent::ToolDenied { tool_name },
                AuditOutcome::RequiresApproval,
            ),
            ApprovalStatus::TimedOut => (AuditEvent::ToolDenied { tool_name }, AuditOutcome::TimedOut),
        };
        self.audit
            .log(event, self.actor, request.action, outcome, verdict.reason.clone());
    }
}
