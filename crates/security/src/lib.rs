//! Security layer for Steward: approval gating, path validation and audit logging.
//!
//! Provides:
//! - **Approval gate**: safe-mode, auto-approve and host-callback policies
//! - **Path validation**: Filesystem sandboxing to the workspace directory
//! - **Audit logging**: One structured entry per approval verdict

pub mod approval;
pub mod audit;
pub mod path;

pub use approval::{ApprovalFn, ApprovalGate, AutoApprove, CallbackPolicy, SafeModePolicy};
pub use audit::{AuditEntry, AuditEvent, AuditLogger, AuditOutcome, AuditSink, TracingSink};
pub use path::{validate_path, PathPolicy, PathValidationError};
