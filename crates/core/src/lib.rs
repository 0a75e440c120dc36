//! # Steward Core
//!
//! Domain types, traits, and error definitions for the Steward task engine.
//! This crate has **no framework dependencies**. It defines the domain model
//! that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every seam is defined as a trait here. Implementations live in their
//! respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod approval;
pub mod error;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use approval::{ApprovalPolicy, ApprovalRequest, ApprovalStatus, ApprovalVerdict};
pub use error::{Error, ProviderError, Result, ToolError};
pub use message::{Message, Role, Transcript, TranscriptId};
pub use provider::{ChatClient, ChatOptions};
pub use tool::{Capability, Tool, ToolDefinition, ToolInput, ToolRegistry, ToolResult};
