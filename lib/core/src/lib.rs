//! Core identifiers shared across switchyard.
//!
//! This crate provides the foundational types used by the resolver,
//! integration, and workflow crates: strongly-typed identifiers and run
//! modes.

pub mod id;
pub mod mode;

pub use id::{
    CredentialId, NodeExecutionId, ParseIdError, TenantId, TriggerId, UserId, WorkflowId,
    WorkflowRunId,
};
pub use mode::RunMode;
