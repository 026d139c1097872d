//! Workflow model and execution engine for switchyard.
//!
//! This crate provides:
//!
//! - **Graph model**: workflows as petgraph directed graphs of typed nodes
//!   joined by optionally conditional edges, with exhaustive validation
//! - **Execution plans**: topological waves with duration estimates
//! - **Execution engine**: dependency-ordered, bounded-concurrency node
//!   execution through connector adapters, with per-node timeouts,
//!   cooperative cancellation, and progress events
//! - **Run records**: the run state machine and per-node results

pub mod config;
pub mod definition;
pub mod edge;
pub mod engine;
pub mod error;
pub mod execution;
pub mod expression;
pub mod graph;
pub mod node;
pub mod plan;
pub mod remaining_work;
pub mod trigger;
pub mod validation;

pub use config::EngineConfig;
pub use definition::{Workflow, WorkflowMetadata, WorkflowSummary};
pub use edge::{Edge, EdgeRef};
pub use engine::{ExecutionEngine, ExecutionEvent, RunHandle};
pub use error::{ExecutionError, ExpressionError, GraphError, WorkflowError};
pub use execution::{NodeExecutionResult, NodeStatus, RunStatus, WorkflowRun};
pub use expression::ExpressionEvaluator;
pub use graph::{GraphDocument, WorkflowGraph};
pub use node::{NodeCategory, NodeId, WorkflowNode};
pub use plan::{ExecutionPlan, PlanStep};
pub use trigger::{Trigger, TriggerConfig, TriggerType};
pub use validation::{Severity, ValidationIssue, ValidationReport};
