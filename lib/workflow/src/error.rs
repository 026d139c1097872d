//! Error types for the workflow crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `GraphError`: Low-level graph operations (nodes, edges, ordering)
//! - `ExpressionError`: Condition and template evaluation
//! - `ExecutionError`: Failures recorded on node results and runs
//! - `WorkflowError`: High-level workflow and run operations

use crate::node::NodeId;
use std::fmt;
use switchyard_core::WorkflowId;

/// Errors from graph operations.
///
/// These errors contain only information available at the graph layer.
/// Workflow-level context (like workflow_id) is added by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// Node with the given ID was not found in the graph.
    NodeNotFound { node_id: NodeId },
    /// A node with the given ID already exists.
    DuplicateNode { node_id: NodeId },
    /// Graph contains a cycle through the given node.
    CycleDetected { node_id: NodeId },
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NodeNotFound { node_id } => write!(f, "node not found: {node_id}"),
            Self::DuplicateNode { node_id } => write!(f, "duplicate node id: {node_id}"),
            Self::CycleDetected { node_id } => {
                write!(f, "graph contains a cycle involving node {node_id}")
            }
        }
    }
}

impl std::error::Error for GraphError {}

/// Errors from evaluating conditions and config templates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpressionError {
    /// The expression could not be evaluated.
    Evaluation { expression: String, reason: String },
    /// A `{{` placeholder has no closing `}}`.
    UnterminatedPlaceholder { template: String },
}

impl fmt::Display for ExpressionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Evaluation { expression, reason } => {
                write!(f, "failed to evaluate '{expression}': {reason}")
            }
            Self::UnterminatedPlaceholder { template } => {
                write!(f, "unterminated placeholder in '{template}'")
            }
        }
    }
}

impl std::error::Error for ExpressionError {}

/// Errors during workflow execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    /// No adapter is registered for the node's type.
    UnknownNodeType { node_id: NodeId, node_type: String },
    /// Node config templates could not be rendered.
    TemplateFailed { node_id: NodeId, reason: String },
    /// Node execution timed out.
    NodeTimeout { node_id: NodeId, timeout_ms: u64 },
    /// The adapter panicked.
    AdapterPanicked { node_id: NodeId },
    /// One or more required nodes failed.
    NodesFailed { node_ids: Vec<NodeId> },
    /// The run exceeded its overall deadline.
    RunTimeout { timeout_ms: u64 },
    /// The workflow could not be scheduled.
    Unschedulable { reason: String },
    /// Execution was cancelled.
    Cancelled,
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownNodeType { node_id, node_type } => {
                write!(f, "no adapter available for type '{node_type}' of node {node_id}")
            }
            Self::TemplateFailed { node_id, reason } => {
                write!(f, "config of node {node_id} could not be rendered: {reason}")
            }
            Self::NodeTimeout {
                node_id,
                timeout_ms,
            } => write!(f, "node {node_id} timed out after {timeout_ms}ms"),
            Self::AdapterPanicked { node_id } => write!(f, "adapter for node {node_id} panicked"),
            Self::NodesFailed { node_ids } => {
                let ids: Vec<&str> = node_ids.iter().map(NodeId::as_str).collect();
                write!(f, "required nodes failed: {}", ids.join(", "))
            }
            Self::RunTimeout { timeout_ms } => write!(f, "run timed out after {timeout_ms}ms"),
            Self::Unschedulable { reason } => write!(f, "workflow cannot be executed: {reason}"),
            Self::Cancelled => write!(f, "execution cancelled"),
        }
    }
}

impl std::error::Error for ExecutionError {}

/// High-level workflow errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    /// Invalid run state transition.
    InvalidStateTransition { from: String, to: String },
    /// A trigger record references a node the workflow does not have.
    UnknownTriggerNode { workflow_id: WorkflowId, node_id: NodeId },
}

impl fmt::Display for WorkflowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidStateTransition { from, to } => {
                write!(f, "invalid state transition from {from} to {to}")
            }
            Self::UnknownTriggerNode {
                workflow_id,
                node_id,
            } => write!(f, "workflow {workflow_id} has no node {node_id} to trigger"),
        }
    }
}

impl std::error::Error for WorkflowError {}
