//! Workflow definition types.
//!
//! A workflow is a tenant-owned, versioned automation that consists of:
//! - Metadata (name, description, structural version, timestamps)
//! - A directed graph of nodes and conditional edges
//! - Trigger records pointing at trigger nodes
//!
//! Every structural change (nodes, edges, triggers) bumps the version.

use crate::edge::Edge;
use crate::error::{GraphError, WorkflowError};
use crate::graph::WorkflowGraph;
use crate::node::{NodeId, WorkflowNode};
use crate::trigger::Trigger;
use crate::validation::{self, ValidationReport};
use chrono::{DateTime, Utc};
use rootcause::prelude::Report;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use switchyard_core::{TenantId, WorkflowId};

/// Metadata for a workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowMetadata {
    /// Human-readable name for this workflow.
    pub name: String,
    /// Description of what this workflow does.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Structural version, incremented on every graph or trigger change.
    #[serde(default = "initial_version")]
    pub version: u32,
    /// When this workflow was created.
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    /// When this workflow was last updated.
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

fn initial_version() -> u32 {
    1
}

fn active() -> bool {
    true
}

impl WorkflowMetadata {
    /// Creates new metadata at version 1.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            description: None,
            version: initial_version(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A complete workflow definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    /// Unique identifier for this workflow.
    pub id: WorkflowId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Workflow metadata.
    #[serde(flatten)]
    pub metadata: WorkflowMetadata,
    /// Whether runs other than test runs may execute.
    #[serde(default = "active")]
    pub is_active: bool,
    /// The workflow graph (nodes and edges).
    #[serde(flatten)]
    graph: WorkflowGraph,
    /// Trigger records.
    #[serde(default)]
    triggers: Vec<Trigger>,
}

impl Workflow {
    /// Creates a new, empty, active workflow.
    #[must_use]
    pub fn new(tenant_id: TenantId, name: impl Into<String>) -> Self {
        Self::with_id(WorkflowId::new(), tenant_id, name)
    }

    /// Creates a workflow with a specific ID.
    #[must_use]
    pub fn with_id(id: WorkflowId, tenant_id: TenantId, name: impl Into<String>) -> Self {
        Self {
            id,
            tenant_id,
            metadata: WorkflowMetadata::new(name),
            is_active: true,
            graph: WorkflowGraph::new(),
            triggers: Vec::new(),
        }
    }

    /// Returns the workflow name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Returns the structural version.
    #[must_use]
    pub fn version(&self) -> u32 {
        self.metadata.version
    }

    /// The workflow graph. Mutate through the workflow so the version is kept.
    #[must_use]
    pub fn graph(&self) -> &WorkflowGraph {
        &self.graph
    }

    #[must_use]
    pub fn triggers(&self) -> &[Trigger] {
        &self.triggers
    }

    /// Adds a node.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateNode` if the id is taken.
    pub fn add_node(&mut self, node: WorkflowNode) -> Result<(), Report<GraphError>> {
        self.graph.add_node(node)?;
        self.bump_version();
        Ok(())
    }

    /// Removes a node, its edges, and any triggers pointing at it.
    pub fn remove_node(&mut self, node_id: &str) -> Option<WorkflowNode> {
        let removed = self.graph.remove_node(node_id)?;
        self.triggers
            .retain(|trigger| trigger.node_id.as_str() != node_id);
        self.bump_version();
        Some(removed)
    }

    /// Adds an edge.
    ///
    /// # Errors
    ///
    /// Returns `NodeNotFound` if either endpoint is missing.
    pub fn add_edge(
        &mut self,
        source: &str,
        target: &str,
        edge: Edge,
    ) -> Result<(), Report<GraphError>> {
        self.graph.add_edge(source, target, edge)?;
        self.bump_version();
        Ok(())
    }

    /// Adds an unconditional edge.
    ///
    /// # Errors
    ///
    /// Returns `NodeNotFound` if either endpoint is missing.
    pub fn connect(&mut self, source: &str, target: &str) -> Result<(), Report<GraphError>> {
        self.add_edge(source, target, Edge::always())
    }

    /// Adds an edge guarded by a condition.
    ///
    /// # Errors
    ///
    /// Returns `NodeNotFound` if either endpoint is missing.
    pub fn connect_when(
        &mut self,
        source: &str,
        target: &str,
        condition: impl Into<String>,
    ) -> Result<(), Report<GraphError>> {
        self.add_edge(source, target, Edge::when(condition))
    }

    /// Attaches a trigger record.
    ///
    /// # Errors
    ///
    /// Returns `UnknownTriggerNode` if the trigger points at a missing node.
    pub fn add_trigger(&mut self, trigger: Trigger) -> Result<(), Report<WorkflowError>> {
        if !self.graph.contains(trigger.node_id.as_str()) {
            return Err(WorkflowError::UnknownTriggerNode {
                workflow_id: self.id,
                node_id: trigger.node_id,
            }
            .into());
        }
        self.triggers.push(trigger);
        self.bump_version();
        Ok(())
    }

    /// Looks up a node.
    #[must_use]
    pub fn node(&self, node_id: &str) -> Option<&WorkflowNode> {
        self.graph.get_node(node_id)
    }

    /// Ids of all nodes, in document order.
    #[must_use]
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.graph.nodes().map(|node| node.id.clone()).collect()
    }

    /// Distinct connector types referenced by the nodes.
    #[must_use]
    pub fn connector_types(&self) -> BTreeSet<&str> {
        self.graph
            .nodes()
            .map(|node| node.node_type.as_str())
            .collect()
    }

    /// Activates the workflow.
    pub fn activate(&mut self) {
        self.is_active = true;
        self.touch();
    }

    /// Deactivates the workflow.
    pub fn deactivate(&mut self) {
        self.is_active = false;
        self.touch();
    }

    /// Validates the workflow, collecting every issue.
    #[must_use]
    pub fn validate(&self) -> ValidationReport {
        validation::validate(self)
    }

    /// Marks the workflow as updated (bumps updated_at timestamp).
    pub fn touch(&mut self) {
        self.metadata.updated_at = Utc::now();
    }

    fn bump_version(&mut self) {
        self.metadata.version = self.metadata.version.saturating_add(1);
        self.touch();
    }
}

/// Summary information about a workflow (for listings).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSummary {
    pub id: WorkflowId,
    pub name: String,
    pub version: u32,
    pub is_active: bool,
    pub node_count: usize,
    pub trigger_count: usize,
    pub updated_at: DateTime<Utc>,
}

impl From<&Workflow> for WorkflowSummary {
    fn from(workflow: &Workflow) -> Self {
        Self {
            id: workflow.id,
            name: workflow.metadata.name.clone(),
            version: workflow.metadata.version,
            is_active: workflow.is_active,
            node_count: workflow.graph.node_count(),
            trigger_count: workflow.triggers.len(),
            updated_at: workflow.metadata.updated_at,
        }
    }
}
