//! Edge types for workflow graphs.
//!
//! Edges are directed arcs between nodes. An edge may carry a boolean
//! `condition` expression; unconditional edges are taken when their source
//! succeeds.

use crate::node::NodeId;
use serde::{Deserialize, Serialize};

/// An edge weight in a workflow graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    /// Expression that must evaluate truthy for the edge to be taken.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

impl Edge {
    /// An unconditional edge.
    #[must_use]
    pub fn always() -> Self {
        Self::default()
    }

    /// An edge guarded by a condition expression.
    #[must_use]
    pub fn when(condition: impl Into<String>) -> Self {
        Self {
            condition: Some(condition.into()),
        }
    }

    #[must_use]
    pub fn is_conditional(&self) -> bool {
        self.condition.is_some()
    }
}

/// A complete edge reference including source and target node IDs.
///
/// This is the external representation used in workflow documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeRef {
    pub source: NodeId,
    pub target: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

impl EdgeRef {
    #[must_use]
    pub fn new(source: impl Into<NodeId>, target: impl Into<NodeId>, edge: Edge) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            condition: edge.condition,
        }
    }

    /// The edge weight, without its endpoints.
    #[must_use]
    pub fn edge(&self) -> Edge {
        Edge {
            condition: self.condition.clone(),
        }
    }
}
