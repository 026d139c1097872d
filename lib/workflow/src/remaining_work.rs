//! Remaining work graph for workflow execution.
//!
//! The engine schedules with a "remaining work graph":
//! - Start with the full workflow graph
//! - Remove nodes once they reach a terminal status (success, failed, skipped)
//! - Nodes with 0 incoming edges have every predecessor finished and are
//!   ready for a run/skip decision
//! - When the graph is empty every node has been decided
//!
//! Failed nodes are removed like any other: whether their successors run is
//! decided by edge conditions, not by blocking.

use crate::graph::WorkflowGraph;
use crate::node::NodeId;
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{HashMap, HashSet};

/// Tracks which nodes still need a decision.
#[derive(Debug, Clone)]
pub struct RemainingWork {
    /// Dependency edges among unfinished nodes.
    graph: DiGraph<NodeId, ()>,
    /// Map from NodeId to graph index for O(1) lookup.
    node_to_index: HashMap<NodeId, NodeIndex>,
    /// Document order, used to report ready nodes deterministically.
    order: Vec<NodeId>,
    /// Nodes handed to an executor that have not finished.
    dispatched: HashSet<NodeId>,
}

impl RemainingWork {
    /// Creates the work graph with every node pending.
    #[must_use]
    pub fn from_graph(workflow_graph: &WorkflowGraph) -> Self {
        let mut graph = DiGraph::new();
        let mut node_to_index = HashMap::new();
        let mut order = Vec::with_capacity(workflow_graph.node_count());

        for node in workflow_graph.nodes() {
            let idx = graph.add_node(node.id.clone());
            node_to_index.insert(node.id.clone(), idx);
            order.push(node.id.clone());
        }

        for edge in workflow_graph.edges() {
            if let (Some(&source), Some(&target)) =
                (node_to_index.get(&edge.source), node_to_index.get(&edge.target))
            {
                graph.add_edge(source, target, ());
            }
        }

        Self {
            graph,
            node_to_index,
            order,
            dispatched: HashSet::new(),
        }
    }

    /// Marks a node as handed to an executor.
    pub fn mark_dispatched(&mut self, node_id: &NodeId) {
        if self.node_to_index.contains_key(node_id) {
            self.dispatched.insert(node_id.clone());
        }
    }

    /// Removes a finished node, unblocking its successors.
    pub fn mark_finished(&mut self, node_id: &NodeId) {
        self.dispatched.remove(node_id);
        if let Some(idx) = self.node_to_index.remove(node_id) {
            self.graph.remove_node(idx);
            // Removal moves the last node into the freed index.
            self.rebuild_index_map();
        }
    }

    /// Nodes whose predecessors have all finished and that are not
    /// dispatched, in document order.
    #[must_use]
    pub fn ready_nodes(&self) -> Vec<NodeId> {
        self.order
            .iter()
            .filter(|node_id| !self.dispatched.contains(*node_id))
            .filter(|node_id| {
                self.node_to_index.get(*node_id).is_some_and(|&idx| {
                    self.graph
                        .edges_directed(idx, Direction::Incoming)
                        .next()
                        .is_none()
                })
            })
            .cloned()
            .collect()
    }

    /// Number of dispatched, unfinished nodes.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.dispatched.len()
    }

    /// Returns the number of nodes not yet finished.
    #[must_use]
    pub fn remaining_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns true once every node has finished.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Returns true if the node has not finished.
    #[must_use]
    pub fn contains(&self, node_id: &str) -> bool {
        self.node_to_index.contains_key(node_id)
    }

    /// Unfinished nodes in document order.
    #[must_use]
    pub fn unfinished(&self) -> Vec<NodeId> {
        self.order
            .iter()
            .filter(|node_id| self.node_to_index.contains_key(*node_id))
            .cloned()
            .collect()
    }

    /// Rebuilds the node-to-index map after graph modifications.
    fn rebuild_index_map(&mut self) {
        self.node_to_index.clear();
        for idx in self.graph.node_indices() {
            if let Some(node_id) = self.graph.node_weight(idx) {
                self.node_to_index.insert(node_id.clone(), idx);
            }
        }
    }
}
