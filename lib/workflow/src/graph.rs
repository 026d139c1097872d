//! Workflow graph implementation using petgraph.
//!
//! Workflows are directed graphs where:
//! - Nodes are connector invocations keyed by author-assigned ids
//! - Edges are directed arcs carrying an optional condition
//!
//! Nodes keep their insertion order, which is the order they appear in the
//! workflow document and the tie-break order everywhere else.

use crate::edge::{Edge, EdgeRef};
use crate::error::GraphError;
use crate::node::{NodeId, WorkflowNode};
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef as _;
use rootcause::prelude::Report;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A workflow graph using petgraph's directed graph.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "GraphDocument", into = "GraphDocument")]
pub struct WorkflowGraph {
    /// The underlying directed graph.
    graph: DiGraph<WorkflowNode, Edge>,
    /// Map from NodeId to petgraph's NodeIndex for O(1) lookup.
    node_index_map: HashMap<NodeId, NodeIndex>,
}

impl WorkflowGraph {
    /// Creates a new empty workflow graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node to the graph.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateNode` if a node with the same id exists.
    pub fn add_node(&mut self, node: WorkflowNode) -> Result<(), Report<GraphError>> {
        if self.node_index_map.contains_key(&node.id) {
            return Err(GraphError::DuplicateNode { node_id: node.id }.into());
        }
        let node_id = node.id.clone();
        let index = self.graph.add_node(node);
        self.node_index_map.insert(node_id, index);
        Ok(())
    }

    /// Removes a node and every edge touching it.
    ///
    /// Remaining nodes keep their relative order.
    pub fn remove_node(&mut self, node_id: &str) -> Option<WorkflowNode> {
        let index = *self.node_index_map.get(node_id)?;
        let removed = self.graph.node_weight(index)?.clone();

        let nodes: Vec<WorkflowNode> = self
            .nodes()
            .filter(|node| node.id != removed.id)
            .cloned()
            .collect();
        let edges: Vec<EdgeRef> = self
            .edges()
            .into_iter()
            .filter(|edge| edge.source != removed.id && edge.target != removed.id)
            .collect();
        *self = Self::from_parts(nodes, edges);
        Some(removed)
    }

    /// Returns a reference to a node by its ID.
    #[must_use]
    pub fn get_node(&self, node_id: &str) -> Option<&WorkflowNode> {
        let index = self.node_index_map.get(node_id)?;
        self.graph.node_weight(*index)
    }

    /// Returns a mutable reference to a node by its ID.
    ///
    /// The node's id must not be changed through this reference.
    pub fn get_node_mut(&mut self, node_id: &str) -> Option<&mut WorkflowNode> {
        let index = self.node_index_map.get(node_id)?;
        self.graph.node_weight_mut(*index)
    }

    #[must_use]
    pub fn contains(&self, node_id: &str) -> bool {
        self.node_index_map.contains_key(node_id)
    }

    /// Adds an edge between two nodes.
    ///
    /// # Errors
    ///
    /// Returns `NodeNotFound` if either endpoint doesn't exist.
    pub fn add_edge(
        &mut self,
        source_id: &str,
        target_id: &str,
        edge: Edge,
    ) -> Result<(), Report<GraphError>> {
        let source_index = self.index_of(source_id)?;
        let target_index = self.index_of(target_id)?;
        self.graph.add_edge(source_index, target_index, edge);
        Ok(())
    }

    /// Returns all nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &WorkflowNode> {
        self.graph.node_weights()
    }

    /// Returns all edges in insertion order.
    #[must_use]
    pub fn edges(&self) -> Vec<EdgeRef> {
        self.graph
            .edge_references()
            .map(|edge| EdgeRef {
                source: self.graph[edge.source()].id.clone(),
                target: self.graph[edge.target()].id.clone(),
                condition: edge.weight().condition.clone(),
            })
            .collect()
    }

    /// Returns the number of nodes in the graph.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns the number of edges in the graph.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Returns nodes that have no incoming edges (entry points).
    pub fn entry_nodes(&self) -> Vec<&WorkflowNode> {
        self.graph
            .node_indices()
            .filter(|&idx| self.degree(idx, Direction::Incoming) == 0)
            .filter_map(|idx| self.graph.node_weight(idx))
            .collect()
    }

    /// Returns nodes that have no outgoing edges (terminal nodes).
    pub fn terminal_nodes(&self) -> Vec<&WorkflowNode> {
        self.graph
            .node_indices()
            .filter(|&idx| self.degree(idx, Direction::Outgoing) == 0)
            .filter_map(|idx| self.graph.node_weight(idx))
            .collect()
    }

    /// Returns the successors (downstream nodes) of a given node, in node order.
    pub fn successors(&self, node_id: &str) -> Vec<(&WorkflowNode, &Edge)> {
        self.neighbors(node_id, Direction::Outgoing)
    }

    /// Returns the predecessors (upstream nodes) of a given node, in node order.
    pub fn predecessors(&self, node_id: &str) -> Vec<(&WorkflowNode, &Edge)> {
        self.neighbors(node_id, Direction::Incoming)
    }

    /// Returns node ids in a dependency-respecting order.
    ///
    /// # Errors
    ///
    /// Returns `CycleDetected` naming a node on a cycle.
    pub fn topological_order(&self) -> Result<Vec<NodeId>, Report<GraphError>> {
        petgraph::algo::toposort(&self.graph, None)
            .map(|order| {
                order
                    .into_iter()
                    .map(|idx| self.graph[idx].id.clone())
                    .collect()
            })
            .map_err(|cycle| {
                GraphError::CycleDetected {
                    node_id: self.graph[cycle.node_id()].id.clone(),
                }
                .into()
            })
    }

    /// Returns true if the graph contains a cycle.
    #[must_use]
    pub fn is_cyclic(&self) -> bool {
        petgraph::algo::is_cyclic_directed(&self.graph)
    }

    /// Rebuilds the node index map from the graph.
    fn rebuild_index_map(&mut self) {
        self.node_index_map.clear();
        for index in self.graph.node_indices() {
            if let Some(node) = self.graph.node_weight(index) {
                self.node_index_map.insert(node.id.clone(), index);
            }
        }
    }

    /// Builds a graph from parts already known to be consistent.
    fn from_parts(nodes: Vec<WorkflowNode>, edges: Vec<EdgeRef>) -> Self {
        let mut graph = Self::new();
        for node in nodes {
            graph.graph.add_node(node);
        }
        graph.rebuild_index_map();
        for edge in edges {
            if let (Some(&source), Some(&target)) = (
                graph.node_index_map.get(&edge.source),
                graph.node_index_map.get(&edge.target),
            ) {
                graph.graph.add_edge(source, target, edge.edge());
            }
        }
        graph
    }

    fn index_of(&self, node_id: &str) -> Result<NodeIndex, Report<GraphError>> {
        self.node_index_map.get(node_id).copied().ok_or_else(|| {
            GraphError::NodeNotFound {
                node_id: NodeId::from(node_id),
            }
            .into()
        })
    }

    fn degree(&self, index: NodeIndex, direction: Direction) -> usize {
        self.graph.edges_directed(index, direction).count()
    }

    fn neighbors(&self, node_id: &str, direction: Direction) -> Vec<(&WorkflowNode, &Edge)> {
        let Some(&index) = self.node_index_map.get(node_id) else {
            return Vec::new();
        };

        let mut neighbors: Vec<(NodeIndex, &Edge)> = self
            .graph
            .edges_directed(index, direction)
            .map(|edge| {
                let other = match direction {
                    Direction::Outgoing => edge.target(),
                    Direction::Incoming => edge.source(),
                };
                (other, edge.weight())
            })
            .collect();
        neighbors.sort_by_key(|(other, _)| *other);
        neighbors
            .into_iter()
            .map(|(other, edge)| (&self.graph[other], edge))
            .collect()
    }
}

/// Serialized form of a workflow graph.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphDocument {
    #[serde(default)]
    pub nodes: Vec<WorkflowNode>,
    #[serde(default)]
    pub edges: Vec<EdgeRef>,
}

impl TryFrom<GraphDocument> for WorkflowGraph {
    type Error = Report<GraphError>;

    fn try_from(document: GraphDocument) -> Result<Self, Self::Error> {
        let mut graph = Self::new();
        for node in document.nodes {
            graph.add_node(node)?;
        }
        for edge in document.edges {
            let weight = edge.edge();
            graph.add_edge(edge.source.as_str(), edge.target.as_str(), weight)?;
        }
        Ok(graph)
    }
}

impl From<WorkflowGraph> for GraphDocument {
    fn from(graph: WorkflowGraph) -> Self {
        let edges = graph.edges();
        let (nodes, _) = graph.graph.into_nodes_edges();
        Self {
            nodes: nodes.into_iter().map(|node| node.weight).collect(),
            edges,
        }
    }
}
