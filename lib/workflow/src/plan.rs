//! Execution plans: topological ordering grouped into parallel waves.
//!
//! A node's wave is one more than the deepest of its predecessors, so every
//! node in a wave depends only on nodes in earlier waves. Wave 0 holds the
//! nodes that are immediately schedulable. The plan is static; which
//! conditional branches actually run is decided at run time.

use crate::error::GraphError;
use crate::graph::WorkflowGraph;
use crate::node::{NodeCategory, NodeId};
use rootcause::prelude::Report;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// One node's place in the plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanStep {
    pub node_id: NodeId,
    pub node_type: String,
    pub category: NodeCategory,
    /// Zero-based wave; steps in the same wave may run in parallel.
    pub wave: usize,
    /// Predecessors that must finish first.
    pub depends_on: Vec<NodeId>,
    /// True if any inbound edge carries a condition.
    pub conditional: bool,
    pub estimated_duration_ms: u64,
}

/// The ordered plan for a workflow graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionPlan {
    /// Steps ordered by wave, then by document order.
    pub steps: Vec<PlanStep>,
    /// Node id to the ids it depends on.
    pub dependencies: BTreeMap<NodeId, Vec<NodeId>>,
    /// Sum over waves of the slowest step in each wave.
    pub estimated_duration_ms: u64,
}

impl ExecutionPlan {
    /// Builds the plan for a graph.
    ///
    /// Each node is estimated at `estimatedDurationMs` from its config, or
    /// `default_estimate_ms`; disabled nodes are estimated at zero.
    ///
    /// # Errors
    ///
    /// Returns `CycleDetected` if the graph is not acyclic.
    pub fn build(
        graph: &WorkflowGraph,
        default_estimate_ms: u64,
    ) -> Result<Self, Report<GraphError>> {
        let order = graph.topological_order()?;

        let mut waves: HashMap<&str, usize> = HashMap::new();
        for node_id in &order {
            let wave = graph
                .predecessors(node_id.as_str())
                .iter()
                .filter_map(|(pred, _)| waves.get(pred.id.as_str()))
                .map(|wave| wave + 1)
                .max()
                .unwrap_or(0);
            waves.insert(node_id.as_str(), wave);
        }

        let mut steps = Vec::with_capacity(graph.node_count());
        let mut dependencies = BTreeMap::new();
        for node in graph.nodes() {
            let predecessors = graph.predecessors(node.id.as_str());
            let depends_on: Vec<NodeId> = predecessors
                .iter()
                .map(|(pred, _)| pred.id.clone())
                .collect();
            let estimated_duration_ms = if node.is_enabled {
                node.estimate_override().unwrap_or(default_estimate_ms)
            } else {
                0
            };

            dependencies.insert(node.id.clone(), depends_on.clone());
            steps.push(PlanStep {
                node_id: node.id.clone(),
                node_type: node.node_type.clone(),
                category: node.category,
                wave: waves.get(node.id.as_str()).copied().unwrap_or(0),
                depends_on,
                conditional: predecessors.iter().any(|(_, edge)| edge.is_conditional()),
                estimated_duration_ms,
            });
        }
        // Stable sort keeps document order within a wave.
        steps.sort_by_key(|step| step.wave);

        let mut slowest_per_wave: BTreeMap<usize, u64> = BTreeMap::new();
        for step in &steps {
            let slowest = slowest_per_wave.entry(step.wave).or_default();
            *slowest = (*slowest).max(step.estimated_duration_ms);
        }

        Ok(Self {
            steps,
            dependencies,
            estimated_duration_ms: slowest_per_wave.values().sum(),
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Number of waves.
    #[must_use]
    pub fn wave_count(&self) -> usize {
        self.steps.last().map_or(0, |step| step.wave + 1)
    }

    /// Node ids grouped by wave.
    #[must_use]
    pub fn waves(&self) -> Vec<Vec<&NodeId>> {
        let mut waves = vec![Vec::new(); self.wave_count()];
        for step in &self.steps {
            waves[step.wave].push(&step.node_id);
        }
        waves
    }

    /// Nodes with no dependencies, schedulable as soon as the run starts.
    #[must_use]
    pub fn immediately_schedulable(&self) -> Vec<&NodeId> {
        self.steps
            .iter()
            .filter(|step| step.wave == 0)
            .map(|step| &step.node_id)
            .collect()
    }

    /// Position of a node in the step order.
    #[must_use]
    pub fn position(&self, node_id: &str) -> Option<usize> {
        self.steps
            .iter()
            .position(|step| step.node_id.as_str() == node_id)
    }
}
