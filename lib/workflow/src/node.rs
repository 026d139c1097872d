//! Workflow node types.
//!
//! Nodes are the building blocks of workflows. Each node has:
//! - An author-assigned ID, unique within the workflow
//! - A `type` naming the connector that executes it
//! - A category (Trigger, Action, Transform)
//! - Opaque configuration whose schema belongs to the connector

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::borrow::Borrow;
use std::fmt;
use std::time::Duration;

/// Config key a node may use to override the engine's node timeout.
pub const TIMEOUT_KEY: &str = "timeoutMs";

/// Config key a node may use to override the planner's duration estimate.
pub const ESTIMATE_KEY: &str = "estimatedDurationMs";

/// A unique identifier for a node within a workflow.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl Borrow<str> for NodeId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// The category of a workflow node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeCategory {
    /// Entry points that initiate workflow execution.
    Trigger,
    /// Calls out to a connector (notifications, HTTP, SaaS actions).
    Action,
    /// Reshapes data between nodes.
    Transform,
}

impl NodeCategory {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trigger => "trigger",
            Self::Action => "action",
            Self::Transform => "transform",
        }
    }
}

impl fmt::Display for NodeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn enabled() -> bool {
    true
}

fn empty_config() -> JsonValue {
    JsonValue::Object(Map::new())
}

/// A node in a workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowNode {
    /// Unique identifier within the workflow.
    pub id: NodeId,
    /// Connector id that executes this node, e.g. `svc.sendNotification`.
    #[serde(rename = "type")]
    pub node_type: String,
    /// Human-readable name.
    #[serde(default)]
    pub name: String,
    pub category: NodeCategory,
    /// Connector-owned configuration, passed through unexamined apart from
    /// template rendering.
    #[serde(default = "empty_config")]
    pub config: JsonValue,
    #[serde(default = "enabled")]
    pub is_enabled: bool,
}

impl WorkflowNode {
    /// Creates an enabled node with empty config.
    #[must_use]
    pub fn new(id: impl Into<NodeId>, node_type: impl Into<String>, category: NodeCategory) -> Self {
        let id = id.into();
        Self {
            name: id.to_string(),
            id,
            node_type: node_type.into(),
            category,
            config: empty_config(),
            is_enabled: true,
        }
    }

    /// Creates a trigger node.
    #[must_use]
    pub fn trigger(id: impl Into<NodeId>, node_type: impl Into<String>) -> Self {
        Self::new(id, node_type, NodeCategory::Trigger)
    }

    /// Creates an action node.
    #[must_use]
    pub fn action(id: impl Into<NodeId>, node_type: impl Into<String>) -> Self {
        Self::new(id, node_type, NodeCategory::Action)
    }

    /// Creates a transform node.
    #[must_use]
    pub fn transform(id: impl Into<NodeId>, node_type: impl Into<String>) -> Self {
        Self::new(id, node_type, NodeCategory::Transform)
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the connector config.
    #[must_use]
    pub fn with_config(mut self, config: JsonValue) -> Self {
        self.config = config;
        self
    }

    /// Marks the node disabled; disabled nodes are skipped at run time.
    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.is_enabled = false;
        self
    }

    #[must_use]
    pub fn is_trigger(&self) -> bool {
        self.category == NodeCategory::Trigger
    }

    /// Per-node timeout override from the `timeoutMs` config key.
    #[must_use]
    pub fn timeout_override(&self) -> Option<Duration> {
        self.config
            .get(TIMEOUT_KEY)
            .and_then(JsonValue::as_u64)
            .map(Duration::from_millis)
    }

    /// Duration estimate override from the `estimatedDurationMs` config key.
    #[must_use]
    pub fn estimate_override(&self) -> Option<u64> {
        self.config.get(ESTIMATE_KEY).and_then(JsonValue::as_u64)
    }
}
