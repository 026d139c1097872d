//! Trigger records for workflow initiation.
//!
//! Triggers point at trigger-category nodes in the workflow graph and
//! describe what starts a run. The engine does not schedule anything; the
//! records tell the caller which run mode a trigger produces.

use crate::node::NodeId;
use serde::{Deserialize, Serialize};
use switchyard_core::{RunMode, TriggerId};

/// The type of trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    /// Time-based trigger with cron expression.
    Schedule,
    /// HTTP webhook trigger.
    Webhook,
    /// External event trigger (e.g., a connector event).
    Event,
    /// Manual trigger (user-initiated).
    Manual,
}

/// Configuration for a trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerConfig {
    /// Cron-style scheduled trigger.
    Schedule {
        /// Cron expression (e.g., "0 7 * * *" for 7am daily).
        cron: String,
        /// Timezone for the schedule.
        #[serde(default)]
        timezone: Option<String>,
    },
    /// HTTP webhook trigger.
    Webhook {
        /// The webhook path (e.g., "/hooks/my-workflow").
        path: String,
    },
    /// External event trigger.
    Event {
        /// Connector emitting the event.
        source: String,
        /// The event type to listen for.
        event_type: String,
    },
    /// Manual trigger (user-initiated).
    Manual,
}

/// A trigger record attached to a workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trigger {
    /// Unique identifier for this trigger.
    pub id: TriggerId,
    /// The trigger node within the workflow graph.
    pub node_id: NodeId,
    /// Whether this trigger is currently enabled.
    #[serde(default = "enabled")]
    pub enabled: bool,
    pub config: TriggerConfig,
}

fn enabled() -> bool {
    true
}

impl Trigger {
    /// Creates a new enabled trigger.
    #[must_use]
    pub fn new(node_id: impl Into<NodeId>, config: TriggerConfig) -> Self {
        Self {
            id: TriggerId::new(),
            node_id: node_id.into(),
            enabled: true,
            config,
        }
    }

    /// Creates a manual trigger.
    #[must_use]
    pub fn manual(node_id: impl Into<NodeId>) -> Self {
        Self::new(node_id, TriggerConfig::Manual)
    }

    /// Returns the trigger type.
    #[must_use]
    pub fn trigger_type(&self) -> TriggerType {
        match &self.config {
            TriggerConfig::Schedule { .. } => TriggerType::Schedule,
            TriggerConfig::Webhook { .. } => TriggerType::Webhook,
            TriggerConfig::Event { .. } => TriggerType::Event,
            TriggerConfig::Manual => TriggerType::Manual,
        }
    }

    /// The mode of runs started by this trigger.
    #[must_use]
    pub fn run_mode(&self) -> RunMode {
        match self.trigger_type() {
            TriggerType::Manual => RunMode::Manual,
            TriggerType::Schedule => RunMode::Scheduled,
            TriggerType::Webhook | TriggerType::Event => RunMode::Triggered,
        }
    }

    /// Enables this trigger.
    pub fn enable(&mut self) {
        self.enabled = true;
    }

    /// Disables this trigger.
    pub fn disable(&mut self) {
        self.enabled = false;
    }
}
