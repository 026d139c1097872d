//! Execution engine configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tuning knobs for the execution engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum node executions in flight per run.
    pub max_concurrent_nodes: usize,
    /// Timeout for a single node, unless the node sets `timeoutMs`.
    pub node_timeout_ms: u64,
    /// Duration assumed for a node when estimating a plan.
    pub default_node_estimate_ms: u64,
    /// Optional deadline for a whole run.
    pub run_timeout_ms: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_nodes: 8,
            node_timeout_ms: 30_000,
            default_node_estimate_ms: 1_000,
            run_timeout_ms: None,
        }
    }
}

impl EngineConfig {
    /// The concurrency bound, never below one.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.max_concurrent_nodes.max(1)
    }

    #[must_use]
    pub fn node_timeout(&self) -> Duration {
        Duration::from_millis(self.node_timeout_ms)
    }

    #[must_use]
    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_concurrent_nodes, 8);
        assert_eq!(config.node_timeout(), Duration::from_secs(30));
        assert_eq!(config.default_node_estimate_ms, 1_000);
        assert_eq!(config.run_timeout(), None);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let config: EngineConfig =
            serde_json::from_value(json!({"max_concurrent_nodes": 2, "run_timeout_ms": 500}))
                .unwrap();
        assert_eq!(config.max_concurrent_nodes, 2);
        assert_eq!(config.node_timeout_ms, 30_000);
        assert_eq!(config.run_timeout(), Some(Duration::from_millis(500)));
    }

    #[test]
    fn zero_concurrency_still_makes_progress() {
        let config = EngineConfig {
            max_concurrent_nodes: 0,
            ..EngineConfig::default()
        };
        assert_eq!(config.concurrency(), 1);
    }
}
