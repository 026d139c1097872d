//! Adapter trait and related types.
//!
//! Every connector, whatever service it talks to, implements [`Adapter`].
//! The workflow engine only ever sees this one interface.

use crate::error::AdapterError;
use async_trait::async_trait;
use rootcause::prelude::Report;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::time::Instant;
use switchyard_core::{RunMode, TenantId, UserId, WorkflowId, WorkflowRunId};

/// Information about an adapter implementation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterInfo {
    /// Connector id this adapter executes, e.g. `core.httpRequest`.
    pub connector_id: String,
    /// Connector version the adapter was built for.
    pub version: String,
    /// Human-readable description.
    pub description: String,
}

/// Metadata about the run an adapter is executing within.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub run_id: WorkflowRunId,
    pub workflow_id: WorkflowId,
    pub mode: RunMode,
    pub triggered_by: Option<UserId>,
    pub node_id: String,
    pub node_type: String,
}

/// Everything an adapter receives for one node execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub tenant_id: TenantId,
    /// Node config with templates already rendered.
    pub config: JsonValue,
    /// Merged inputs: the run input plus outputs of completed predecessors.
    pub inputs: JsonValue,
    pub run: RunMetadata,
}

impl ExecutionContext {
    /// Returns a string config field.
    #[must_use]
    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(JsonValue::as_str)
    }

    /// Returns a required string config field.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the field is missing or not a string.
    pub fn require_str(&self, key: &str) -> Result<&str, Report<AdapterError>> {
        self.config_str(key).ok_or_else(|| {
            AdapterError::InvalidConfig {
                reason: format!("'{key}' must be a string"),
            }
            .into()
        })
    }
}

/// The outcome of one adapter call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterResult {
    pub success: bool,
    pub output: Option<JsonValue>,
    pub error_message: Option<String>,
    pub duration_ms: u64,
}

impl AdapterResult {
    /// Creates a successful result.
    #[must_use]
    pub fn success(output: JsonValue, duration_ms: u64) -> Self {
        Self {
            success: true,
            output: Some(output),
            error_message: None,
            duration_ms,
        }
    }

    /// Creates a failed result.
    #[must_use]
    pub fn failure(error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            success: false,
            output: None,
            error_message: Some(error.into()),
            duration_ms,
        }
    }
}

/// Trait for connector adapters.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Returns information about this adapter.
    fn info(&self) -> AdapterInfo;

    /// Performs the connector's operation and returns its output.
    ///
    /// # Errors
    ///
    /// Returns an error if the operation fails; the engine records it on the
    /// node result.
    async fn execute(&self, ctx: &ExecutionContext) -> Result<JsonValue, Report<AdapterError>>;

    /// Executes and classifies the outcome, measuring wall-clock duration.
    async fn invoke(&self, ctx: &ExecutionContext) -> AdapterResult {
        let started = Instant::now();
        let outcome = self.execute(ctx).await;
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        match outcome {
            Ok(output) => AdapterResult::success(output, duration_ms),
            Err(report) => AdapterResult::failure(report.to_string(), duration_ms),
        }
    }
}
