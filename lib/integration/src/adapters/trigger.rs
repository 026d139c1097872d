//! The manual trigger: emits the run input unchanged.

use crate::adapter::{Adapter, AdapterInfo, ExecutionContext};
use crate::error::AdapterError;
use async_trait::async_trait;
use rootcause::prelude::Report;
use serde_json::Value as JsonValue;
use switchyard_resolver::Version;

/// Connector id of the manual trigger.
pub const CONNECTOR_ID: &str = "core.manualTrigger";

/// Starts a run with the caller-supplied input.
#[derive(Debug, Clone)]
pub struct ManualTriggerAdapter {
    version: Version,
}

impl ManualTriggerAdapter {
    #[must_use]
    pub fn new(version: Version) -> Self {
        Self { version }
    }
}

#[async_trait]
impl Adapter for ManualTriggerAdapter {
    fn info(&self) -> AdapterInfo {
        AdapterInfo {
            connector_id: CONNECTOR_ID.to_string(),
            version: self.version.to_string(),
            description: "Starts a workflow with the run input".to_string(),
        }
    }

    async fn execute(&self, ctx: &ExecutionContext) -> Result<JsonValue, Report<AdapterError>> {
        Ok(ctx.inputs.clone())
    }
}
