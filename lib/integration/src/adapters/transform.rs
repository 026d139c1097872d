//! The transform adapter: emits its rendered `output` config.
//!
//! Templates in the node config are rendered by the engine before the call,
//! so `{"output": {"total": "{{ nodes.fetch.output.amount * 2 }}"}}` arrives
//! here with the expression already evaluated.

use crate::adapter::{Adapter, AdapterInfo, ExecutionContext};
use crate::error::AdapterError;
use async_trait::async_trait;
use rootcause::prelude::Report;
use serde_json::Value as JsonValue;
use switchyard_resolver::Version;

/// Connector id of the transform adapter.
pub const CONNECTOR_ID: &str = "core.transform";

/// Reshapes data between nodes.
#[derive(Debug, Clone)]
pub struct TransformAdapter {
    version: Version,
}

impl TransformAdapter {
    #[must_use]
    pub fn new(version: Version) -> Self {
        Self { version }
    }
}

#[async_trait]
impl Adapter for TransformAdapter {
    fn info(&self) -> AdapterInfo {
        AdapterInfo {
            connector_id: CONNECTOR_ID.to_string(),
            version: self.version.to_string(),
            description: "Emits the rendered output template".to_string(),
        }
    }

    async fn execute(&self, ctx: &ExecutionContext) -> Result<JsonValue, Report<AdapterError>> {
        ctx.config.get("output").cloned().ok_or_else(|| {
            AdapterError::InvalidConfig {
                reason: "transform requires an 'output' value".to_string(),
            }
            .into()
        })
    }
}
