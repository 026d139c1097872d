use crate::adapter::{ExecutionContext, RunMetadata};
use serde_json::Value as JsonValue;
use switchyard_core::{RunMode, TenantId, WorkflowId, WorkflowRunId};

pub(crate) fn context(config: JsonValue, inputs: JsonValue) -> ExecutionContext {
    context_for(TenantId::new(), config, inputs)
}

pub(crate) fn context_for(
    tenant_id: TenantId,
    config: JsonValue,
    inputs: JsonValue,
) -> ExecutionContext {
    ExecutionContext {
        tenant_id,
        config,
        inputs,
        run: RunMetadata {
            run_id: WorkflowRunId::new(),
            workflow_id: WorkflowId::new(),
            mode: RunMode::Test,
            triggered_by: None,
            node_id: "node".to_string(),
            node_type: "test.adapter".to_string(),
        },
    }
}
