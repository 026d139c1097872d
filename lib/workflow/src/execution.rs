//! Workflow run and node execution records.
//!
//! A run moves through `Pending -> Running -> {Completed, Failed, Cancelled}`.
//! Only the execution engine drives these transitions, and no transition
//! leaves a terminal state. Node results are finalized exactly once; a retry
//! is a new record, never a mutation of the old one.

use crate::error::WorkflowError;
use crate::node::{NodeId, WorkflowNode};
use chrono::{DateTime, Utc};
use rootcause::prelude::Report;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use switchyard_core::{
    NodeExecutionId, RunMode, TenantId, TriggerId, UserId, WorkflowId, WorkflowRunId,
};

/// The overall status of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Submitted, not yet started.
    Pending,
    /// Run is actively executing.
    Running,
    /// No required node failed.
    Completed,
    /// A required node failed, or the engine could not execute the run.
    Failed,
    /// Run was cancelled.
    Cancelled,
}

impl RunStatus {
    /// Returns true if this is a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Returns true if the state machine permits moving to `next`.
    #[must_use]
    pub fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Running, Self::Completed | Self::Failed | Self::Cancelled)
        )
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The status of a single node within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    /// Waiting for predecessors.
    Pending,
    /// The adapter call is in flight.
    Running,
    /// The adapter reported success.
    Success,
    /// The adapter failed, timed out, or no adapter exists.
    Failed,
    /// Not executed: disabled, or no inbound edge was taken.
    Skipped,
}

impl NodeStatus {
    /// Returns true if this is a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Skipped)
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Execution record for a single node within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeExecutionResult {
    pub id: NodeExecutionId,
    pub run_id: WorkflowRunId,
    pub node_id: NodeId,
    pub node_type: String,
    pub status: NodeStatus,
    /// Merged inputs handed to the adapter.
    pub input: JsonValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub duration_ms: u64,
    /// One for the first attempt; retries count up.
    pub attempt: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl NodeExecutionResult {
    /// A result for a node about to be executed.
    #[must_use]
    pub fn started(run_id: WorkflowRunId, node: &WorkflowNode, input: JsonValue) -> Self {
        Self {
            id: NodeExecutionId::new(),
            run_id,
            node_id: node.id.clone(),
            node_type: node.node_type.clone(),
            status: NodeStatus::Running,
            input,
            output: None,
            error_message: None,
            duration_ms: 0,
            attempt: 1,
            started_at: Some(Utc::now()),
            finished_at: None,
        }
    }

    /// A finalized result for a node that never ran.
    #[must_use]
    pub fn skipped(run_id: WorkflowRunId, node: &WorkflowNode, reason: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: NodeExecutionId::new(),
            run_id,
            node_id: node.id.clone(),
            node_type: node.node_type.clone(),
            status: NodeStatus::Skipped,
            input: JsonValue::Null,
            output: None,
            error_message: Some(reason.into()),
            duration_ms: 0,
            attempt: 1,
            started_at: None,
            finished_at: Some(now),
        }
    }

    /// Finalizes as a success.
    #[must_use]
    pub fn succeed(self, output: JsonValue, duration_ms: u64) -> Self {
        self.finish(NodeStatus::Success, Some(output), None, duration_ms)
    }

    /// Finalizes as a failure.
    #[must_use]
    pub fn fail(self, error: impl Into<String>, duration_ms: u64) -> Self {
        self.finish(NodeStatus::Failed, None, Some(error.into()), duration_ms)
    }

    fn finish(
        mut self,
        status: NodeStatus,
        output: Option<JsonValue>,
        error_message: Option<String>,
        duration_ms: u64,
    ) -> Self {
        self.status = status;
        self.output = output;
        self.error_message = error_message;
        self.duration_ms = duration_ms;
        self.finished_at = Some(Utc::now());
        self
    }

    /// A fresh pending record for retrying this node.
    #[must_use]
    pub fn retry(&self) -> Self {
        Self {
            id: NodeExecutionId::new(),
            run_id: self.run_id,
            node_id: self.node_id.clone(),
            node_type: self.node_type.clone(),
            status: NodeStatus::Pending,
            input: self.input.clone(),
            output: None,
            error_message: None,
            duration_ms: 0,
            attempt: self.attempt.saturating_add(1),
            started_at: None,
            finished_at: None,
        }
    }
}

/// A record of a single workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRun {
    /// Unique identifier for this run.
    pub id: WorkflowRunId,
    /// The workflow being executed.
    pub workflow_id: WorkflowId,
    pub tenant_id: TenantId,
    status: RunStatus,
    pub mode: RunMode,
    /// Input payload the run was submitted with.
    pub input: JsonValue,
    /// The user who started the run, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triggered_by: Option<UserId>,
    /// The trigger that initiated this run, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_id: Option<TriggerId>,
    pub submitted_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// One result per attempted node, in completion order.
    #[serde(default)]
    pub node_results: Vec<NodeExecutionResult>,
}

impl WorkflowRun {
    /// Creates a new pending run.
    #[must_use]
    pub fn new(workflow_id: WorkflowId, tenant_id: TenantId, mode: RunMode, input: JsonValue) -> Self {
        Self {
            id: WorkflowRunId::new(),
            workflow_id,
            tenant_id,
            status: RunStatus::Pending,
            mode,
            input,
            triggered_by: None,
            trigger_id: None,
            submitted_at: Utc::now(),
            start_time: None,
            end_time: None,
            error_message: None,
            node_results: Vec::new(),
        }
    }

    /// Records the user who started the run.
    #[must_use]
    pub fn triggered_by(mut self, user: UserId) -> Self {
        self.triggered_by = Some(user);
        self
    }

    /// Records the trigger that started the run.
    #[must_use]
    pub fn with_trigger(mut self, trigger: TriggerId) -> Self {
        self.trigger_id = Some(trigger);
        self
    }

    #[must_use]
    pub fn status(&self) -> RunStatus {
        self.status
    }

    /// Starts the run.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateTransition` unless the run is pending.
    pub fn start(&mut self) -> Result<(), Report<WorkflowError>> {
        self.transition(RunStatus::Running)?;
        self.start_time = Some(Utc::now());
        Ok(())
    }

    /// Marks the run as completed.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateTransition` unless the run is running.
    pub fn complete(&mut self) -> Result<(), Report<WorkflowError>> {
        self.finish(RunStatus::Completed, None)
    }

    /// Marks the run as failed.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateTransition` unless the run is running.
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), Report<WorkflowError>> {
        self.finish(RunStatus::Failed, Some(error.into()))
    }

    /// Marks the run as cancelled.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateTransition` unless the run is running.
    pub fn cancel(&mut self) -> Result<(), Report<WorkflowError>> {
        self.finish(RunStatus::Cancelled, None)
    }

    fn finish(
        &mut self,
        status: RunStatus,
        error: Option<String>,
    ) -> Result<(), Report<WorkflowError>> {
        self.transition(status)?;
        self.end_time = Some(Utc::now());
        self.error_message = error;
        Ok(())
    }

    fn transition(&mut self, next: RunStatus) -> Result<(), Report<WorkflowError>> {
        if !self.status.can_transition_to(next) {
            return Err(WorkflowError::InvalidStateTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            }
            .into());
        }
        self.status = next;
        Ok(())
    }

    /// A new pending run for the same workflow, mode, and input.
    #[must_use]
    pub fn resubmit(&self) -> Self {
        Self {
            triggered_by: self.triggered_by,
            trigger_id: self.trigger_id,
            ..Self::new(self.workflow_id, self.tenant_id, self.mode, self.input.clone())
        }
    }

    /// The latest result recorded for a node.
    #[must_use]
    pub fn result_for(&self, node_id: &str) -> Option<&NodeExecutionResult> {
        self.node_results
            .iter()
            .rev()
            .find(|result| result.node_id.as_str() == node_id)
    }

    /// Ids of nodes whose result is `Failed`.
    #[must_use]
    pub fn failed_nodes(&self) -> Vec<&NodeId> {
        self.node_results
            .iter()
            .filter(|result| result.status == NodeStatus::Failed)
            .map(|result| &result.node_id)
            .collect()
    }

    /// Returns the duration of the run, if it has started.
    #[must_use]
    pub fn duration(&self) -> Option<chrono::Duration> {
        let start = self.start_time?;
        let end = self.end_time.unwrap_or_else(Utc::now);
        Some(end - start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run() -> WorkflowRun {
        WorkflowRun::new(WorkflowId::new(), TenantId::new(), RunMode::Test, json!({"x": 1}))
    }

    #[test]
    fn happy_path_transitions() {
        let mut run = run();
        assert_eq!(run.status(), RunStatus::Pending);
        run.start().unwrap();
        assert_eq!(run.status(), RunStatus::Running);
        assert!(run.start_time.is_some());
        run.complete().unwrap();
        assert_eq!(run.status(), RunStatus::Completed);
        assert!(run.status().is_terminal());
        assert!(run.end_time.is_some());
        assert!(run.duration().is_some());
    }

    #[test]
    fn terminal_states_are_final() {
        for status in [RunStatus::Completed, RunStatus::Failed, RunStatus::Cancelled] {
            let mut run = run();
            run.start().unwrap();
            match status {
                RunStatus::Completed => run.complete().unwrap(),
                RunStatus::Failed => run.fail("boom").unwrap(),
                _ => run.cancel().unwrap(),
            }
            assert_eq!(run.status(), status);

            assert!(run.start().is_err());
            assert!(run.complete().is_err());
            assert!(run.fail("again").is_err());
            assert!(run.cancel().is_err());
            assert_eq!(run.status(), status);
        }
    }

    #[test]
    fn pending_run_cannot_finish() {
        let mut run = run();
        let err = run.complete().unwrap_err();
        assert!(err.to_string().contains("from pending to completed"));
        assert_eq!(run.status(), RunStatus::Pending);
    }

    #[test]
    fn failure_records_message() {
        let mut run = run();
        run.start().unwrap();
        run.fail("required nodes failed: b").unwrap();
        assert_eq!(run.status(), RunStatus::Failed);
        assert_eq!(run.error_message.as_deref(), Some("required nodes failed: b"));
    }

    #[test]
    fn resubmit_is_a_new_pending_run() {
        let mut failed = run().triggered_by(UserId::new());
        failed.start().unwrap();
        failed.fail("boom").unwrap();

        let again = failed.resubmit();
        assert_ne!(again.id, failed.id);
        assert_eq!(again.status(), RunStatus::Pending);
        assert_eq!(again.workflow_id, failed.workflow_id);
        assert_eq!(again.mode, failed.mode);
        assert_eq!(again.input, failed.input);
        assert_eq!(again.triggered_by, failed.triggered_by);
        assert!(again.error_message.is_none());
        assert_eq!(failed.status(), RunStatus::Failed);
    }

    #[test]
    fn node_results_finalize_once_and_retry_as_new_records() {
        let run = run();
        let node = WorkflowNode::action("b", "svc.sendNotification");
        let result = NodeExecutionResult::started(run.id, &node, json!({"x": 1}));
        assert_eq!(result.status, NodeStatus::Running);

        let failed = result.fail("timed out", 30);
        assert_eq!(failed.status, NodeStatus::Failed);
        assert!(failed.status.is_terminal());
        assert_eq!(failed.duration_ms, 30);
        assert!(failed.finished_at.is_some());

        let retry = failed.retry();
        assert_ne!(retry.id, failed.id);
        assert_eq!(retry.attempt, 2);
        assert_eq!(retry.status, NodeStatus::Pending);
        assert_eq!(retry.input, failed.input);
        assert_eq!(failed.status, NodeStatus::Failed);
    }

    #[test]
    fn result_lookup_and_failed_nodes() {
        let mut run = run();
        let a = WorkflowNode::trigger("a", "core.manualTrigger");
        let b = WorkflowNode::action("b", "core.transform");
        run.node_results
            .push(NodeExecutionResult::started(run.id, &a, json!({})).succeed(json!(1), 1));
        run.node_results
            .push(NodeExecutionResult::started(run.id, &b, json!({})).fail("bad", 2));

        assert_eq!(run.result_for("a").unwrap().output, Some(json!(1)));
        assert_eq!(run.failed_nodes(), vec![&NodeId::from("b")]);
        assert!(run.result_for("zzz").is_none());
    }

    #[test]
    fn run_json_uses_camel_case() {
        let json = serde_json::to_value(run()).unwrap();
        assert_eq!(json["status"], "pending");
        assert_eq!(json["mode"], "test");
        assert!(json.get("workflowId").is_some());
        assert!(json.get("endTime").is_none());
    }
}
