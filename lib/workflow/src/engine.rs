//! The workflow execution engine.
//!
//! One coordinator per run drives a [`RemainingWork`] graph:
//! 1. Decide every ready node: skip it (disabled, or no inbound edge taken)
//!    or render its config and spawn it onto a `JoinSet`
//! 2. Node tasks wait on a per-run semaphore, then check for cancellation
//!    before calling their adapter under a timeout
//! 3. Each finished node is removed from the remaining work, which may make
//!    its successors ready
//! 4. When nothing is ready or in flight, the run is finalized
//!
//! Node failures stay on their `NodeExecutionResult`; nothing an adapter
//! does can unwind through the engine. Faults that stop a run from being
//! scheduled at all become a `Failed` run with an error message.

use crate::config::EngineConfig;
use crate::definition::Workflow;
use crate::edge::Edge;
use crate::error::{ExecutionError, GraphError};
use crate::execution::{NodeExecutionResult, NodeStatus, RunStatus, WorkflowRun};
use crate::expression::{self, ExpressionEvaluator};
use crate::graph::WorkflowGraph;
use crate::node::{NodeId, WorkflowNode};
use crate::plan::ExecutionPlan;
use crate::remaining_work::RemainingWork;
use futures::FutureExt;
use rootcause::prelude::Report;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use switchyard_core::{RunMode, WorkflowId, WorkflowRunId};
use switchyard_integration::{Adapter, AdapterFactory, ExecutionContext, RunMetadata};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Progress notifications published while a run executes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ExecutionEvent {
    RunStarted {
        run_id: WorkflowRunId,
        workflow_id: WorkflowId,
        total_nodes: usize,
    },
    NodeStarted {
        run_id: WorkflowRunId,
        node_id: NodeId,
        node_type: String,
    },
    /// A node reached a terminal status, including skips.
    NodeFinished {
        run_id: WorkflowRunId,
        result: NodeExecutionResult,
    },
    /// Finished nodes over nodes not skipped, as a whole percentage.
    Progress {
        run_id: WorkflowRunId,
        percent: u8,
        current_node_id: NodeId,
        current_node_type: String,
    },
    RunFinished {
        run_id: WorkflowRunId,
        status: RunStatus,
        error_message: Option<String>,
    },
}

type EventSender = mpsc::UnboundedSender<ExecutionEvent>;

fn emit(events: Option<&EventSender>, event: ExecutionEvent) {
    if let Some(tx) = events
        && tx.send(event).is_err()
    {
        debug!("execution event receiver dropped");
    }
}

/// Cooperative cancellation for a run.
///
/// Cancelling stops nodes that have not started; adapter calls already in
/// flight run to completion or to their timeout.
#[derive(Debug, Clone, Default)]
pub struct RunHandle {
    token: CancellationToken,
}

impl RunHandle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Executes workflow runs against a configured adapter factory.
#[derive(Debug)]
pub struct ExecutionEngine {
    factory: Arc<AdapterFactory>,
    config: EngineConfig,
    evaluator: ExpressionEvaluator,
    events: Option<EventSender>,
}

impl ExecutionEngine {
    #[must_use]
    pub fn new(factory: Arc<AdapterFactory>, config: EngineConfig) -> Self {
        Self {
            factory,
            config,
            evaluator: ExpressionEvaluator::new(),
            events: None,
        }
    }

    /// Publishes [`ExecutionEvent`]s for every run to `events`.
    #[must_use]
    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Computes the execution plan for a workflow.
    ///
    /// # Errors
    ///
    /// Returns `CycleDetected` if the graph is not acyclic.
    pub fn plan(&self, workflow: &Workflow) -> Result<ExecutionPlan, Report<GraphError>> {
        ExecutionPlan::build(workflow.graph(), self.config.default_node_estimate_ms)
    }

    /// Executes a pending run to a terminal status.
    pub async fn execute(&self, workflow: &Workflow, run: WorkflowRun) -> WorkflowRun {
        self.execute_with_handle(workflow, run, &RunHandle::new())
            .await
    }

    /// Executes a pending run, stopping early if `handle` is cancelled.
    ///
    /// A run that is not pending is returned unchanged.
    #[instrument(skip_all, fields(run_id = %run.id, workflow_id = %workflow.id, mode = %run.mode))]
    pub async fn execute_with_handle(
        &self,
        workflow: &Workflow,
        mut run: WorkflowRun,
        handle: &RunHandle,
    ) -> WorkflowRun {
        if let Err(report) = run.start() {
            warn!(status = %run.status(), error = %report, "run is not pending; leaving it unchanged");
            return run;
        }
        let total_nodes = workflow.graph().node_count();
        info!(total_nodes, "run started");
        self.emit(ExecutionEvent::RunStarted {
            run_id: run.id,
            workflow_id: run.workflow_id,
            total_nodes,
        });

        let (results, outcome) = match self.admit(workflow, &run) {
            Ok(()) => {
                RunDriver::new(self, workflow.graph(), &run, handle)
                    .drive(handle)
                    .await
            }
            Err(error) => (Vec::new(), Err(error)),
        };
        run.node_results = results;
        self.finalize(&mut run, outcome);

        self.emit(ExecutionEvent::RunFinished {
            run_id: run.id,
            status: run.status(),
            error_message: run.error_message.clone(),
        });
        run
    }

    /// Executes a single node outside of a run's schedule.
    ///
    /// The node's config is rendered against the run's input and the
    /// results it already holds.
    pub async fn execute_node(
        &self,
        node: &WorkflowNode,
        run: &WorkflowRun,
        inputs: JsonValue,
    ) -> NodeExecutionResult {
        let context = expression::context(run, &run.node_results);
        match self.prepare(node, run, inputs, &context) {
            Ok(job) => run_node(job).await,
            Err(failed) => failed,
        }
    }

    fn emit(&self, event: ExecutionEvent) {
        emit(self.events.as_ref(), event);
    }

    fn admit(&self, workflow: &Workflow, run: &WorkflowRun) -> Result<(), ExecutionError> {
        if run.workflow_id != workflow.id {
            return Err(ExecutionError::Unschedulable {
                reason: format!(
                    "run targets workflow {} but workflow {} was supplied",
                    run.workflow_id, workflow.id
                ),
            });
        }
        if !workflow.is_active && run.mode != RunMode::Test {
            return Err(ExecutionError::Unschedulable {
                reason: "workflow is inactive".to_string(),
            });
        }
        if workflow.graph().is_cyclic() {
            return Err(ExecutionError::Unschedulable {
                reason: "graph contains a cycle".to_string(),
            });
        }
        Ok(())
    }

    /// Renders config and resolves the adapter; a render failure is
    /// returned as the node's failed result.
    fn prepare(
        &self,
        node: &WorkflowNode,
        run: &WorkflowRun,
        inputs: JsonValue,
        context: &JsonValue,
    ) -> Result<NodeJob, NodeExecutionResult> {
        let config = match self.evaluator.render(&node.config, context) {
            Ok(config) => config,
            Err(report) => {
                let error = ExecutionError::TemplateFailed {
                    node_id: node.id.clone(),
                    reason: report.to_string(),
                };
                warn!(run_id = %run.id, node_id = %node.id, %error, "node failed");
                return Err(NodeExecutionResult::started(run.id, node, inputs).fail(error.to_string(), 0));
            }
        };

        Ok(NodeJob {
            adapter: self.factory.create(&node.node_type),
            timeout: node
                .timeout_override()
                .unwrap_or_else(|| self.config.node_timeout()),
            context: ExecutionContext {
                tenant_id: run.tenant_id,
                config,
                inputs,
                run: RunMetadata {
                    run_id: run.id,
                    workflow_id: run.workflow_id,
                    mode: run.mode,
                    triggered_by: run.triggered_by,
                    node_id: node.id.to_string(),
                    node_type: node.node_type.clone(),
                },
            },
            node: node.clone(),
            run_id: run.id,
        })
    }

    fn finalize(&self, run: &mut WorkflowRun, outcome: Result<Outcome, ExecutionError>) {
        let transition = match outcome {
            Ok(Outcome::Cancelled) => {
                info!(results = run.node_results.len(), "run cancelled");
                run.cancel()
            }
            Ok(Outcome::Finished) => {
                let failed: Vec<NodeId> = run.failed_nodes().into_iter().cloned().collect();
                if failed.is_empty() {
                    info!(results = run.node_results.len(), "run completed");
                    run.complete()
                } else {
                    let error = ExecutionError::NodesFailed { node_ids: failed };
                    warn!(%error, "run failed");
                    run.fail(error.to_string())
                }
            }
            Err(error) => {
                error!(%error, "run could not be executed");
                run.fail(error.to_string())
            }
        };
        if let Err(report) = transition {
            error!(error = %report, "run could not be finalized");
        }
    }
}

enum Outcome {
    Finished,
    Cancelled,
}

/// Everything a spawned node task owns.
struct NodeJob {
    node: WorkflowNode,
    adapter: Option<Arc<dyn Adapter>>,
    context: ExecutionContext,
    timeout: Duration,
    run_id: WorkflowRunId,
}

/// What a node task hands back to the coordinator. `result` is `None` when
/// the run was cancelled before the node started.
struct Dispatched {
    node_id: NodeId,
    result: Option<NodeExecutionResult>,
}

enum Next {
    Joined(Option<Result<Dispatched, tokio::task::JoinError>>),
    Deadline,
}

/// Per-run scheduling state. Results are appended only by the coordinator,
/// in the order nodes finish.
struct RunDriver<'a> {
    engine: &'a ExecutionEngine,
    graph: &'a WorkflowGraph,
    run: &'a WorkflowRun,
    work: RemainingWork,
    results: Vec<NodeExecutionResult>,
    tasks: JoinSet<Dispatched>,
    semaphore: Arc<Semaphore>,
    token: CancellationToken,
    finished: usize,
    skipped: usize,
}

impl<'a> RunDriver<'a> {
    fn new(
        engine: &'a ExecutionEngine,
        graph: &'a WorkflowGraph,
        run: &'a WorkflowRun,
        handle: &RunHandle,
    ) -> Self {
        Self {
            engine,
            graph,
            run,
            work: RemainingWork::from_graph(graph),
            results: Vec::with_capacity(graph.node_count()),
            tasks: JoinSet::new(),
            semaphore: Arc::new(Semaphore::new(engine.config.concurrency())),
            // A child token lets a run deadline stop scheduling without
            // cancelling the caller's handle.
            token: handle.token.child_token(),
            finished: 0,
            skipped: 0,
        }
    }

    async fn drive(
        mut self,
        handle: &RunHandle,
    ) -> (Vec<NodeExecutionResult>, Result<Outcome, ExecutionError>) {
        let outcome = self.run_to_end(handle).await;
        (self.results, outcome)
    }

    async fn run_to_end(&mut self, handle: &RunHandle) -> Result<Outcome, ExecutionError> {
        let deadline = self.engine.config.run_timeout().map(|t| Instant::now() + t);
        let mut timed_out = false;
        let mut task_failure = None;

        loop {
            if !self.token.is_cancelled() {
                self.schedule_ready();
            }
            if self.tasks.is_empty() {
                break;
            }

            let next = match deadline {
                Some(deadline) if !timed_out => tokio::select! {
                    joined = self.tasks.join_next() => Next::Joined(joined),
                    () = tokio::time::sleep_until(deadline) => Next::Deadline,
                },
                _ => Next::Joined(self.tasks.join_next().await),
            };

            match next {
                Next::Deadline => {
                    timed_out = true;
                    warn!(in_flight = self.work.in_flight(), "run deadline reached");
                    self.token.cancel();
                }
                Next::Joined(Some(Ok(dispatched))) => self.on_dispatched(dispatched),
                Next::Joined(Some(Err(join_error))) => {
                    // Stop scheduling but let in-flight nodes finish.
                    error!(error = %join_error, in_flight = self.tasks.len(), "node task failed");
                    self.token.cancel();
                    task_failure.get_or_insert_with(|| join_error.to_string());
                }
                Next::Joined(None) => break,
            }
        }

        if let Some(reason) = task_failure {
            return Err(ExecutionError::Unschedulable {
                reason: format!("node task failed: {reason}"),
            });
        }
        if timed_out {
            return Err(ExecutionError::RunTimeout {
                timeout_ms: self.engine.config.run_timeout_ms.unwrap_or_default(),
            });
        }
        if handle.is_cancelled() && !self.work.is_complete() {
            return Ok(Outcome::Cancelled);
        }
        if !self.work.is_complete() {
            let stuck: Vec<String> = self
                .work
                .unfinished()
                .iter()
                .map(ToString::to_string)
                .collect();
            return Err(ExecutionError::Unschedulable {
                reason: format!("nodes never became ready: {}", stuck.join(", ")),
            });
        }
        Ok(Outcome::Finished)
    }

    /// Decides every ready node. Skips can make further nodes ready, so
    /// this repeats until nothing is left to decide.
    fn schedule_ready(&mut self) {
        let graph = self.graph;
        let run = self.run;
        loop {
            let ready = self.work.ready_nodes();
            if ready.is_empty() {
                return;
            }
            let context = expression::context(run, &self.results);

            for node_id in ready {
                let Some(node) = graph.get_node(node_id.as_str()) else {
                    self.work.mark_finished(&node_id);
                    continue;
                };

                if let Some(reason) = self.skip_reason(node, &context) {
                    info!(run_id = %run.id, node_id = %node.id, reason, "node skipped");
                    self.work.mark_finished(&node_id);
                    self.record(NodeExecutionResult::skipped(run.id, node, reason));
                    continue;
                }

                let inputs = merge_inputs(run, graph, node, &self.results);
                match self.engine.prepare(node, run, inputs, &context) {
                    Ok(job) => {
                        debug!(run_id = %run.id, node_id = %node.id, "node dispatched");
                        self.work.mark_dispatched(&node_id);
                        self.tasks.spawn(dispatch(
                            job,
                            Arc::clone(&self.semaphore),
                            self.token.clone(),
                            self.engine.events.clone(),
                        ));
                    }
                    Err(failed) => {
                        self.work.mark_finished(&node_id);
                        self.record(failed);
                    }
                }
            }
        }
    }

    fn skip_reason(&self, node: &WorkflowNode, context: &JsonValue) -> Option<&'static str> {
        if !node.is_enabled {
            return Some("node is disabled");
        }
        let inbound = self.graph.predecessors(node.id.as_str());
        if inbound.is_empty() {
            return None;
        }
        let taken = inbound
            .iter()
            .any(|(source, edge)| self.edge_taken(source, edge, context));
        (!taken).then_some("no inbound edge was taken")
    }

    /// An unconditional edge is taken when its source succeeded; a
    /// conditional edge when its source ran and the condition holds.
    fn edge_taken(&self, source: &WorkflowNode, edge: &Edge, context: &JsonValue) -> bool {
        let status = latest_status(&self.results, source.id.as_str());
        match edge.condition.as_deref().map(str::trim) {
            Some(condition) if !condition.is_empty() => {
                status.is_some_and(|status| status != NodeStatus::Skipped)
                    && self.engine.evaluator.condition_holds(condition, context)
            }
            _ => status == Some(NodeStatus::Success),
        }
    }

    fn on_dispatched(&mut self, dispatched: Dispatched) {
        self.work.mark_finished(&dispatched.node_id);
        if let Some(result) = dispatched.result {
            self.record(result);
        }
    }

    fn record(&mut self, result: NodeExecutionResult) {
        if result.status == NodeStatus::Skipped {
            self.skipped += 1;
        } else {
            self.finished += 1;
        }
        let events = self.engine.events.as_ref();
        let progress = ExecutionEvent::Progress {
            run_id: self.run.id,
            percent: self.percent(),
            current_node_id: result.node_id.clone(),
            current_node_type: result.node_type.clone(),
        };
        emit(
            events,
            ExecutionEvent::NodeFinished {
                run_id: self.run.id,
                result: result.clone(),
            },
        );
        emit(events, progress);
        self.results.push(result);
    }

    fn percent(&self) -> u8 {
        let required = self.graph.node_count().saturating_sub(self.skipped);
        if required == 0 {
            return 100;
        }
        u8::try_from((self.finished * 100 / required).min(100)).unwrap_or(100)
    }
}

fn latest_status(results: &[NodeExecutionResult], node_id: &str) -> Option<NodeStatus> {
    results
        .iter()
        .rev()
        .find(|result| result.node_id.as_str() == node_id)
        .map(|result| result.status)
}

/// Entry nodes receive the run input unchanged. Other nodes receive the run
/// input (when it is an object) with each successful predecessor's object
/// output merged over it in node order; non-object outputs are keyed by the
/// predecessor's id.
fn merge_inputs(
    run: &WorkflowRun,
    graph: &WorkflowGraph,
    node: &WorkflowNode,
    results: &[NodeExecutionResult],
) -> JsonValue {
    let predecessors = graph.predecessors(node.id.as_str());
    if predecessors.is_empty() {
        return run.input.clone();
    }

    let mut merged = match &run.input {
        JsonValue::Object(input) => input.clone(),
        _ => Map::new(),
    };
    for (predecessor, _) in predecessors {
        let output = results
            .iter()
            .rev()
            .find(|result| result.node_id == predecessor.id)
            .filter(|result| result.status == NodeStatus::Success)
            .and_then(|result| result.output.as_ref());
        match output {
            Some(JsonValue::Object(fields)) => {
                merged.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
            Some(other) => {
                merged.insert(predecessor.id.to_string(), other.clone());
            }
            None => {}
        }
    }
    JsonValue::Object(merged)
}

async fn dispatch(
    job: NodeJob,
    semaphore: Arc<Semaphore>,
    token: CancellationToken,
    events: Option<EventSender>,
) -> Dispatched {
    let node_id = job.node.id.clone();
    // The semaphore is never closed; an error is treated like cancellation.
    let Ok(_permit) = semaphore.acquire_owned().await else {
        return Dispatched {
            node_id,
            result: None,
        };
    };
    if token.is_cancelled() {
        debug!(run_id = %job.run_id, %node_id, "run cancelled before node started");
        return Dispatched {
            node_id,
            result: None,
        };
    }

    emit(
        events.as_ref(),
        ExecutionEvent::NodeStarted {
            run_id: job.run_id,
            node_id: node_id.clone(),
            node_type: job.node.node_type.clone(),
        },
    );
    let result = run_node(job).await;
    Dispatched {
        node_id,
        result: Some(result),
    }
}

#[instrument(skip_all, fields(run_id = %job.run_id, node_id = %job.node.id, node_type = %job.node.node_type))]
async fn run_node(job: NodeJob) -> NodeExecutionResult {
    let NodeJob {
        node,
        adapter,
        context,
        timeout,
        run_id,
    } = job;
    let record = NodeExecutionResult::started(run_id, &node, context.inputs.clone());

    let Some(adapter) = adapter else {
        let error = ExecutionError::UnknownNodeType {
            node_id: node.id.clone(),
            node_type: node.node_type.clone(),
        };
        warn!(%error, "node failed");
        return record.fail(error.to_string(), 0);
    };

    let started = Instant::now();
    let outcome = tokio::time::timeout(
        timeout,
        AssertUnwindSafe(adapter.invoke(&context)).catch_unwind(),
    )
    .await;
    let elapsed_ms = millis(started.elapsed());

    match outcome {
        Ok(Ok(result)) if result.success => {
            info!(duration_ms = result.duration_ms, "node succeeded");
            record.succeed(result.output.unwrap_or(JsonValue::Null), result.duration_ms)
        }
        Ok(Ok(result)) => {
            let message = result
                .error_message
                .unwrap_or_else(|| "adapter reported failure".to_string());
            warn!(duration_ms = result.duration_ms, error = %message, "node failed");
            record.fail(message, result.duration_ms)
        }
        Ok(Err(_panic)) => {
            let error = ExecutionError::AdapterPanicked { node_id: node.id };
            error!(%error, "node failed");
            record.fail(error.to_string(), elapsed_ms)
        }
        Err(_elapsed) => {
            let error = ExecutionError::NodeTimeout {
                node_id: node.id,
                timeout_ms: millis(timeout),
            };
            warn!(%error, "node failed");
            record.fail(error.to_string(), elapsed_ms)
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use switchyard_core::TenantId;
    use switchyard_integration::{AdapterError, AdapterInfo};
    use switchyard_resolver::Version;

    const SCRIPT: &str = "test.script";

    /// Tracks how many script calls are running at once.
    #[derive(Default)]
    struct Probe {
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    /// Test adapter driven by its config: `sleepMs`, `fail`, `panic`, and
    /// `output` (defaults to echoing the inputs).
    struct Script {
        probe: Arc<Probe>,
    }

    #[async_trait]
    impl Adapter for Script {
        fn info(&self) -> AdapterInfo {
            AdapterInfo {
                connector_id: SCRIPT.to_string(),
                version: "1.0.0".to_string(),
                description: "Scripted test adapter".to_string(),
            }
        }

        async fn execute(
            &self,
            ctx: &ExecutionContext,
        ) -> Result<JsonValue, Report<AdapterError>> {
            let now = self.probe.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.probe.peak.fetch_max(now, Ordering::SeqCst);
            if let Some(ms) = ctx.config.get("sleepMs").and_then(JsonValue::as_u64) {
                tokio::time::sleep(Duration::from_millis(ms)).await;
            }
            self.probe.running.fetch_sub(1, Ordering::SeqCst);

            if ctx.config.get("panic").is_some() {
                panic!("script asked to panic");
            }
            if let Some(reason) = ctx.config_str("fail") {
                return Err(AdapterError::InvalidConfig {
                    reason: reason.to_string(),
                }
                .into());
            }
            Ok(ctx
                .config
                .get("output")
                .cloned()
                .unwrap_or_else(|| ctx.inputs.clone()))
        }
    }

    fn engine_with(config: EngineConfig) -> (ExecutionEngine, Arc<Probe>) {
        let probe = Arc::new(Probe::default());
        let factory = AdapterFactory::new().with_adapter(
            SCRIPT,
            Version::new(1, 0, 0),
            Arc::new(Script {
                probe: Arc::clone(&probe),
            }),
        );
        (ExecutionEngine::new(Arc::new(factory), config), probe)
    }

    fn engine() -> (ExecutionEngine, Arc<Probe>) {
        engine_with(EngineConfig::default())
    }

    fn trigger(id: &str) -> WorkflowNode {
        WorkflowNode::trigger(id, SCRIPT)
    }

    fn action(id: &str, config: JsonValue) -> WorkflowNode {
        WorkflowNode::action(id, SCRIPT).with_config(config)
    }

    fn workflow(nodes: Vec<WorkflowNode>, edges: &[(&str, &str)]) -> Workflow {
        let mut workflow = Workflow::new(TenantId::new(), "test");
        for node in nodes {
            workflow.add_node(node).unwrap();
        }
        for (source, target) in edges {
            workflow.connect(source, target).unwrap();
        }
        workflow
    }

    fn test_run(workflow: &Workflow, input: JsonValue) -> WorkflowRun {
        WorkflowRun::new(workflow.id, workflow.tenant_id, RunMode::Test, input)
    }

    fn status_of(run: &WorkflowRun, node_id: &str) -> Option<NodeStatus> {
        run.result_for(node_id).map(|result| result.status)
    }

    #[tokio::test]
    async fn trigger_then_action_completes_in_order() {
        let (engine, _) = engine();
        let wf = workflow(vec![trigger("a"), action("b", json!({}))], &[("a", "b")]);

        let run = engine.execute(&wf, test_run(&wf, json!({"x": 1}))).await;

        assert_eq!(run.status(), RunStatus::Completed);
        assert!(run.error_message.is_none());
        assert_eq!(run.node_results.len(), 2);
        let a = &run.node_results[0];
        let b = &run.node_results[1];
        assert_eq!(a.node_id.as_str(), "a");
        assert_eq!(b.node_id.as_str(), "b");
        assert_eq!(a.status, NodeStatus::Success);
        assert_eq!(b.status, NodeStatus::Success);
        assert!(a.finished_at.unwrap() <= b.started_at.unwrap());
        assert!(run.start_time.is_some() && run.end_time.is_some());
    }

    #[tokio::test]
    async fn false_condition_skips_and_run_completes() {
        let (engine, _) = engine();
        let mut wf = workflow(
            vec![trigger("a"), action("b", json!({})), action("c", json!({}))],
            &[("b", "c")],
        );
        wf.connect_when("a", "b", "input.approved == true").unwrap();

        let run = engine
            .execute(&wf, test_run(&wf, json!({"approved": false})))
            .await;

        assert_eq!(run.status(), RunStatus::Completed);
        assert_eq!(status_of(&run, "a"), Some(NodeStatus::Success));
        assert_eq!(status_of(&run, "b"), Some(NodeStatus::Skipped));
        assert_eq!(status_of(&run, "c"), Some(NodeStatus::Skipped));
    }

    #[tokio::test]
    async fn true_condition_runs_branch() {
        let (engine, _) = engine();
        let mut wf = workflow(vec![trigger("a"), action("b", json!({}))], &[]);
        wf.connect_when("a", "b", "input.approved == true").unwrap();

        let run = engine
            .execute(&wf, test_run(&wf, json!({"approved": true})))
            .await;
        assert_eq!(status_of(&run, "b"), Some(NodeStatus::Success));
    }

    #[tokio::test]
    async fn failure_branch_runs_and_run_fails() {
        let (engine, _) = engine();
        let mut wf = workflow(
            vec![
                trigger("a"),
                action("b", json!({"fail": "upstream rejected"})),
                action("notify", json!({})),
                action("next", json!({})),
            ],
            &[("a", "b"), ("b", "next")],
        );
        wf.connect_when("b", "notify", "nodes.b.status == 'failed'")
            .unwrap();

        let run = engine.execute(&wf, test_run(&wf, json!({}))).await;

        assert_eq!(status_of(&run, "b"), Some(NodeStatus::Failed));
        assert!(
            run.result_for("b")
                .unwrap()
                .error_message
                .as_deref()
                .unwrap()
                .contains("upstream rejected")
        );
        assert_eq!(status_of(&run, "notify"), Some(NodeStatus::Success));
        assert_eq!(status_of(&run, "next"), Some(NodeStatus::Skipped));
        assert_eq!(run.status(), RunStatus::Failed);
        assert_eq!(run.error_message.as_deref(), Some("required nodes failed: b"));
    }

    #[tokio::test]
    async fn join_runs_when_any_inbound_edge_is_taken() {
        let (engine, _) = engine();
        let mut wf = workflow(
            vec![
                trigger("a"),
                action("left", json!({})),
                action("right", json!({})),
                action("join", json!({})),
            ],
            &[("a", "right"), ("left", "join"), ("right", "join")],
        );
        wf.connect_when("a", "left", "false").unwrap();

        let run = engine.execute(&wf, test_run(&wf, json!({}))).await;

        assert_eq!(status_of(&run, "left"), Some(NodeStatus::Skipped));
        assert_eq!(status_of(&run, "join"), Some(NodeStatus::Success));
        assert_eq!(run.status(), RunStatus::Completed);
    }

    #[tokio::test]
    async fn unknown_node_type_fails_run() {
        let (engine, _) = engine();
        let wf = workflow(
            vec![trigger("a"), WorkflowNode::action("b", "svc.unknown")],
            &[("a", "b")],
        );

        let run = engine.execute(&wf, test_run(&wf, json!({}))).await;

        assert_eq!(status_of(&run, "b"), Some(NodeStatus::Failed));
        assert!(
            run.result_for("b")
                .unwrap()
                .error_message
                .as_deref()
                .unwrap()
                .contains("no adapter available for type 'svc.unknown'")
        );
        assert_eq!(run.status(), RunStatus::Failed);
        assert!(run.error_message.unwrap().contains("b"));
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_node_fails_like_any_other() {
        let (engine, _) = engine();
        let mut wf = workflow(
            vec![
                trigger("a"),
                action("slow", json!({"sleepMs": 1_000, "timeoutMs": 50})),
                action("after", json!({})),
                action("cleanup", json!({})),
            ],
            &[("a", "slow"), ("slow", "after")],
        );
        wf.connect_when("slow", "cleanup", "nodes.slow.status == 'failed'")
            .unwrap();

        let run = engine.execute(&wf, test_run(&wf, json!({}))).await;

        let slow = run.result_for("slow").unwrap();
        assert_eq!(slow.status, NodeStatus::Failed);
        assert_eq!(
            slow.error_message.as_deref(),
            Some("node slow timed out after 50ms")
        );
        assert_eq!(status_of(&run, "after"), Some(NodeStatus::Skipped));
        assert_eq!(status_of(&run, "cleanup"), Some(NodeStatus::Success));
        assert_eq!(run.status(), RunStatus::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn in_flight_nodes_are_bounded() {
        let (engine, probe) = engine_with(EngineConfig {
            max_concurrent_nodes: 2,
            ..EngineConfig::default()
        });
        let nodes = (0..6)
            .map(|i| action(&format!("n{i}"), json!({"sleepMs": 20})))
            .collect();
        let wf = workflow(nodes, &[]);

        let run = engine.execute(&wf, test_run(&wf, json!({}))).await;

        assert_eq!(run.status(), RunStatus::Completed);
        assert_eq!(run.node_results.len(), 6);
        assert_eq!(probe.peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn independent_branches_run_in_parallel() {
        let (engine, probe) = engine();
        let wf = workflow(
            vec![
                trigger("a"),
                action("x", json!({"sleepMs": 20})),
                action("y", json!({"sleepMs": 20})),
                action("z", json!({"sleepMs": 20})),
            ],
            &[("a", "x"), ("a", "y"), ("a", "z")],
        );

        let run = engine.execute(&wf, test_run(&wf, json!({}))).await;

        assert_eq!(run.status(), RunStatus::Completed);
        assert_eq!(probe.peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_awaits_in_flight_and_starts_nothing_new() {
        let (engine, _) = engine();
        let wf = workflow(
            vec![
                WorkflowNode::trigger("a", SCRIPT).with_config(json!({"sleepMs": 100})),
                action("b", json!({})),
            ],
            &[("a", "b")],
        );
        let handle = RunHandle::new();
        let canceller = handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });

        let run = engine
            .execute_with_handle(&wf, test_run(&wf, json!({})), &handle)
            .await;

        assert_eq!(run.status(), RunStatus::Cancelled);
        assert_eq!(status_of(&run, "a"), Some(NodeStatus::Success));
        assert!(run.result_for("b").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_after_last_node_started_still_completes() {
        let (engine, _) = engine();
        let wf = workflow(
            vec![WorkflowNode::trigger("a", SCRIPT).with_config(json!({"sleepMs": 100}))],
            &[],
        );
        let handle = RunHandle::new();
        let canceller = handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });

        let run = engine
            .execute_with_handle(&wf, test_run(&wf, json!({})), &handle)
            .await;

        assert!(handle.is_cancelled());
        assert_eq!(run.status(), RunStatus::Completed);
        assert_eq!(status_of(&run, "a"), Some(NodeStatus::Success));
    }

    /// Panics when dropped before finishing, which happens outside the
    /// adapter's unwind guard once the node times out.
    struct PanicOnDrop;

    impl Drop for PanicOnDrop {
        fn drop(&mut self) {
            if !std::thread::panicking() {
                panic!("adapter future dropped mid-call");
            }
        }
    }

    struct Bomb;

    #[async_trait]
    impl Adapter for Bomb {
        fn info(&self) -> AdapterInfo {
            AdapterInfo {
                connector_id: "test.bomb".to_string(),
                version: "1.0.0".to_string(),
                description: "Breaks its node task".to_string(),
            }
        }

        async fn execute(
            &self,
            _ctx: &ExecutionContext,
        ) -> Result<JsonValue, Report<AdapterError>> {
            let guard = PanicOnDrop;
            tokio::time::sleep(Duration::from_secs(60)).await;
            std::mem::forget(guard);
            Ok(JsonValue::Null)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn broken_node_task_lets_in_flight_nodes_finish() {
        let probe = Arc::new(Probe::default());
        let factory = AdapterFactory::new()
            .with_adapter(
                SCRIPT,
                Version::new(1, 0, 0),
                Arc::new(Script {
                    probe: Arc::clone(&probe),
                }),
            )
            .with_adapter("test.bomb", Version::new(1, 0, 0), Arc::new(Bomb));
        let engine = ExecutionEngine::new(Arc::new(factory), EngineConfig::default());
        let wf = workflow(
            vec![
                WorkflowNode::action("bomb", "test.bomb").with_config(json!({"timeoutMs": 10})),
                action("slow", json!({"sleepMs": 200})),
                action("after", json!({})),
            ],
            &[("slow", "after")],
        );

        let run = engine.execute(&wf, test_run(&wf, json!({}))).await;

        assert_eq!(run.status(), RunStatus::Failed);
        assert!(
            run.error_message
                .as_deref()
                .unwrap()
                .contains("node task failed")
        );
        assert_eq!(status_of(&run, "slow"), Some(NodeStatus::Success));
        assert!(run.result_for("after").is_none());
        assert_eq!(probe.running.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancelled_before_start_runs_nothing() {
        let (engine, _) = engine();
        let wf = workflow(vec![trigger("a")], &[]);
        let handle = RunHandle::new();
        handle.cancel();

        let run = engine
            .execute_with_handle(&wf, test_run(&wf, json!({})), &handle)
            .await;

        assert_eq!(run.status(), RunStatus::Cancelled);
        assert!(run.node_results.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn run_deadline_fails_the_run() {
        let (engine, _) = engine_with(EngineConfig {
            run_timeout_ms: Some(50),
            ..EngineConfig::default()
        });
        let wf = workflow(
            vec![
                WorkflowNode::trigger("a", SCRIPT).with_config(json!({"sleepMs": 200})),
                action("b", json!({})),
            ],
            &[("a", "b")],
        );

        let run = engine.execute(&wf, test_run(&wf, json!({}))).await;

        assert_eq!(run.status(), RunStatus::Failed);
        assert_eq!(run.error_message.as_deref(), Some("run timed out after 50ms"));
        assert_eq!(status_of(&run, "a"), Some(NodeStatus::Success));
        assert!(run.result_for("b").is_none());
    }

    #[tokio::test]
    async fn events_report_progress() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (engine, _) = engine();
        let engine = engine.with_events(tx);
        let mut wf = workflow(vec![trigger("a"), action("b", json!({}))], &[]);
        wf.connect_when("a", "b", "false").unwrap();

        let run = engine.execute(&wf, test_run(&wf, json!({}))).await;

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert!(matches!(
            events.first(),
            Some(ExecutionEvent::RunStarted { total_nodes: 2, .. })
        ));
        assert!(matches!(
            events.last(),
            Some(ExecutionEvent::RunFinished {
                status: RunStatus::Completed,
                ..
            })
        ));
        let started = events
            .iter()
            .filter(|e| matches!(e, ExecutionEvent::NodeStarted { .. }))
            .count();
        assert_eq!(started, 1);

        let progress: Vec<(u8, &str)> = events
            .iter()
            .filter_map(|e| match e {
                ExecutionEvent::Progress {
                    percent,
                    current_node_id,
                    ..
                } => Some((*percent, current_node_id.as_str())),
                _ => None,
            })
            .collect();
        assert_eq!(progress, vec![(50, "a"), (100, "b")]);
        assert_eq!(run.status(), RunStatus::Completed);
    }

    #[test]
    fn events_serialize_with_tag() {
        let event = ExecutionEvent::Progress {
            run_id: WorkflowRunId::new(),
            percent: 40,
            current_node_id: NodeId::from("b"),
            current_node_type: SCRIPT.to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "progress");
        assert_eq!(json["currentNodeId"], "b");
        assert_eq!(json["percent"], 40);
    }

    #[tokio::test]
    async fn config_templates_render_before_the_call() {
        let (engine, _) = engine();
        let wf = workflow(
            vec![
                WorkflowNode::trigger("a", SCRIPT).with_config(json!({"output": {"n": 3}})),
                action(
                    "b",
                    json!({"output": {
                        "greeting": "Hello {{ input.name }}",
                        "count": "{{ nodes.a.output.n }}"
                    }}),
                ),
            ],
            &[("a", "b")],
        );

        let run = engine
            .execute(&wf, test_run(&wf, json!({"name": "Ada"})))
            .await;

        let output = run.result_for("b").unwrap().output.clone().unwrap();
        assert_eq!(output["greeting"], "Hello Ada");
        assert_eq!(output["count"], json!(3));
    }

    #[tokio::test]
    async fn broken_template_fails_the_node() {
        let (engine, _) = engine();
        let wf = workflow(
            vec![trigger("a"), action("b", json!({"output": "{{ input.name"}))],
            &[("a", "b")],
        );

        let run = engine.execute(&wf, test_run(&wf, json!({}))).await;

        let b = run.result_for("b").unwrap();
        assert_eq!(b.status, NodeStatus::Failed);
        assert!(b.error_message.as_deref().unwrap().contains("could not be rendered"));
        assert_eq!(run.status(), RunStatus::Failed);
    }

    #[tokio::test]
    async fn inputs_merge_predecessor_outputs() {
        let (engine, _) = engine();
        let wf = workflow(
            vec![
                WorkflowNode::trigger("a", SCRIPT).with_config(json!({"output": {"x": 1}})),
                WorkflowNode::trigger("b", SCRIPT).with_config(json!({"output": 5})),
                action("c", json!({})),
            ],
            &[("a", "c"), ("b", "c")],
        );

        let run = engine
            .execute(&wf, test_run(&wf, json!({"seed": true})))
            .await;

        assert_eq!(run.result_for("a").unwrap().input, json!({"seed": true}));
        assert_eq!(
            run.result_for("c").unwrap().input,
            json!({"seed": true, "x": 1, "b": 5})
        );
    }

    #[tokio::test]
    async fn disabled_nodes_are_skipped() {
        let (engine, probe) = engine();
        let wf = workflow(
            vec![trigger("a"), action("b", json!({})).disabled(), action("c", json!({}))],
            &[("a", "b"), ("b", "c")],
        );

        let run = engine.execute(&wf, test_run(&wf, json!({}))).await;

        assert_eq!(status_of(&run, "b"), Some(NodeStatus::Skipped));
        assert_eq!(status_of(&run, "c"), Some(NodeStatus::Skipped));
        assert_eq!(run.status(), RunStatus::Completed);
        assert_eq!(probe.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn panicking_adapter_fails_only_its_node() {
        let (engine, _) = engine();
        let wf = workflow(
            vec![trigger("a"), action("boom", json!({"panic": true})), action("ok", json!({}))],
            &[("a", "boom"), ("a", "ok")],
        );

        let run = engine.execute(&wf, test_run(&wf, json!({}))).await;

        assert_eq!(status_of(&run, "boom"), Some(NodeStatus::Failed));
        assert!(
            run.result_for("boom")
                .unwrap()
                .error_message
                .as_deref()
                .unwrap()
                .contains("panicked")
        );
        assert_eq!(status_of(&run, "ok"), Some(NodeStatus::Success));
        assert_eq!(run.status(), RunStatus::Failed);
    }

    #[tokio::test]
    async fn cyclic_graph_fails_the_run() {
        let (engine, _) = engine();
        let wf = workflow(
            vec![trigger("a"), action("b", json!({})), action("c", json!({}))],
            &[("a", "b"), ("b", "c"), ("c", "b")],
        );

        let run = engine.execute(&wf, test_run(&wf, json!({}))).await;

        assert_eq!(run.status(), RunStatus::Failed);
        assert!(run.error_message.unwrap().contains("cycle"));
        assert!(run.node_results.is_empty());
    }

    #[tokio::test]
    async fn submission_is_checked_against_the_workflow() {
        let (engine, _) = engine();
        let wf = workflow(vec![trigger("a")], &[]);
        let other = workflow(vec![trigger("a")], &[]);

        let run = engine.execute(&wf, test_run(&other, json!({}))).await;
        assert_eq!(run.status(), RunStatus::Failed);
        assert!(run.error_message.unwrap().contains("targets workflow"));

        let mut inactive = workflow(vec![trigger("a")], &[]);
        inactive.deactivate();
        let manual = WorkflowRun::new(inactive.id, inactive.tenant_id, RunMode::Manual, json!({}));
        let run = engine.execute(&inactive, manual).await;
        assert_eq!(run.status(), RunStatus::Failed);
        assert!(run.error_message.unwrap().contains("inactive"));

        let run = engine.execute(&inactive, test_run(&inactive, json!({}))).await;
        assert_eq!(run.status(), RunStatus::Completed);
    }

    #[tokio::test]
    async fn started_runs_are_returned_unchanged() {
        let (engine, _) = engine();
        let wf = workflow(vec![trigger("a")], &[]);
        let finished = engine.execute(&wf, test_run(&wf, json!({}))).await;

        let again = engine.execute(&wf, finished.clone()).await;
        assert_eq!(again, finished);
    }

    #[tokio::test]
    async fn resubmitted_run_is_independent() {
        let (engine, _) = engine();
        let wf = workflow(
            vec![trigger("a"), action("b", json!({"fail": "flaky"}))],
            &[("a", "b")],
        );
        let failed = engine.execute(&wf, test_run(&wf, json!({"k": 1}))).await;
        assert_eq!(failed.status(), RunStatus::Failed);

        let retried = engine.execute(&wf, failed.resubmit()).await;
        assert_ne!(retried.id, failed.id);
        assert_eq!(retried.input, failed.input);
        assert_eq!(retried.node_results.len(), 2);
        assert!(retried.node_results.iter().all(|r| r.run_id == retried.id));
        assert_eq!(failed.status(), RunStatus::Failed);
    }

    #[tokio::test]
    async fn execute_node_directly() {
        let (engine, _) = engine();
        let wf = workflow(vec![trigger("a")], &[]);
        let run = test_run(&wf, json!({"v": 2}));

        let node = action("a", json!({"output": "{{ input.v }}"}));
        let result = engine.execute_node(&node, &run, json!({"in": true})).await;
        assert_eq!(result.status, NodeStatus::Success);
        assert_eq!(result.output, Some(json!(2)));
        assert_eq!(result.input, json!({"in": true}));
        assert_eq!(result.run_id, run.id);

        let missing = WorkflowNode::action("m", "svc.absent");
        let result = engine.execute_node(&missing, &run, json!({})).await;
        assert_eq!(result.status, NodeStatus::Failed);
    }

    #[test]
    fn plan_uses_configured_estimate() {
        let (engine, _) = engine_with(EngineConfig {
            default_node_estimate_ms: 250,
            ..EngineConfig::default()
        });
        let wf = workflow(vec![trigger("a"), action("b", json!({}))], &[("a", "b")]);

        let plan = engine.plan(&wf).unwrap();
        assert_eq!(plan.estimated_duration_ms, 500);
        assert!(plan.position("a").unwrap() < plan.position("b").unwrap());
    }
}
