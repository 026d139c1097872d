//! Command implementations.
//!
//! Each command returns its result as data; `main` decides how to print it
//! and which exit code it maps to.

use crate::config::AppConfig;
use crate::error::CliError;
use rootcause::prelude::Report;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::path::Path;
use std::sync::Arc;
use switchyard_core::RunMode;
use switchyard_integration::adapters::{TracingSink, http, notification, transform, trigger};
use switchyard_integration::{
    AdapterCatalog, AdapterFactory, BuiltinServices, InMemoryCredentialStore,
};
use switchyard_resolver::{
    ConnectorRegistry, ConnectorRegistryEntry, DependencySpec, Lockfile, ResolutionRequest,
    ResolutionResult, ResolutionStrategy, Resolver, Version, VersionRange,
};
use switchyard_workflow::{
    ExecutionEngine, ExecutionEvent, ExecutionPlan, RunHandle, ValidationReport, Workflow,
    WorkflowRun, validation,
};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

/// Outcome of the `run` command.
#[derive(Debug)]
pub enum RunOutcome {
    /// The workflow's connectors could not be resolved; nothing ran.
    Unresolved(ResolutionResult),
    /// The run reached a terminal status.
    Finished(Box<WorkflowRun>),
}

/// Reads and decodes a JSON document.
///
/// # Errors
///
/// Returns `ReadFile` or `InvalidDocument`.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, Report<CliError>> {
    let text = std::fs::read_to_string(path).map_err(|e| CliError::ReadFile {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let value = serde_json::from_str(&text).map_err(|e| CliError::InvalidDocument {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    Ok(value)
}

/// Loads the connector registry from `override_path`, the configured
/// `registry_path`, or the built-in connectors.
///
/// # Errors
///
/// Returns an error if the registry document cannot be read or published.
pub fn load_registry(
    config: &AppConfig,
    override_path: Option<&Path>,
) -> Result<ConnectorRegistry, Report<CliError>> {
    let Some(path) = override_path.or(config.registry_path.as_deref()) else {
        debug!("no registry configured; using built-in connectors");
        return builtin_registry();
    };
    let text = std::fs::read_to_string(path).map_err(|e| CliError::ReadFile {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let registry = ConnectorRegistry::from_json(&text).map_err(|report| CliError::Registry {
        reason: report.to_string(),
    })?;
    info!(path = %path.display(), entries = registry.snapshot().len(), "registry loaded");
    Ok(registry)
}

/// A registry publishing every built-in connector at 1.0.0.
fn builtin_registry() -> Result<ConnectorRegistry, Report<CliError>> {
    let registry = ConnectorRegistry::new();
    for (id, category) in [
        (trigger::CONNECTOR_ID, "trigger"),
        (transform::CONNECTOR_ID, "transform"),
        (notification::CONNECTOR_ID, "action"),
        (http::CONNECTOR_ID, "action"),
    ] {
        registry
            .publish(ConnectorRegistryEntry::new(id, Version::new(1, 0, 0), category))
            .map_err(|report| CliError::Registry {
                reason: report.to_string(),
            })?;
    }
    Ok(registry)
}

fn read_lockfile(path: Option<&Path>) -> Result<Option<Lockfile>, Report<CliError>> {
    path.map(read_json::<Lockfile>).transpose()
}

/// Resolves a request document.
///
/// `--lockfile` and `--strategy` take precedence over the request's own.
///
/// # Errors
///
/// Returns an error only if an input cannot be read; resolution failures
/// are reported in the result.
#[instrument(skip_all, fields(request = %request_path.display()))]
pub fn resolve(
    config: &AppConfig,
    registry: &ConnectorRegistry,
    request_path: &Path,
    lockfile_path: Option<&Path>,
    strategy: Option<ResolutionStrategy>,
) -> Result<ResolutionResult, Report<CliError>> {
    let mut request: ResolutionRequest = read_json(request_path)?;
    if let Some(lockfile) = read_lockfile(lockfile_path)? {
        request.lockfile = Some(lockfile);
    }
    if strategy.is_some() {
        request.strategy = strategy;
    }

    let result =
        Resolver::new(config.resolver.clone()).resolve_request(&registry.snapshot(), &request);
    if result.success {
        info!(resolved = result.resolved_versions.len(), strategy = %result.strategy, "resolution succeeded");
    } else {
        warn!(
            error = result.error_message.as_deref().unwrap_or_default(),
            "resolution failed"
        );
    }
    Ok(result)
}

/// Validates a workflow document; node types must exist in the registry.
///
/// # Errors
///
/// Returns an error if the workflow cannot be read.
pub fn validate(
    registry: &ConnectorRegistry,
    workflow_path: &Path,
) -> Result<ValidationReport, Report<CliError>> {
    let workflow: Workflow = read_json(workflow_path)?;
    let snapshot = registry.snapshot();
    Ok(validation::validate_with_types(&workflow, |node_type| {
        snapshot.contains(node_type)
    }))
}

/// Computes the execution plan of a workflow document.
///
/// # Errors
///
/// Returns an error if the workflow cannot be read or contains a cycle.
pub fn plan(config: &AppConfig, workflow_path: &Path) -> Result<ExecutionPlan, Report<CliError>> {
    let workflow: Workflow = read_json(workflow_path)?;
    let plan = ExecutionPlan::build(workflow.graph(), config.engine.default_node_estimate_ms)
        .map_err(|report| CliError::Plan {
            reason: report.to_string(),
        })?;
    Ok(plan)
}

/// Options for the `run` command.
#[derive(Debug, Clone, Copy)]
pub struct RunOptions<'a> {
    pub workflow: &'a Path,
    pub input: Option<&'a Path>,
    pub lockfile: Option<&'a Path>,
    pub mode: RunMode,
}

/// Resolves the workflow's connectors, configures the built-in adapters for
/// the resolved versions, and executes one run. Cancelling `handle` stops
/// scheduling new nodes.
///
/// # Errors
///
/// Returns an error if an input cannot be read or a resolved connector
/// version has no built-in adapter.
#[instrument(skip_all, fields(workflow = %options.workflow.display(), mode = %options.mode))]
pub async fn run(
    config: &AppConfig,
    registry: &ConnectorRegistry,
    options: RunOptions<'_>,
    handle: &RunHandle,
) -> Result<RunOutcome, Report<CliError>> {
    let workflow: Workflow = read_json(options.workflow)?;
    let input: JsonValue = match options.input {
        Some(path) => read_json(path)?,
        None => JsonValue::Object(serde_json::Map::new()),
    };
    let lockfile = read_lockfile(options.lockfile)?;

    for issue in workflow.validate().issues {
        warn!(%issue, "workflow validation issue");
    }

    let requested: Vec<DependencySpec> = workflow
        .connector_types()
        .into_iter()
        .map(|node_type| DependencySpec::new(node_type, VersionRange::any()))
        .collect();
    let resolution = Resolver::new(config.resolver.clone()).resolve(
        &registry.snapshot(),
        &requested,
        None,
        lockfile.as_ref(),
    );
    if !resolution.success {
        return Ok(RunOutcome::Unresolved(resolution));
    }

    let services = BuiltinServices {
        credentials: Arc::new(InMemoryCredentialStore::new()),
        notifications: Arc::new(TracingSink),
        http: reqwest::Client::new(),
    };
    let factory = AdapterFactory::configure(&resolution, &AdapterCatalog::builtin(services))
        .map_err(|report| CliError::Adapters {
            reason: report.to_string(),
        })?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let reporter = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            report_event(&event);
        }
    });

    let engine = ExecutionEngine::new(Arc::new(factory), config.engine.clone()).with_events(tx);
    let submitted = WorkflowRun::new(workflow.id, workflow.tenant_id, options.mode, input);
    let finished = engine
        .execute_with_handle(&workflow, submitted, handle)
        .await;

    // Dropping the engine closes the event channel so the reporter drains.
    drop(engine);
    if let Err(join_error) = reporter.await {
        warn!(error = %join_error, "event reporter stopped early");
    }
    Ok(RunOutcome::Finished(Box::new(finished)))
}

fn report_event(event: &ExecutionEvent) {
    match event {
        ExecutionEvent::Progress {
            percent,
            current_node_id,
            current_node_type,
            ..
        } => info!(percent, node_id = %current_node_id, node_type = current_node_type, "progress"),
        other => debug!(?other, "execution event"),
    }
}
