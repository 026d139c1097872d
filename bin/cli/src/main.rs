//! Command-line entry point for switchyard.
//!
//! Exit codes: 0 when the command succeeded, 1 when it produced an
//! unsuccessful result (failed resolution, invalid workflow, failed run),
//! 2 when it could not run at all.

mod commands;
mod config;
mod error;

use clap::{Parser, Subcommand};
use commands::{RunOptions, RunOutcome};
use config::AppConfig;
use error::CliError;
use rootcause::prelude::Report;
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use switchyard_core::RunMode;
use switchyard_resolver::ResolutionStrategy;
use switchyard_workflow::{RunHandle, RunStatus};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "switchyard", version, about = "Connector resolution and workflow execution", long_about = None)]
struct Cli {
    /// Config file (defaults to ./switchyard.toml when present).
    #[arg(long, global = true, env = "SWITCHYARD_CONFIG")]
    config: Option<PathBuf>,

    /// Connector registry document, overriding `registry_path`.
    #[arg(long, global = true)]
    registry: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve a set of connector requirements to concrete versions.
    Resolve {
        /// Resolution request document.
        #[arg(long)]
        request: PathBuf,
        /// Lockfile whose pins take precedence.
        #[arg(long)]
        lockfile: Option<PathBuf>,
        /// Strategy overriding the request's.
        #[arg(long)]
        strategy: Option<ResolutionStrategy>,
    },
    /// Check a workflow's structure and node types.
    Validate {
        #[arg(long)]
        workflow: PathBuf,
    },
    /// Print the execution plan of a workflow.
    Plan {
        #[arg(long)]
        workflow: PathBuf,
    },
    /// Resolve connectors and execute a workflow once.
    Run {
        #[arg(long)]
        workflow: PathBuf,
        /// JSON input for the run.
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long, default_value_t = RunMode::Manual)]
        mode: RunMode,
        #[arg(long)]
        lockfile: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match AppConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "error: {}",
                CliError::Config {
                    reason: e.to_string()
                }
            );
            return ExitCode::from(2);
        }
    };
    init_tracing(&config);

    match execute(cli, &config).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(report) => {
            eprintln!("error: {report}");
            ExitCode::from(2)
        }
    }
}

/// Logs go to stderr; stdout carries only the command's JSON output.
fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    let registry = tracing_subscriber::registry().with(filter);
    if config.log_json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

/// Runs the command, returning whether its result was successful.
async fn execute(cli: Cli, config: &AppConfig) -> Result<bool, Report<CliError>> {
    let registry = commands::load_registry(config, cli.registry.as_deref())?;

    match cli.command {
        Command::Resolve {
            request,
            lockfile,
            strategy,
        } => {
            let result =
                commands::resolve(config, &registry, &request, lockfile.as_deref(), strategy)?;
            print_json(&result)?;
            Ok(result.success)
        }
        Command::Validate { workflow } => {
            let report = commands::validate(&registry, &workflow)?;
            print_json(&report)?;
            Ok(report.is_valid)
        }
        Command::Plan { workflow } => {
            let plan = commands::plan(config, &workflow)?;
            print_json(&plan)?;
            Ok(true)
        }
        Command::Run {
            workflow,
            input,
            mode,
            lockfile,
        } => {
            let handle = RunHandle::new();
            let interrupt = handle.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupt received, cancelling run");
                    interrupt.cancel();
                }
            });

            let options = RunOptions {
                workflow: &workflow,
                input: input.as_deref(),
                lockfile: lockfile.as_deref(),
                mode,
            };
            match commands::run(config, &registry, options, &handle).await? {
                RunOutcome::Unresolved(resolution) => {
                    print_json(&resolution)?;
                    Ok(false)
                }
                RunOutcome::Finished(run) => {
                    info!(run_id = %run.id, status = %run.status(), "run finished");
                    print_json(&run)?;
                    Ok(run.status() == RunStatus::Completed)
                }
            }
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Report<CliError>> {
    let text = serde_json::to_string_pretty(value).map_err(|e| CliError::Output {
        reason: e.to_string(),
    })?;
    println!("{text}");
    Ok(())
}
