//! Centralized CLI configuration.
//!
//! Loaded via the `config` crate from an optional `switchyard.toml`, with
//! environment variables layered on top. Nested keys use `__`:
//! `SWITCHYARD__ENGINE__MAX_CONCURRENT_NODES=4`.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use switchyard_resolver::ResolverConfig;
use switchyard_workflow::EngineConfig;

/// Base name of the config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "switchyard";

const ENV_PREFIX: &str = "SWITCHYARD";

/// CLI configuration composed from library configs.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// JSON connector registry document. Without one, the built-in
    /// connectors are published at 1.0.0.
    #[serde(default)]
    pub registry_path: Option<PathBuf>,

    /// `EnvFilter` directives used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,

    /// Emit logs as JSON lines.
    #[serde(default)]
    pub log_json: bool,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub resolver: ResolverConfig,
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            registry_path: None,
            log_filter: default_log_filter(),
            log_json: false,
            engine: EngineConfig::default(),
            resolver: ResolverConfig::default(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from `path` (required when given, otherwise an
    /// optional `switchyard.toml`) and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be read or does not deserialize.
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };
        config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}
