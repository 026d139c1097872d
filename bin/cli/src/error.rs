//! Error types for CLI commands.

use std::fmt;
use std::path::PathBuf;

/// Errors that stop a command before it produces output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliError {
    /// Configuration could not be loaded.
    Config { reason: String },
    /// An input file could not be read.
    ReadFile { path: PathBuf, reason: String },
    /// An input file did not decode.
    InvalidDocument { path: PathBuf, reason: String },
    /// The connector registry could not be built.
    Registry { reason: String },
    /// The workflow graph cannot be planned.
    Plan { reason: String },
    /// The adapter factory could not be configured.
    Adapters { reason: String },
    /// Output could not be written.
    Output { reason: String },
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { reason } => write!(f, "invalid configuration: {reason}"),
            Self::ReadFile { path, reason } => {
                write!(f, "cannot read {}: {reason}", path.display())
            }
            Self::InvalidDocument { path, reason } => {
                write!(f, "invalid document {}: {reason}", path.display())
            }
            Self::Registry { reason } => write!(f, "connector registry error: {reason}"),
            Self::Plan { reason } => write!(f, "cannot plan workflow: {reason}"),
            Self::Adapters { reason } => write!(f, "cannot configure adapters: {reason}"),
            Self::Output { reason } => write!(f, "cannot write output: {reason}"),
        }
    }
}

impl std::error::Error for CliError {}
