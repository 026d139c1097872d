//! Error types for the resolver crate.
//!
//! - `VersionError`: malformed version or range strings
//! - `RegistryError`: rejected registry publications and documents
//! - `ResolutionFailure`: why a resolve call could not produce an assignment
//!
//! Resolution failures are returned as data inside a `ResolutionResult`
//! rather than raised, so `ResolutionFailure` is also serializable.

use crate::registry::ConnectorId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Errors from parsing versions and ranges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    /// The string is not a valid semantic version.
    InvalidVersionFormat { input: String, reason: String },
    /// The string is not a valid version range.
    InvalidRangeFormat { input: String, reason: String },
}

impl fmt::Display for VersionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidVersionFormat { input, reason } => {
                write!(f, "invalid version format '{input}': {reason}")
            }
            Self::InvalidRangeFormat { input, reason } => {
                write!(f, "invalid version range '{input}': {reason}")
            }
        }
    }
}

impl std::error::Error for VersionError {}

/// Errors from publishing to or loading a connector registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// An entry with the same id and version was already published.
    DuplicateEntry { id: ConnectorId, version: String },
    /// The entry's version string is malformed.
    InvalidVersion { id: ConnectorId, source: VersionError },
    /// A peer or conflict spec on the entry could not be parsed.
    InvalidDependencySpec {
        id: ConnectorId,
        spec: String,
        reason: String,
    },
    /// A registry document could not be decoded.
    InvalidDocument { reason: String },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateEntry { id, version } => {
                write!(f, "connector {id}@{version} is already published")
            }
            Self::InvalidVersion { id, source } => {
                write!(f, "connector {id} has an invalid version: {source}")
            }
            Self::InvalidDependencySpec { id, spec, reason } => {
                write!(f, "connector {id} declares invalid spec '{spec}': {reason}")
            }
            Self::InvalidDocument { reason } => {
                write!(f, "invalid registry document: {reason}")
            }
        }
    }
}

impl std::error::Error for RegistryError {}

/// Where a version requirement came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RequirementOrigin {
    /// Requested directly by the caller.
    Requested,
    /// Declared as a peer by a selected connector.
    Peer { connector: ConnectorId, version: String },
}

impl fmt::Display for RequirementOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Requested => write!(f, "requested"),
            Self::Peer { connector, version } => write!(f, "peer of {connector}@{version}"),
        }
    }
}

/// A single range constraint together with who imposed it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementSource {
    pub range: String,
    pub origin: RequirementOrigin,
}

impl fmt::Display for RequirementSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.range, self.origin)
    }
}

/// Why a resolve call failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ResolutionFailure {
    /// A requested spec or lockfile entry could not be parsed.
    InvalidRequest { spec: String, reason: String },
    /// The registry has no entries at all for a required connector.
    UnknownConnector {
        connector: ConnectorId,
        required_by: Vec<RequirementSource>,
    },
    /// No published version satisfies every range imposed on a connector.
    Unsatisfiable {
        connector: ConnectorId,
        requirements: Vec<RequirementSource>,
        available: Vec<String>,
    },
    /// A lockfile pin satisfies the requested range but is not published.
    LockfileMismatch {
        connector: ConnectorId,
        pinned: String,
    },
    /// Two selected connectors match an `incompatibleWith` rule.
    Incompatible {
        connector: ConnectorId,
        version: String,
        other: ConnectorId,
        other_version: String,
        rule: String,
    },
    /// The backtracking search hit its step limit.
    SearchExhausted { steps: usize },
}

impl fmt::Display for ResolutionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRequest { spec, reason } => {
                write!(f, "invalid dependency spec '{spec}': {reason}")
            }
            Self::UnknownConnector {
                connector,
                required_by,
            } => {
                write!(f, "connector {connector} is not in the registry")?;
                if !required_by.is_empty() {
                    write!(f, " (required as {})", join(required_by))?;
                }
                Ok(())
            }
            Self::Unsatisfiable {
                connector,
                requirements,
                available,
            } => {
                write!(
                    f,
                    "no version of {connector} satisfies {}",
                    join(requirements)
                )?;
                if available.is_empty() {
                    write!(f, "; no versions available")
                } else {
                    write!(f, "; available: {}", available.join(", "))
                }
            }
            Self::LockfileMismatch { connector, pinned } => {
                write!(
                    f,
                    "lockfile pins {connector}@{pinned}, which is not published in the registry"
                )
            }
            Self::Incompatible {
                connector,
                version,
                other,
                other_version,
                rule,
            } => {
                write!(
                    f,
                    "{connector}@{version} is incompatible with {other}@{other_version} (rule '{rule}')"
                )
            }
            Self::SearchExhausted { steps } => {
                write!(f, "resolution gave up after {steps} candidate selections")
            }
        }
    }
}

impl std::error::Error for ResolutionFailure {}

fn join<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" and ")
}
