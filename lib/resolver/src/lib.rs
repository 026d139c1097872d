//! Connector dependency resolution for switchyard.
//!
//! This crate provides:
//!
//! - **Version constraints**: semver parsing, precedence comparison, and
//!   range matching (`^1.2.0`, `>=1.0.0 <2.0.0`, exact pins)
//! - **Registry model**: an append-only catalog of published connector
//!   entries, read through immutable snapshots
//! - **Resolver**: computes a consistent version assignment for a set of
//!   requested connectors, honoring peers, conflicts, strategies, and
//!   lockfiles

pub mod error;
pub mod registry;
pub mod resolver;
pub mod version;

pub use error::{RegistryError, ResolutionFailure, VersionError};
pub use registry::{
    ConflictRules, ConnectorId, ConnectorRegistry, ConnectorRegistryEntry, Dependencies,
    PublishedEntry, RegistryDocument, RegistrySnapshot, RuntimeDependency,
};
pub use resolver::{
    DependencySpec, Lockfile, ResolutionRequest, ResolutionResult, ResolutionStrategy, Resolver,
    ResolverConfig,
};
pub use version::{Version, VersionRange, compare, is_prerelease, satisfies};
