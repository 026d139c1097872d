//! Connector registry model.
//!
//! The registry is an append-only catalog of published connector entries
//! keyed by `(id, version)`. Writers publish through [`ConnectorRegistry`];
//! readers take an immutable [`RegistrySnapshot`] and resolve against it
//! without further locking.

use crate::error::RegistryError;
use crate::resolver::{DependencySpec, ResolutionStrategy};
use crate::version::Version;
use rootcause::prelude::Report;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, instrument};

/// Identifier of a connector, e.g. `svc.sendNotification`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectorId(String);

impl ConnectorId {
    /// Creates a connector id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectorId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ConnectorId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Borrow<str> for ConnectorId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// A pinned external package the connector runs on. Informational only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeDependency {
    pub package: String,
    pub version: String,
}

/// Declared dependencies of a registry entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependencies {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<RuntimeDependency>,
    /// Peer requirements as `connectorId@range` strings.
    #[serde(default)]
    pub peer: Vec<String>,
}

/// Conflict rules declared by a registry entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictRules {
    /// Connectors this entry cannot be installed with, as
    /// `connectorId@range` strings.
    #[serde(default)]
    pub incompatible_with: Vec<String>,
    /// Preferred versions, used only to break ties between candidates.
    #[serde(default)]
    pub prefer_version: BTreeMap<ConnectorId, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution_strategy: Option<ResolutionStrategy>,
}

/// A connector version as published to the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorRegistryEntry {
    pub id: ConnectorId,
    pub version: Version,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub dependencies: Dependencies,
    #[serde(default)]
    pub conflict_rules: ConflictRules,
}

impl ConnectorRegistryEntry {
    /// Creates an entry with no dependencies or conflict rules.
    #[must_use]
    pub fn new(id: impl Into<ConnectorId>, version: Version, category: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version,
            category: category.into(),
            dependencies: Dependencies::default(),
            conflict_rules: ConflictRules::default(),
        }
    }

    /// Adds a peer requirement.
    #[must_use]
    pub fn with_peer(mut self, spec: impl Into<String>) -> Self {
        self.dependencies.peer.push(spec.into());
        self
    }

    /// Adds an incompatibility rule.
    #[must_use]
    pub fn with_incompatible(mut self, spec: impl Into<String>) -> Self {
        self.conflict_rules.incompatible_with.push(spec.into());
        self
    }

    /// Adds a preferred version hint for another connector.
    #[must_use]
    pub fn with_preferred(mut self, id: impl Into<ConnectorId>, version: impl Into<String>) -> Self {
        self.conflict_rules
            .prefer_version
            .insert(id.into(), version.into());
        self
    }

    /// Sets the entry's default resolution strategy.
    #[must_use]
    pub fn with_strategy(mut self, strategy: ResolutionStrategy) -> Self {
        self.conflict_rules.resolution_strategy = Some(strategy);
        self
    }
}

/// A registry entry with its dependency strings parsed.
///
/// Parsing happens once at publish time so that resolution never sees a
/// malformed spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedEntry {
    pub entry: ConnectorRegistryEntry,
    pub peers: Vec<DependencySpec>,
    pub incompatible_with: Vec<DependencySpec>,
    pub prefer_version: BTreeMap<ConnectorId, Version>,
}

impl PublishedEntry {
    fn from_entry(entry: ConnectorRegistryEntry) -> Result<Self, Report<RegistryError>> {
        let parse_specs = |specs: &[String]| -> Result<Vec<DependencySpec>, RegistryError> {
            specs
                .iter()
                .map(|spec| {
                    DependencySpec::parse(spec).map_err(|e| RegistryError::InvalidDependencySpec {
                        id: entry.id.clone(),
                        spec: spec.clone(),
                        reason: e.to_string(),
                    })
                })
                .collect()
        };

        let peers = parse_specs(&entry.dependencies.peer)?;
        let incompatible_with = parse_specs(&entry.conflict_rules.incompatible_with)?;

        let mut prefer_version = BTreeMap::new();
        for (id, version) in &entry.conflict_rules.prefer_version {
            let version = Version::parse(version).map_err(|source| RegistryError::InvalidVersion {
                id: entry.id.clone(),
                source,
            })?;
            prefer_version.insert(id.clone(), version);
        }

        Ok(Self {
            entry,
            peers,
            incompatible_with,
            prefer_version,
        })
    }

    /// The connector id.
    #[must_use]
    pub fn id(&self) -> &ConnectorId {
        &self.entry.id
    }

    /// The published version.
    #[must_use]
    pub fn version(&self) -> &Version {
        &self.entry.version
    }
}

type EntryMap = BTreeMap<ConnectorId, BTreeMap<Version, Arc<PublishedEntry>>>;

/// An immutable view of the registry at one generation.
///
/// Cloning is cheap; all clones share the same entries.
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    generation: u64,
    entries: Arc<EntryMap>,
}

impl RegistrySnapshot {
    /// The generation this snapshot was taken at.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// All published versions of a connector, oldest first.
    pub fn versions_of(&self, id: &str) -> impl Iterator<Item = &Arc<PublishedEntry>> {
        self.entries.get(id).into_iter().flat_map(BTreeMap::values)
    }

    /// Returns the entry published for an exact version.
    #[must_use]
    pub fn get(&self, id: &str, version: &Version) -> Option<&Arc<PublishedEntry>> {
        self.entries.get(id).and_then(|versions| versions.get(version))
    }

    /// The highest published version of a connector.
    #[must_use]
    pub fn latest(&self, id: &str) -> Option<&Arc<PublishedEntry>> {
        self.entries
            .get(id)
            .and_then(|versions| versions.values().next_back())
    }

    /// Returns true if any version of the connector is published.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// All connector ids with at least one published version, sorted.
    pub fn connector_ids(&self) -> impl Iterator<Item = &ConnectorId> {
        self.entries.keys()
    }

    /// Total number of published entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeMap::len).sum()
    }

    /// Returns true if nothing has been published.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A serialized registry, as loaded from disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryDocument {
    pub entries: Vec<ConnectorRegistryEntry>,
}

/// The process-wide, append-only connector registry.
///
/// Publication swaps in a new snapshot; readers holding an older snapshot
/// are unaffected.
#[derive(Debug, Default)]
pub struct ConnectorRegistry {
    current: RwLock<RegistrySnapshot>,
}

impl ConnectorRegistry {
    /// Creates an empty registry at generation 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from a decoded document, publishing every entry in
    /// order.
    ///
    /// # Errors
    ///
    /// Fails on the first entry that cannot be published.
    pub fn from_document(document: RegistryDocument) -> Result<Self, Report<RegistryError>> {
        let registry = Self::new();
        for entry in document.entries {
            registry.publish(entry)?;
        }
        Ok(registry)
    }

    /// Parses a JSON registry document.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDocument` if the JSON does not decode, or any publish
    /// error for its entries.
    pub fn from_json(json: &str) -> Result<Self, Report<RegistryError>> {
        let document: RegistryDocument =
            serde_json::from_str(json).map_err(|e| RegistryError::InvalidDocument {
                reason: e.to_string(),
            })?;
        Self::from_document(document)
    }

    /// Returns the current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> RegistrySnapshot {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Publishes an entry and returns the new generation.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateEntry` if `(id, version)` is already published, or
    /// an error if a peer, conflict, or preference spec is malformed.
    #[instrument(skip(self, entry), fields(id = %entry.id, version = %entry.version))]
    pub fn publish(&self, entry: ConnectorRegistryEntry) -> Result<u64, Report<RegistryError>> {
        let published = PublishedEntry::from_entry(entry)?;

        let mut current = self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        if current
            .get(published.id().as_str(), published.version())
            .is_some()
        {
            return Err(RegistryError::DuplicateEntry {
                id: published.id().clone(),
                version: published.version().to_string(),
            }
            .into());
        }

        let mut entries = EntryMap::clone(&current.entries);
        entries
            .entry(published.id().clone())
            .or_default()
            .insert(published.version().clone(), Arc::new(published));

        let generation = current.generation + 1;
        *current = RegistrySnapshot {
            generation,
            entries: Arc::new(entries),
        };

        debug!(generation, "published connector entry");
        Ok(generation)
    }
}
