//! Connector dependency resolution.
//!
//! [`Resolver::resolve`] is a pure function of a registry snapshot, the
//! requested specs, a strategy, and an optional lockfile. It either returns
//! a complete version assignment or a [`ResolutionFailure`] describing the
//! constraint that could not be met; it never returns a partial map.
//!
//! The search walks connectors in id order. For each one it merges every
//! range imposed so far (requested and peer) by intersection, orders the
//! candidates by strategy, and tries them newest-first. Selecting a
//! candidate adds its peers as further requirements and checks its
//! `incompatibleWith` rules against everything already selected. A rejected
//! candidate falls back to the next one, except that under `FailFast` an
//! `incompatibleWith` violation is final. Range failures (a later peer
//! narrowing an earlier selection) always backtrack, so the outcome does not
//! depend on how connector ids sort.

use crate::error::{RequirementOrigin, RequirementSource, ResolutionFailure, VersionError};
use crate::registry::{ConnectorId, PublishedEntry, RegistrySnapshot};
use crate::version::{Version, VersionRange};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// How to choose among versions that satisfy every constraint.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum ResolutionStrategy {
    /// Newest satisfying version.
    #[default]
    HighestCompatible,
    /// Newest stable version, or newest pre-release if nothing stable fits.
    PreferStable,
    /// Like `HighestCompatible`, but an `incompatibleWith` violation is
    /// final instead of triggering a retry with another candidate.
    FailFast,
}

impl ResolutionStrategy {
    /// Returns the wire name of the strategy.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HighestCompatible => "highestCompatible",
            Self::PreferStable => "preferStable",
            Self::FailFast => "failFast",
        }
    }
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResolutionStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "highestcompatible" => Ok(Self::HighestCompatible),
            "preferstable" => Ok(Self::PreferStable),
            "failfast" => Ok(Self::FailFast),
            _ => Err(format!("unknown resolution strategy: {s}")),
        }
    }
}

/// A request for one connector within a version range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencySpec {
    pub connector: ConnectorId,
    pub range: VersionRange,
}

impl DependencySpec {
    /// Creates a spec from an id and a parsed range.
    #[must_use]
    pub fn new(connector: impl Into<ConnectorId>, range: VersionRange) -> Self {
        Self {
            connector: connector.into(),
            range,
        }
    }

    /// Parses a `connectorId@range` string. A spec without `@` accepts any
    /// version. A leading `@` belongs to the id (`@org/connector@^1.0.0`).
    ///
    /// # Errors
    ///
    /// Returns `InvalidRangeFormat` if the id is empty or the range is
    /// malformed.
    pub fn parse(spec: &str) -> Result<Self, VersionError> {
        let spec = spec.trim();
        let (id, range) = match spec.rfind('@').filter(|&at| at > 0) {
            Some(at) => (&spec[..at], VersionRange::parse(&spec[at + 1..])?),
            None => (spec, VersionRange::any()),
        };
        if id.is_empty() {
            return Err(VersionError::InvalidRangeFormat {
                input: spec.to_string(),
                reason: "missing connector id".to_string(),
            });
        }
        Ok(Self::new(id, range))
    }
}

impl fmt::Display for DependencySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.connector, self.range)
    }
}

/// Caller-supplied version pins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Lockfile {
    pins: BTreeMap<ConnectorId, String>,
}

impl Lockfile {
    /// Creates an empty lockfile.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a pin.
    #[must_use]
    pub fn pin(mut self, connector: impl Into<ConnectorId>, version: impl Into<String>) -> Self {
        self.pins.insert(connector.into(), version.into());
        self
    }

    /// Builds a lockfile from a successful resolution.
    ///
    /// Returns `None` if the resolution failed.
    #[must_use]
    pub fn from_result(result: &ResolutionResult) -> Option<Self> {
        result.success.then(|| Self {
            pins: result
                .resolved_versions
                .iter()
                .map(|(id, version)| (id.clone(), version.to_string()))
                .collect(),
        })
    }

    /// Returns the pinned version string for a connector.
    #[must_use]
    pub fn get(&self, connector: &str) -> Option<&str> {
        self.pins.get(connector).map(String::as_str)
    }

    /// Iterates pins in connector id order.
    pub fn iter(&self) -> impl Iterator<Item = (&ConnectorId, &str)> {
        self.pins.iter().map(|(id, v)| (id, v.as_str()))
    }

    /// Number of pins.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pins.len()
    }

    /// Returns true if there are no pins.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }
}

/// The wire form of a resolution request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionRequest {
    /// Requested connectors and their version ranges.
    pub requested: BTreeMap<ConnectorId, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<ResolutionStrategy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lockfile: Option<Lockfile>,
}

/// The outcome of one resolve call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionResult {
    pub success: bool,
    /// Selected version per connector, including transitively required
    /// peers. Empty on failure.
    pub resolved_versions: BTreeMap<ConnectorId, Version>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<ResolutionFailure>,
    pub strategy: ResolutionStrategy,
    pub registry_generation: u64,
}

impl ResolutionResult {
    fn resolved(
        resolved_versions: BTreeMap<ConnectorId, Version>,
        strategy: ResolutionStrategy,
        registry_generation: u64,
    ) -> Self {
        Self {
            success: true,
            resolved_versions,
            error_message: None,
            failure: None,
            strategy,
            registry_generation,
        }
    }

    fn failed(
        failure: ResolutionFailure,
        strategy: ResolutionStrategy,
        registry_generation: u64,
    ) -> Self {
        Self {
            success: false,
            resolved_versions: BTreeMap::new(),
            error_message: Some(failure.to_string()),
            failure: Some(failure),
            strategy,
            registry_generation,
        }
    }

    /// Returns the resolved version of a connector.
    #[must_use]
    pub fn version_of(&self, connector: &str) -> Option<&Version> {
        self.resolved_versions.get(connector)
    }
}

fn default_max_steps() -> usize {
    10_000
}

/// Resolver configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Strategy used when neither the caller nor the requested entries name
    /// one.
    #[serde(default)]
    pub default_strategy: ResolutionStrategy,
    /// Upper bound on candidate selections tried during backtracking.
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            default_strategy: ResolutionStrategy::default(),
            max_steps: default_max_steps(),
        }
    }
}

/// Computes consistent connector version assignments.
#[derive(Debug, Clone, Default)]
pub struct Resolver {
    config: ResolverConfig,
}

impl Resolver {
    /// Creates a resolver.
    #[must_use]
    pub fn new(config: ResolverConfig) -> Self {
        Self { config }
    }

    /// Resolves a wire-form request.
    ///
    /// Malformed ranges in the request become an `InvalidRequest` failure.
    #[must_use]
    pub fn resolve_request(
        &self,
        snapshot: &RegistrySnapshot,
        request: &ResolutionRequest,
    ) -> ResolutionResult {
        let mut requested = Vec::with_capacity(request.requested.len());
        for (id, range) in &request.requested {
            match VersionRange::parse(range) {
                Ok(range) => requested.push(DependencySpec::new(id.clone(), range)),
                Err(e) => {
                    let strategy = request
                        .strategy
                        .unwrap_or(self.config.default_strategy);
                    return ResolutionResult::failed(
                        ResolutionFailure::InvalidRequest {
                            spec: format!("{id}@{range}"),
                            reason: e.to_string(),
                        },
                        strategy,
                        snapshot.generation(),
                    );
                }
            }
        }
        self.resolve(
            snapshot,
            &requested,
            request.strategy,
            request.lockfile.as_ref(),
        )
    }

    /// Resolves the requested specs against a registry snapshot.
    #[instrument(skip_all, fields(requested = requested.len(), generation = snapshot.generation()))]
    pub fn resolve(
        &self,
        snapshot: &RegistrySnapshot,
        requested: &[DependencySpec],
        strategy: Option<ResolutionStrategy>,
        lockfile: Option<&Lockfile>,
    ) -> ResolutionResult {
        let strategy = strategy.unwrap_or_else(|| self.declared_strategy(snapshot, requested));
        let generation = snapshot.generation();

        let pins = match lockfile.map(parse_pins).transpose() {
            Ok(pins) => pins.unwrap_or_default(),
            Err(failure) => return ResolutionResult::failed(failure, strategy, generation),
        };

        let mut state = State::default();
        for spec in requested {
            state
                .requirements
                .entry(spec.connector.clone())
                .or_default()
                .push(Requirement {
                    range: spec.range.clone(),
                    origin: RequirementOrigin::Requested,
                });
        }

        let mut search = Search {
            snapshot,
            strategy,
            pins,
            warned: BTreeSet::new(),
            steps: 0,
            max_steps: self.config.max_steps,
        };

        match search.run(state) {
            Ok(state) => {
                let resolved: BTreeMap<_, _> = state
                    .selected
                    .into_iter()
                    .map(|(id, entry)| (id, entry.version().clone()))
                    .collect();
                info!(%strategy, resolved = resolved.len(), steps = search.steps, "resolution succeeded");
                ResolutionResult::resolved(resolved, strategy, generation)
            }
            Err(failure) => {
                info!(%strategy, %failure, steps = search.steps, "resolution failed");
                ResolutionResult::failed(failure, strategy, generation)
            }
        }
    }

    /// The strategy the requested entries agree on, or the configured
    /// default.
    fn declared_strategy(
        &self,
        snapshot: &RegistrySnapshot,
        requested: &[DependencySpec],
    ) -> ResolutionStrategy {
        let declared: BTreeSet<ResolutionStrategy> = requested
            .iter()
            .flat_map(|spec| {
                snapshot
                    .versions_of(spec.connector.as_str())
                    .filter(|entry| spec.range.matches(entry.version()))
                    .filter_map(|entry| entry.entry.conflict_rules.resolution_strategy)
            })
            .collect();

        match declared.len() {
            1 => declared
                .into_iter()
                .next()
                .unwrap_or(self.config.default_strategy),
            _ => self.config.default_strategy,
        }
    }
}

fn parse_pins(lockfile: &Lockfile) -> Result<BTreeMap<ConnectorId, Version>, ResolutionFailure> {
    lockfile
        .iter()
        .map(|(id, version)| {
            Version::parse(version)
                .map(|v| (id.clone(), v))
                .map_err(|e| ResolutionFailure::InvalidRequest {
                    spec: format!("{id}@{version} (lockfile)"),
                    reason: e.to_string(),
                })
        })
        .collect()
}

#[derive(Debug, Clone)]
struct Requirement {
    range: VersionRange,
    origin: RequirementOrigin,
}

impl Requirement {
    fn source(&self) -> RequirementSource {
        RequirementSource {
            range: self.range.to_string(),
            origin: self.origin.clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct State {
    requirements: BTreeMap<ConnectorId, Vec<Requirement>>,
    selected: BTreeMap<ConnectorId, Arc<PublishedEntry>>,
}

struct Search<'a> {
    snapshot: &'a RegistrySnapshot,
    strategy: ResolutionStrategy,
    pins: BTreeMap<ConnectorId, Version>,
    warned: BTreeSet<ConnectorId>,
    steps: usize,
    max_steps: usize,
}

impl Search<'_> {
    fn run(&mut self, state: State) -> Result<State, ResolutionFailure> {
        let Some(id) = state
            .requirements
            .keys()
            .find(|id| !state.selected.contains_key(*id))
            .cloned()
        else {
            return Ok(state);
        };

        let candidates = self.candidates(&id, &state)?;
        let mut first_failure = None;

        for candidate in candidates {
            if self.steps >= self.max_steps {
                return Err(first_failure.unwrap_or(ResolutionFailure::SearchExhausted {
                    steps: self.steps,
                }));
            }
            self.steps += 1;

            let outcome = self.select(&state, &id, candidate).and_then(|next| self.run(next));
            match outcome {
                Ok(done) => return Ok(done),
                Err(failure @ ResolutionFailure::Incompatible { .. })
                    if self.strategy == ResolutionStrategy::FailFast =>
                {
                    return Err(failure);
                }
                Err(failure) => {
                    debug!(connector = %id, %failure, "candidate rejected, trying next");
                    first_failure.get_or_insert(failure);
                }
            }
        }

        Err(first_failure.unwrap_or(ResolutionFailure::SearchExhausted { steps: self.steps }))
    }

    /// Candidates for `id` satisfying every requirement, best first.
    fn candidates(
        &mut self,
        id: &ConnectorId,
        state: &State,
    ) -> Result<Vec<Arc<PublishedEntry>>, ResolutionFailure> {
        let requirements = state.requirements.get(id).map(Vec::as_slice).unwrap_or_default();
        let merged = requirements
            .iter()
            .fold(VersionRange::any(), |acc, r| acc.intersect(&r.range));

        if !self.snapshot.contains(id.as_str()) {
            return Err(ResolutionFailure::UnknownConnector {
                connector: id.clone(),
                required_by: requirements.iter().map(Requirement::source).collect(),
            });
        }

        if let Some(pinned) = self.pins.get(id) {
            if merged.matches(pinned) {
                return match self.snapshot.get(id.as_str(), pinned) {
                    Some(entry) => Ok(vec![Arc::clone(entry)]),
                    None => Err(ResolutionFailure::LockfileMismatch {
                        connector: id.clone(),
                        pinned: pinned.to_string(),
                    }),
                };
            }
            if self.warned.insert(id.clone()) {
                warn!(connector = %id, %pinned, range = %merged, "lockfile pin does not satisfy the requested range, ignoring it");
            }
        }

        let mut candidates: Vec<Arc<PublishedEntry>> = self
            .snapshot
            .versions_of(id.as_str())
            .filter(|entry| merged.matches(entry.version()))
            .cloned()
            .collect();

        if candidates.is_empty() {
            return Err(ResolutionFailure::Unsatisfiable {
                connector: id.clone(),
                requirements: requirements.iter().map(Requirement::source).collect(),
                available: self
                    .snapshot
                    .versions_of(id.as_str())
                    .map(|entry| entry.version().to_string())
                    .collect(),
            });
        }

        if self.strategy == ResolutionStrategy::PreferStable
            && candidates.iter().any(|entry| !entry.version().is_prerelease())
        {
            candidates.retain(|entry| !entry.version().is_prerelease());
        }

        let preferred: BTreeSet<&Version> = state
            .selected
            .values()
            .filter_map(|entry| entry.prefer_version.get(id.as_str()))
            .collect();

        candidates.sort_by(|a, b| {
            b.version()
                .cmp_precedence(a.version())
                .then_with(|| {
                    preferred
                        .contains(b.version())
                        .cmp(&preferred.contains(a.version()))
                })
                .then_with(|| b.version().cmp(a.version()))
        });

        Ok(candidates)
    }

    /// Adds `candidate` to the selection, recording its peers.
    fn select(
        &self,
        state: &State,
        id: &ConnectorId,
        candidate: Arc<PublishedEntry>,
    ) -> Result<State, ResolutionFailure> {
        for other in state.selected.values() {
            if let Some(failure) = incompatibility(&candidate, other)
                .or_else(|| incompatibility(other, &candidate))
            {
                return Err(failure);
            }
        }

        let mut next = state.clone();
        for peer in &candidate.peers {
            if peer.connector == *id {
                continue;
            }

            let requirement = Requirement {
                range: peer.range.clone(),
                origin: RequirementOrigin::Peer {
                    connector: id.clone(),
                    version: candidate.version().to_string(),
                },
            };
            let requirements = next.requirements.entry(peer.connector.clone()).or_default();
            requirements.push(requirement);

            if let Some(selected) = next.selected.get(&peer.connector)
                && !peer.range.matches(selected.version())
            {
                return Err(ResolutionFailure::Unsatisfiable {
                    connector: peer.connector.clone(),
                    requirements: requirements.iter().map(Requirement::source).collect(),
                    available: self
                        .snapshot
                        .versions_of(peer.connector.as_str())
                        .map(|entry| entry.version().to_string())
                        .collect(),
                });
            }
        }

        next.selected.insert(id.clone(), candidate);
        Ok(next)
    }
}

/// Returns a failure if `declaring` lists `other` as incompatible.
fn incompatibility(declaring: &PublishedEntry, other: &PublishedEntry) -> Option<ResolutionFailure> {
    if declaring.id() == other.id() {
        return None;
    }
    declaring
        .incompatible_with
        .iter()
        .find(|rule| rule.connector == *other.id() && rule.range.matches(other.version()))
        .map(|rule| ResolutionFailure::Incompatible {
            connector: declaring.id().clone(),
            version: declaring.version().to_string(),
            other: other.id().clone(),
            other_version: other.version().to_string(),
            rule: rule.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ConnectorRegistry, ConnectorRegistryEntry};

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    fn spec(s: &str) -> DependencySpec {
        DependencySpec::parse(s).unwrap()
    }

    fn registry(entries: Vec<ConnectorRegistryEntry>) -> RegistrySnapshot {
        let registry = ConnectorRegistry::new();
        for entry in entries {
            registry.publish(entry).unwrap();
        }
        registry.snapshot()
    }

    fn entry(id: &str, version: &str) -> ConnectorRegistryEntry {
        ConnectorRegistryEntry::new(id, v(version), "action")
    }

    fn resolved(result: &ResolutionResult) -> Vec<(String, String)> {
        result
            .resolved_versions
            .iter()
            .map(|(id, v)| (id.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn notification_scenario_picks_highest() {
        let snapshot = registry(vec![
            entry("svc.sendNotification", "1.0.0"),
            entry("svc.sendNotification", "1.2.3"),
        ]);

        let result = Resolver::default().resolve(
            &snapshot,
            &[spec("svc.sendNotification@^1.0.0")],
            Some(ResolutionStrategy::HighestCompatible),
            None,
        );

        assert!(result.success);
        assert_eq!(
            resolved(&result),
            vec![("svc.sendNotification".to_string(), "1.2.3".to_string())]
        );
        assert!(result.error_message.is_none());
    }

    #[test]
    fn notification_scenario_honors_lockfile() {
        let snapshot = registry(vec![
            entry("svc.sendNotification", "1.0.0"),
            entry("svc.sendNotification", "1.2.3"),
        ]);
        let lockfile = Lockfile::new().pin("svc.sendNotification", "1.0.0");

        let result = Resolver::default().resolve(
            &snapshot,
            &[spec("svc.sendNotification@^1.0.0")],
            Some(ResolutionStrategy::HighestCompatible),
            Some(&lockfile),
        );

        assert!(result.success);
        assert_eq!(result.version_of("svc.sendNotification"), Some(&v("1.0.0")));
    }

    #[test]
    fn request_wire_form_matches_scenario() {
        let snapshot = registry(vec![
            entry("svc.sendNotification", "1.0.0"),
            entry("svc.sendNotification", "1.2.3"),
        ]);
        let request: ResolutionRequest = serde_json::from_str(
            r#"{"requested": {"svc.sendNotification": "^1.0.0"}, "strategy": "highestCompatible"}"#,
        )
        .unwrap();

        let result = Resolver::default().resolve_request(&snapshot, &request);
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["success"], true);
        assert_eq!(json["resolvedVersions"]["svc.sendNotification"], "1.2.3");
        assert_eq!(json["registryGeneration"], 2);
    }

    #[test]
    fn resolution_is_deterministic() {
        let snapshot = registry(vec![
            entry("svc.a", "1.0.0").with_peer("svc.c@^2.0.0"),
            entry("svc.a", "1.1.0").with_peer("svc.c@^2.1.0"),
            entry("svc.b", "3.0.0").with_peer("svc.c@>=2.0.0"),
            entry("svc.c", "2.0.0"),
            entry("svc.c", "2.1.5"),
            entry("svc.c", "2.4.0"),
        ]);
        let requested = [spec("svc.b@^3.0.0"), spec("svc.a@^1.0.0")];
        let resolver = Resolver::default();

        let first = resolver.resolve(&snapshot, &requested, None, None);
        for _ in 0..10 {
            assert_eq!(resolver.resolve(&snapshot, &requested, None, None), first);
        }
        assert!(first.success);
    }

    #[test]
    fn highest_compatible_never_picks_lower_satisfying_version() {
        let snapshot = registry(vec![
            entry("svc.a", "1.0.0"),
            entry("svc.a", "1.4.0"),
            entry("svc.a", "1.9.2"),
            entry("svc.a", "2.0.0"),
        ]);

        let result = Resolver::default().resolve(&snapshot, &[spec("svc.a@^1.0.0")], None, None);
        assert_eq!(result.version_of("svc.a"), Some(&v("1.9.2")));
    }

    #[test]
    fn highest_compatible_may_pick_prerelease() {
        let snapshot = registry(vec![entry("svc.a", "1.0.0"), entry("svc.a", "1.1.0-beta.1")]);

        let result = Resolver::default().resolve(
            &snapshot,
            &[spec("svc.a@^1.0.0")],
            Some(ResolutionStrategy::HighestCompatible),
            None,
        );
        assert_eq!(result.version_of("svc.a"), Some(&v("1.1.0-beta.1")));
    }

    #[test]
    fn prefer_stable_skips_prerelease_when_stable_exists() {
        let snapshot = registry(vec![entry("svc.a", "1.0.0"), entry("svc.a", "1.1.0-beta.1")]);

        let result = Resolver::default().resolve(
            &snapshot,
            &[spec("svc.a@^1.0.0")],
            Some(ResolutionStrategy::PreferStable),
            None,
        );
        assert_eq!(result.version_of("svc.a"), Some(&v("1.0.0")));
    }

    #[test]
    fn prefer_stable_falls_back_to_prerelease() {
        let snapshot = registry(vec![
            entry("svc.a", "2.0.0-alpha.1"),
            entry("svc.a", "2.0.0-beta.2"),
            entry("svc.a", "1.5.0"),
        ]);

        let result = Resolver::default().resolve(
            &snapshot,
            &[spec("svc.a@>=2.0.0-alpha.0")],
            Some(ResolutionStrategy::PreferStable),
            None,
        );
        assert_eq!(result.version_of("svc.a"), Some(&v("2.0.0-beta.2")));
    }

    #[test]
    fn incompatible_pair_fails_naming_both() {
        let snapshot = registry(vec![
            entry("svc.a", "1.0.0").with_incompatible("svc.b@>=2.0.0"),
            entry("svc.b", "2.1.0"),
        ]);

        let result = Resolver::default().resolve(
            &snapshot,
            &[spec("svc.a@^1.0.0"), spec("svc.b@^2.0.0")],
            None,
            None,
        );

        assert!(!result.success);
        assert!(result.resolved_versions.is_empty());
        let message = result.error_message.unwrap();
        assert!(message.contains("svc.a@1.0.0"), "{message}");
        assert!(message.contains("svc.b@2.1.0"), "{message}");
    }

    #[test]
    fn incompatibility_is_checked_in_both_directions() {
        let snapshot = registry(vec![
            entry("svc.a", "1.0.0"),
            entry("svc.b", "2.1.0").with_incompatible("svc.a@1.x"),
        ]);

        let result = Resolver::default().resolve(
            &snapshot,
            &[spec("svc.a@^1.0.0"), spec("svc.b@^2.0.0")],
            None,
            None,
        );

        assert!(!result.success);
        assert!(matches!(
            result.failure,
            Some(ResolutionFailure::Incompatible { ref connector, .. }) if connector.as_str() == "svc.b"
        ));
    }

    #[test]
    fn conflicts_backtrack_to_older_candidate() {
        let snapshot = registry(vec![
            entry("svc.a", "1.0.0"),
            entry("svc.a", "1.1.0").with_incompatible("svc.b@^2.0.0"),
            entry("svc.b", "2.0.0"),
        ]);
        let requested = [spec("svc.a@^1.0.0"), spec("svc.b@^2.0.0")];

        let result = Resolver::default().resolve(
            &snapshot,
            &requested,
            Some(ResolutionStrategy::HighestCompatible),
            None,
        );
        assert!(result.success);
        assert_eq!(result.version_of("svc.a"), Some(&v("1.0.0")));
        assert_eq!(result.version_of("svc.b"), Some(&v("2.0.0")));

        let result = Resolver::default().resolve(
            &snapshot,
            &requested,
            Some(ResolutionStrategy::FailFast),
            None,
        );
        assert!(!result.success);
        assert!(matches!(
            result.failure,
            Some(ResolutionFailure::Incompatible { .. })
        ));
    }

    #[test]
    fn peer_range_intersects_with_request() {
        let snapshot = registry(vec![
            entry("svc.a", "1.0.0").with_peer("svc.b@~1.4.0"),
            entry("svc.b", "1.4.2"),
            entry("svc.b", "1.5.0"),
            entry("svc.b", "1.6.0"),
        ]);

        let result = Resolver::default().resolve(
            &snapshot,
            &[spec("svc.a@^1.0.0"), spec("svc.b@^1.0.0")],
            None,
            None,
        );

        assert!(result.success);
        let b = result.version_of("svc.b").unwrap();
        assert_eq!(b, &v("1.4.2"));
        assert!(VersionRange::parse("^1.0.0").unwrap().matches(b));
        assert!(VersionRange::parse("~1.4.0").unwrap().matches(b));
    }

    #[test]
    fn peer_narrowing_a_selected_connector_backtracks() {
        // svc.a sorts first, svc.z's peer narrows it afterwards.
        let snapshot = registry(vec![
            entry("svc.a", "1.0.0"),
            entry("svc.a", "1.3.0"),
            entry("svc.z", "1.0.0").with_peer("svc.a@<1.2.0"),
        ]);

        let result = Resolver::default().resolve(
            &snapshot,
            &[spec("svc.a@^1.0.0"), spec("svc.z@^1.0.0")],
            None,
            None,
        );

        assert!(result.success);
        assert_eq!(result.version_of("svc.a"), Some(&v("1.0.0")));
    }

    #[test]
    fn fail_fast_backtracks_when_a_peer_narrows_a_selection() {
        // One owner sorts before svc.a and one after it, so the peer range
        // is seen either before or after svc.a is chosen.
        for owner in ["svc.0", "svc.z"] {
            let snapshot = registry(vec![
                entry("svc.a", "1.0.0"),
                entry("svc.a", "1.3.0"),
                entry(owner, "1.0.0").with_peer("svc.a@<1.2.0"),
            ]);

            let result = Resolver::default().resolve(
                &snapshot,
                &[spec("svc.a@^1.0.0"), spec(&format!("{owner}@^1.0.0"))],
                Some(ResolutionStrategy::FailFast),
                None,
            );

            assert!(result.success, "{owner}: {:?}", result.error_message);
            assert_eq!(result.version_of("svc.a"), Some(&v("1.0.0")), "{owner}");
            assert_eq!(result.version_of(owner), Some(&v("1.0.0")), "{owner}");
        }
    }

    #[test]
    fn fail_fast_follows_peers_to_the_only_workable_version() {
        let snapshot = registry(vec![
            entry("svc.a", "2.0.0").with_peer("svc.c@^3.0.0"),
            entry("svc.a", "1.0.0").with_peer("svc.c@^2.0.0"),
            entry("svc.b", "1.0.0").with_peer("svc.c@~2.1.0"),
            entry("svc.c", "2.1.4"),
            entry("svc.c", "3.0.0"),
        ]);

        let result = Resolver::default().resolve(
            &snapshot,
            &[spec("svc.a@*"), spec("svc.b@^1.0.0")],
            Some(ResolutionStrategy::FailFast),
            None,
        );

        assert!(result.success, "{:?}", result.error_message);
        assert_eq!(result.version_of("svc.a"), Some(&v("1.0.0")));
        assert_eq!(result.version_of("svc.c"), Some(&v("2.1.4")));
    }

    #[test]
    fn concurrent_resolves_share_one_snapshot() {
        let snapshot = registry(vec![
            entry("svc.a", "1.0.0").with_peer("svc.c@^2.0.0"),
            entry("svc.a", "1.1.0").with_peer("svc.c@^2.1.0"),
            entry("svc.b", "3.0.0").with_peer("svc.c@>=2.0.0"),
            entry("svc.c", "2.0.0"),
            entry("svc.c", "2.4.0"),
            entry("svc.c", "3.0.0"),
        ]);
        let requested = [spec("svc.a@^1.0.0"), spec("svc.b@^3.0.0")];
        let resolver = Resolver::default();
        let expected = resolver.resolve(&snapshot, &requested, None, None);
        assert!(expected.success);

        std::thread::scope(|scope| {
            let workers: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| resolver.resolve(&snapshot, &requested, None, None)))
                .collect();
            for worker in workers {
                assert_eq!(worker.join().unwrap(), expected);
            }
        });
        assert_eq!(expected.version_of("svc.c"), Some(&v("2.4.0")));
    }

    #[test]
    fn peers_from_different_connectors_are_intersected() {
        let snapshot = registry(vec![
            entry("svc.a", "1.0.0").with_peer("svc.c@>=2.0.0"),
            entry("svc.b", "1.0.0").with_peer("svc.c@<2.3.0"),
            entry("svc.c", "1.9.0"),
            entry("svc.c", "2.2.0"),
            entry("svc.c", "2.5.0"),
        ]);

        let result = Resolver::default().resolve(
            &snapshot,
            &[spec("svc.a@1.0.0"), spec("svc.b@1.0.0")],
            None,
            None,
        );
        assert_eq!(result.version_of("svc.c"), Some(&v("2.2.0")));
    }

    #[test]
    fn transitive_peers_are_included() {
        let snapshot = registry(vec![
            entry("svc.a", "1.0.0").with_peer("svc.b@^1.0.0"),
            entry("svc.b", "1.1.0").with_peer("svc.c@^3.0.0"),
            entry("svc.c", "3.2.1"),
        ]);

        let result = Resolver::default().resolve(&snapshot, &[spec("svc.a@^1.0.0")], None, None);

        assert_eq!(
            resolved(&result),
            vec![
                ("svc.a".to_string(), "1.0.0".to_string()),
                ("svc.b".to_string(), "1.1.0".to_string()),
                ("svc.c".to_string(), "3.2.1".to_string()),
            ]
        );
    }

    #[test]
    fn peer_cycles_are_tolerated() {
        let snapshot = registry(vec![
            entry("svc.a", "1.0.0").with_peer("svc.b@^1.0.0"),
            entry("svc.b", "1.0.0").with_peer("svc.a@^1.0.0"),
        ]);

        let result = Resolver::default().resolve(&snapshot, &[spec("svc.a@^1.0.0")], None, None);
        assert!(result.success);
        assert_eq!(result.resolved_versions.len(), 2);
    }

    #[test]
    fn unsatisfiable_peer_reports_both_requirements() {
        let snapshot = registry(vec![
            entry("svc.a", "1.0.0").with_peer("svc.b@^1.0.0"),
            entry("svc.b", "1.0.0"),
            entry("svc.b", "2.0.0"),
        ]);

        let result = Resolver::default().resolve(
            &snapshot,
            &[spec("svc.a@^1.0.0"), spec("svc.b@^2.0.0")],
            None,
            None,
        );

        assert!(!result.success);
        assert!(result.resolved_versions.is_empty());
        let message = result.error_message.unwrap();
        assert!(message.contains("svc.b"), "{message}");
        assert!(message.contains("peer of svc.a@1.0.0"), "{message}");
    }

    #[test]
    fn unknown_connector_fails_without_partial_map() {
        let snapshot = registry(vec![entry("svc.a", "1.0.0")]);

        let result = Resolver::default().resolve(
            &snapshot,
            &[spec("svc.a@^1.0.0"), spec("svc.missing@^1.0.0")],
            None,
            None,
        );

        assert!(!result.success);
        assert!(result.resolved_versions.is_empty());
        assert!(matches!(
            result.failure,
            Some(ResolutionFailure::UnknownConnector { .. })
        ));
    }

    #[test]
    fn lockfile_pin_outside_range_is_ignored() {
        let snapshot = registry(vec![entry("svc.a", "1.0.0"), entry("svc.a", "2.1.0")]);
        let lockfile = Lockfile::new().pin("svc.a", "1.0.0");

        let result =
            Resolver::default().resolve(&snapshot, &[spec("svc.a@^2.0.0")], None, Some(&lockfile));
        assert_eq!(result.version_of("svc.a"), Some(&v("2.1.0")));
    }

    #[test]
    fn lockfile_pin_missing_from_registry_is_a_mismatch() {
        let snapshot = registry(vec![entry("svc.a", "1.0.0"), entry("svc.a", "1.2.0")]);
        let lockfile = Lockfile::new().pin("svc.a", "1.1.0");

        let result =
            Resolver::default().resolve(&snapshot, &[spec("svc.a@^1.0.0")], None, Some(&lockfile));
        assert!(matches!(
            result.failure,
            Some(ResolutionFailure::LockfileMismatch { .. })
        ));
    }

    #[test]
    fn malformed_lockfile_is_an_invalid_request() {
        let snapshot = registry(vec![entry("svc.a", "1.0.0")]);
        let lockfile = Lockfile::new().pin("svc.a", "one");

        let result =
            Resolver::default().resolve(&snapshot, &[spec("svc.a@^1.0.0")], None, Some(&lockfile));
        assert!(matches!(
            result.failure,
            Some(ResolutionFailure::InvalidRequest { .. })
        ));
    }

    #[test]
    fn malformed_request_range_is_returned_as_data() {
        let snapshot = registry(vec![entry("svc.a", "1.0.0")]);
        let request = ResolutionRequest {
            requested: BTreeMap::from([(ConnectorId::new("svc.a"), ">>1".to_string())]),
            ..ResolutionRequest::default()
        };

        let result = Resolver::default().resolve_request(&snapshot, &request);
        assert!(!result.success);
        assert!(result.error_message.unwrap().contains("svc.a@>>1"));
    }

    #[test]
    fn prefer_version_breaks_ties_only() {
        let snapshot = registry(vec![
            entry("svc.a", "1.0.0").with_peer("svc.b@1.0.0").with_preferred("svc.b", "1.0.0+build.1"),
            entry("svc.b", "1.0.0+build.1"),
            entry("svc.b", "1.0.0+build.2"),
            entry("svc.b", "0.9.0"),
        ]);

        let result = Resolver::default().resolve(&snapshot, &[spec("svc.a@^1.0.0")], None, None);
        assert_eq!(result.version_of("svc.b"), Some(&v("1.0.0+build.1")));

        let result = Resolver::default().resolve(&snapshot, &[spec("svc.b@1.0.0")], None, None);
        assert_eq!(result.version_of("svc.b"), Some(&v("1.0.0+build.2")));
    }

    #[test]
    fn prefer_version_never_overrides_range() {
        let snapshot = registry(vec![
            entry("svc.a", "1.0.0").with_peer("svc.b@^2.0.0").with_preferred("svc.b", "1.0.0"),
            entry("svc.b", "1.0.0"),
            entry("svc.b", "2.3.0"),
        ]);

        let result = Resolver::default().resolve(&snapshot, &[spec("svc.a@^1.0.0")], None, None);
        assert_eq!(result.version_of("svc.b"), Some(&v("2.3.0")));
    }

    #[test]
    fn declared_strategy_applies_when_unanimous() {
        let snapshot = registry(vec![
            entry("svc.a", "1.0.0").with_strategy(ResolutionStrategy::PreferStable),
            entry("svc.a", "1.1.0-rc.1").with_strategy(ResolutionStrategy::PreferStable),
        ]);

        let result = Resolver::default().resolve(&snapshot, &[spec("svc.a@^1.0.0")], None, None);
        assert_eq!(result.strategy, ResolutionStrategy::PreferStable);
        assert_eq!(result.version_of("svc.a"), Some(&v("1.0.0")));

        let result = Resolver::default().resolve(
            &snapshot,
            &[spec("svc.a@^1.0.0")],
            Some(ResolutionStrategy::HighestCompatible),
            None,
        );
        assert_eq!(result.version_of("svc.a"), Some(&v("1.1.0-rc.1")));
    }

    #[test]
    fn search_respects_step_limit() {
        let mut entries = Vec::new();
        for minor in 0..5 {
            entries.push(entry("svc.a", &format!("1.{minor}.0")).with_incompatible("svc.b@*"));
        }
        entries.push(entry("svc.b", "1.0.0"));
        let snapshot = registry(entries);
        let resolver = Resolver::new(ResolverConfig {
            max_steps: 2,
            ..ResolverConfig::default()
        });

        let result = resolver.resolve(
            &snapshot,
            &[spec("svc.a@^1.0.0"), spec("svc.b@^1.0.0")],
            None,
            None,
        );
        assert!(!result.success);
    }

    #[test]
    fn lockfile_from_result() {
        let snapshot = registry(vec![
            entry("svc.a", "1.0.0").with_peer("svc.b@^1.0.0"),
            entry("svc.b", "1.3.0"),
        ]);
        let result = Resolver::default().resolve(&snapshot, &[spec("svc.a@^1.0.0")], None, None);

        let lockfile = Lockfile::from_result(&result).unwrap();
        assert_eq!(lockfile.get("svc.a"), Some("1.0.0"));
        assert_eq!(lockfile.get("svc.b"), Some("1.3.0"));

        let json = serde_json::to_string(&lockfile).unwrap();
        assert_eq!(json, r#"{"svc.a":"1.0.0","svc.b":"1.3.0"}"#);
    }

    #[test]
    fn dependency_spec_parsing() {
        let parsed = spec("svc.a@>=1.0.0 <2.0.0");
        assert_eq!(parsed.connector.as_str(), "svc.a");
        assert!(parsed.range.matches(&v("1.5.0")));

        let scoped = spec("@org/connector@^1.0.0");
        assert_eq!(scoped.connector.as_str(), "@org/connector");

        assert!(spec("svc.any").range.is_any());
        assert!(DependencySpec::parse("").is_err());
    }

    #[test]
    fn scoped_id_without_range_accepts_any_version() {
        let parsed = spec("@org/x");
        assert_eq!(parsed.connector.as_str(), "@org/x");
        assert!(parsed.range.is_any());

        let parsed = spec("  @org/x@~2.1.0 ");
        assert_eq!(parsed.connector.as_str(), "@org/x");
        assert!(parsed.range.matches(&v("2.1.7")));
        assert!(!parsed.range.matches(&v("2.2.0")));
    }

    #[test]
    fn strategy_parsing_accepts_common_spellings() {
        for input in ["preferStable", "prefer-stable", "PreferStable", "prefer_stable"] {
            assert_eq!(
                input.parse::<ResolutionStrategy>().unwrap(),
                ResolutionStrategy::PreferStable
            );
        }
        assert!("newest".parse::<ResolutionStrategy>().is_err());
    }
}
