//! Semantic version parsing, comparison, and range matching.
//!
//! Versions follow semver 2.0.0. Ranges are sets of comparators:
//!
//! - whitespace or commas join comparators that must all hold
//!   (`>=1.0.0 <2.0.0`, `>=1.0.0, <2.0.0`)
//! - `||` separates alternatives, any of which may hold
//! - operators `=`, `>`, `>=`, `<`, `<=`, `^`, `~`, and wildcards
//!   (`*`, `1.x`, `1.2.*`)
//! - a bare version (`1.2.0`) is an exact pin
//!
//! Matching uses plain precedence, so pre-releases can satisfy a range
//! (`1.3.0-beta.1` satisfies `^1.0.0`). Pre-releases of an exclusive upper
//! bound never do: `2.0.0-rc.1` does not satisfy `^1.0.0`.

use crate::error::VersionError;
use semver::{Comparator, Op, Prerelease};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// A published connector version.
///
/// Ordering includes build metadata as a final tie-breaker so that distinct
/// builds of the same release are distinct registry keys. Use
/// [`Version::cmp_precedence`] for semver precedence.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version(semver::Version);

impl Version {
    /// Parses a strict semantic version.
    ///
    /// # Errors
    ///
    /// Returns `InvalidVersionFormat` for anything that is not a full
    /// `major.minor.patch[-pre][+build]` version.
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        semver::Version::parse(input.trim())
            .map(Self)
            .map_err(|e| VersionError::InvalidVersionFormat {
                input: input.to_string(),
                reason: e.to_string(),
            })
    }

    /// Creates a release version with no pre-release or build metadata.
    #[must_use]
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self(semver::Version::new(major, minor, patch))
    }

    /// Returns true if the version carries a pre-release tag.
    #[must_use]
    pub fn is_prerelease(&self) -> bool {
        !self.0.pre.is_empty()
    }

    /// Compares two versions by semver precedence, ignoring build metadata.
    #[must_use]
    pub fn cmp_precedence(&self, other: &Self) -> Ordering {
        precedence(&self.0).cmp(&precedence(&other.0))
    }

    /// Returns the underlying semver value.
    #[must_use]
    pub fn as_semver(&self) -> &semver::Version {
        &self.0
    }

    fn triple(&self) -> (u64, u64, u64) {
        (self.0.major, self.0.minor, self.0.patch)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Version {
    type Error = VersionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Version> for String {
    fn from(value: Version) -> Self {
        value.to_string()
    }
}

fn precedence(v: &semver::Version) -> (u64, u64, u64, &Prerelease) {
    (v.major, v.minor, v.patch, &v.pre)
}

/// A version range: a disjunction of comparator conjunctions.
///
/// An empty conjunction matches every version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VersionRange {
    alternatives: Vec<Vec<Comparator>>,
}

impl VersionRange {
    /// A range matching every version.
    #[must_use]
    pub fn any() -> Self {
        Self {
            alternatives: vec![Vec::new()],
        }
    }

    /// A range matching exactly one version (by precedence).
    #[must_use]
    pub fn exact(version: &Version) -> Self {
        let v = version.as_semver();
        Self {
            alternatives: vec![vec![Comparator {
                op: Op::Exact,
                major: v.major,
                minor: Some(v.minor),
                patch: Some(v.patch),
                pre: v.pre.clone(),
            }]],
        }
    }

    /// A range matching versions compatible with `version` (`^version`).
    #[must_use]
    pub fn caret(version: &Version) -> Self {
        let v = version.as_semver();
        Self {
            alternatives: vec![vec![Comparator {
                op: Op::Caret,
                major: v.major,
                minor: Some(v.minor),
                patch: Some(v.patch),
                pre: v.pre.clone(),
            }]],
        }
    }

    /// Parses a range expression.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRangeFormat` if the input is empty or any comparator
    /// is malformed.
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let invalid = |reason: String| VersionError::InvalidRangeFormat {
            input: input.to_string(),
            reason,
        };

        if input.trim().is_empty() {
            return Err(invalid("range is empty".to_string()));
        }

        let mut alternatives = Vec::new();
        for alternative in input.split("||") {
            let tokens = tokenize(alternative);
            if tokens.is_empty() {
                return Err(invalid("empty alternative around '||'".to_string()));
            }

            let mut comparators = Vec::new();
            for token in tokens {
                if is_match_all(&token) {
                    continue;
                }
                let normalized = if starts_bare(&token) && !is_wildcard(&token) {
                    format!("={token}")
                } else {
                    token.clone()
                };
                let comparator = Comparator::parse(&normalized)
                    .map_err(|e| invalid(format!("'{token}': {e}")))?;
                comparators.push(comparator);
            }
            alternatives.push(comparators);
        }

        Ok(Self { alternatives })
    }

    /// Returns true if the version satisfies any alternative.
    #[must_use]
    pub fn matches(&self, version: &Version) -> bool {
        self.alternatives
            .iter()
            .any(|set| set.iter().all(|c| comparator_matches(c, version)))
    }

    /// Returns true if the range places no constraint at all.
    #[must_use]
    pub fn is_any(&self) -> bool {
        self.alternatives.iter().any(Vec::is_empty)
    }

    /// Returns the range satisfied exactly by versions satisfying both
    /// `self` and `other`.
    #[must_use]
    pub fn intersect(&self, other: &Self) -> Self {
        let mut alternatives = Vec::with_capacity(self.alternatives.len() * other.alternatives.len());
        for left in &self.alternatives {
            for right in &other.alternatives {
                let mut merged = left.clone();
                for comparator in right {
                    if !merged.contains(comparator) {
                        merged.push(comparator.clone());
                    }
                }
                if !alternatives.contains(&merged) {
                    alternatives.push(merged);
                }
            }
        }
        Self { alternatives }
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, set) in self.alternatives.iter().enumerate() {
            if i > 0 {
                f.write_str(" || ")?;
            }
            if set.is_empty() {
                f.write_str("*")?;
            }
            for (j, comparator) in set.iter().enumerate() {
                if j > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{comparator}")?;
            }
        }
        Ok(())
    }
}

impl FromStr for VersionRange {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for VersionRange {
    type Error = VersionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<VersionRange> for String {
    fn from(value: VersionRange) -> Self {
        value.to_string()
    }
}

/// Splits one alternative into comparator tokens, gluing a bare operator
/// (`>= 1.0.0`) to the version that follows it.
fn tokenize(alternative: &str) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    let mut pending_op: Option<String> = None;

    for raw in alternative.split(|c: char| c.is_whitespace() || c == ',') {
        if raw.is_empty() {
            continue;
        }
        if raw.chars().all(|c| matches!(c, '=' | '<' | '>' | '^' | '~')) {
            let op = pending_op.take().unwrap_or_default();
            pending_op = Some(op + raw);
            continue;
        }
        match pending_op.take() {
            Some(op) => tokens.push(op + raw),
            None => tokens.push(raw.to_string()),
        }
    }
    if let Some(op) = pending_op {
        tokens.push(op);
    }
    tokens
}

fn is_match_all(token: &str) -> bool {
    matches!(token, "*" | "x" | "X")
}

fn starts_bare(token: &str) -> bool {
    token.chars().next().is_some_and(|c| c.is_ascii_digit())
}

fn is_wildcard(token: &str) -> bool {
    token
        .split(['-', '+'])
        .next()
        .is_some_and(|core| core.split('.').any(|part| matches!(part, "*" | "x" | "X")))
}

fn comparator_matches(c: &Comparator, version: &Version) -> bool {
    let v = version.as_semver();
    let full = |minor: u64, patch: u64, pre: &Prerelease| {
        precedence(v).cmp(&(c.major, minor, patch, pre))
    };
    let at_least = |minor: u64, patch: u64| full(minor, patch, &Prerelease::EMPTY).is_ge();
    let below = |major: u64, minor: u64, patch: u64| version.triple() < (major, minor, patch);

    match (c.op, c.minor, c.patch) {
        (Op::Exact, Some(minor), Some(patch)) => full(minor, patch, &c.pre).is_eq(),
        (Op::Exact | Op::Wildcard | Op::Tilde, Some(minor), None) => {
            at_least(minor, 0) && below(c.major, minor + 1, 0)
        }
        (Op::Exact | Op::Wildcard | Op::Tilde | Op::Caret, None, _) => {
            at_least(0, 0) && below(c.major + 1, 0, 0)
        }
        (Op::Greater, Some(minor), Some(patch)) => full(minor, patch, &c.pre).is_gt(),
        (Op::Greater, Some(minor), None) => at_least(minor + 1, 0),
        (Op::Greater, None, _) => {
            precedence(v).cmp(&(c.major + 1, 0, 0, &Prerelease::EMPTY)).is_ge()
        }
        (Op::GreaterEq, minor, patch) => {
            full(minor.unwrap_or(0), patch.unwrap_or(0), &c.pre).is_ge()
        }
        (Op::Less, Some(minor), Some(patch)) if !c.pre.is_empty() => {
            full(minor, patch, &c.pre).is_lt()
        }
        (Op::Less, minor, patch) => below(c.major, minor.unwrap_or(0), patch.unwrap_or(0)),
        (Op::LessEq, Some(minor), Some(patch)) => full(minor, patch, &c.pre).is_le(),
        (Op::LessEq, Some(minor), None) => below(c.major, minor + 1, 0),
        (Op::LessEq, None, _) => below(c.major + 1, 0, 0),
        (Op::Tilde, Some(minor), Some(patch)) => {
            full(minor, patch, &c.pre).is_ge() && below(c.major, minor + 1, 0)
        }
        (Op::Caret, Some(minor), patch) => {
            let lower = full(minor, patch.unwrap_or(0), &c.pre).is_ge();
            let upper = match (c.major, minor, patch) {
                (0, 0, Some(patch)) => below(0, 0, patch + 1),
                (0, minor, _) => below(0, minor + 1, 0),
                (major, _, _) => below(major + 1, 0, 0),
            };
            lower && upper
        }
        _ => false,
    }
}

/// Returns true if `version` satisfies `range`.
///
/// # Errors
///
/// Returns a `VersionError` if either string is malformed.
pub fn satisfies(version: &str, range: &str) -> Result<bool, VersionError> {
    let version = Version::parse(version)?;
    let range = VersionRange::parse(range)?;
    Ok(range.matches(&version))
}

/// Compares two version strings by semver precedence.
///
/// # Errors
///
/// Returns `InvalidVersionFormat` if either string is malformed.
pub fn compare(v1: &str, v2: &str) -> Result<Ordering, VersionError> {
    Ok(Version::parse(v1)?.cmp_precedence(&Version::parse(v2)?))
}

/// Returns true if the version string carries a pre-release tag.
///
/// # Errors
///
/// Returns `InvalidVersionFormat` if the string is malformed.
pub fn is_prerelease(version: &str) -> Result<bool, VersionError> {
    Ok(Version::parse(version)?.is_prerelease())
}
