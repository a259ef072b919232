use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use semver::Version;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid pack version '{input}': {reason}")]
pub struct VersionParseError {
    pub input: String,
    pub reason: String,
}

/// A pack version as published by a manifest.
///
/// Manifests in the wild carry `2`, `2.1` or `2.1.3`; missing components are
/// treated as zero so all three forms compare against each other.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackVersion(Version);

impl PackVersion {
    pub fn major(&self) -> u64 {
        self.0.major
    }

    pub fn minor(&self) -> u64 {
        self.0.minor
    }

    pub fn patch(&self) -> u64 {
        self.0.patch
    }

    pub fn as_semver(&self) -> &Version {
        &self.0
    }

    /// Ordering over `(major, minor, patch)` only; pre-release tags do not
    /// participate.
    pub fn cmp_release(&self, other: &Self) -> Ordering {
        (self.major(), self.minor(), self.patch()).cmp(&(
            other.major(),
            other.minor(),
            other.patch(),
        ))
    }

    pub fn is_major_change(&self, other: &Self) -> bool {
        self.major() != other.major()
    }
}

impl fmt::Display for PackVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for PackVersion {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_version(s)
    }
}

pub fn parse_version(input: &str) -> Result<PackVersion, VersionParseError> {
    let error = |reason: &str| VersionParseError {
        input: input.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = input.trim();
    let trimmed = trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed);
    if trimmed.is_empty() {
        return Err(error("version must not be empty"));
    }

    let split_at = trimmed
        .find(|ch: char| ch == '-' || ch == '+')
        .unwrap_or(trimmed.len());
    let (core, suffix) = trimmed.split_at(split_at);

    let components: Vec<&str> = core.split('.').collect();
    if components.len() > 3 {
        return Err(error("expected at most major.minor.patch"));
    }
    for component in &components {
        if component.is_empty() || !component.chars().all(|ch| ch.is_ascii_digit()) {
            return Err(error("version components must be non-negative integers"));
        }
    }

    let mut padded = components.join(".");
    for _ in components.len()..3 {
        padded.push_str(".0");
    }
    padded.push_str(suffix);

    Version::parse(&padded)
        .map(PackVersion)
        .map_err(|err| error(&err.to_string()))
}

pub fn compare_versions(left: &str, right: &str) -> Result<Ordering, VersionParseError> {
    let left = parse_version(left)?;
    let right = parse_version(right)?;
    Ok(left.cmp_release(&right))
}
