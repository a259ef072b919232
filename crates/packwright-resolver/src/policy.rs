use std::collections::BTreeSet;
use std::fmt;

use packwright_core::{parse_version, VersionParseError};
use serde::Serialize;

use crate::graph::PackGraph;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateCandidate<'a> {
    pub pack_id: &'a str,
    pub current: &'a str,
    pub target: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VersionIssue {
    /// Crossing a major version is treated as a breaking change and refused.
    MajorVersionChange {
        pack_id: String,
        current: String,
        target: String,
    },
    /// Installed packs that depend on an updated pack but are not themselves
    /// part of the update.
    DependentsNotUpdated {
        pack_id: String,
        dependents: Vec<String>,
    },
}

impl VersionIssue {
    pub fn is_blocking(&self) -> bool {
        matches!(self, Self::MajorVersionChange { .. })
    }

    pub fn pack_id(&self) -> &str {
        match self {
            Self::MajorVersionChange { pack_id, .. } | Self::DependentsNotUpdated { pack_id, .. } => {
                pack_id
            }
        }
    }
}

impl fmt::Display for VersionIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MajorVersionChange {
                pack_id,
                current,
                target,
            } => write!(
                f,
                "updating '{pack_id}' from {current} to {target} crosses a major version"
            ),
            Self::DependentsNotUpdated {
                pack_id,
                dependents,
            } => write!(
                f,
                "'{pack_id}' is being updated but installed dependents are not: {}",
                dependents.join(", ")
            ),
        }
    }
}

/// Evaluates the update policy for one pack.
///
/// `installed` is the set of packs currently materialized and `updating` the
/// set of packs whose update is part of the same change.
pub fn check_update(
    graph: &PackGraph,
    candidate: UpdateCandidate<'_>,
    installed: &BTreeSet<String>,
    updating: &BTreeSet<String>,
) -> Result<Vec<VersionIssue>, VersionParseError> {
    let current = parse_version(candidate.current)?;
    let target = parse_version(candidate.target)?;
    let mut issues = Vec::new();

    if current.is_major_change(&target) {
        issues.push(VersionIssue::MajorVersionChange {
            pack_id: candidate.pack_id.to_string(),
            current: candidate.current.to_string(),
            target: candidate.target.to_string(),
        });
    }

    let stale_dependents: Vec<String> = graph
        .dependents_of(candidate.pack_id)
        .filter(|dependent| installed.contains(*dependent) && !updating.contains(*dependent))
        .map(str::to_string)
        .collect();
    if !stale_dependents.is_empty() {
        issues.push(VersionIssue::DependentsNotUpdated {
            pack_id: candidate.pack_id.to_string(),
            dependents: stale_dependents,
        });
    }

    Ok(issues)
}
