use std::fmt;

use packwright_resolver::VersionIssue;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Pack,
    Page,
    Session,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pack => "pack",
            Self::Page => "page",
            Self::Session => "session",
        })
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("{kind} '{id}' not found")]
    NotFound { kind: EntityKind, id: String },

    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// Recoverable by repeating the deselect with cascade confirmed.
    #[error("cannot deselect '{pack_id}': still required by {}", dependents.join(", "))]
    CascadeRequired {
        pack_id: String,
        dependents: Vec<String>,
    },

    #[error("dependency conflict: {0}")]
    DependencyConflict(VersionIssue),

    #[error("nothing to apply: no pack would be installed, updated or removed")]
    NoOperations,

    #[error("failed to serialize session state")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl SessionError {
    pub(crate) fn pack_not_found(id: &str) -> Self {
        Self::NotFound {
            kind: EntityKind::Pack,
            id: id.to_string(),
        }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Stable machine-readable name for the error kind.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::InvalidInput { .. } => "invalid_input",
            Self::CascadeRequired { .. } => "cascade_required",
            Self::DependencyConflict(_) => "dependency_conflict",
            Self::NoOperations => "no_operations",
            Self::Serialization(_) | Self::Backend(_) => "internal",
        }
    }
}
