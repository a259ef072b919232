use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::version::{parse_version, PackVersion, VersionParseError};

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to parse pack manifest: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("pack id '{id}' is invalid: {reason}")]
    InvalidId { id: String, reason: String },

    #[error("pack '{pack_id}' has an invalid version")]
    InvalidVersion {
        pack_id: String,
        #[source]
        source: VersionParseError,
    },

    #[error("pack '{pack_id}' declares page '{key}' more than once")]
    DuplicatePage { pack_id: String, key: String },

    #[error("pack '{pack_id}' declares a page with an empty key")]
    EmptyPageKey { pack_id: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PageDefinition {
    pub key: String,
    pub file: String,
    #[serde(default)]
    pub prefix: Option<String>,
}

impl PageDefinition {
    pub fn default_title(&self) -> String {
        match self.prefix.as_deref().map(str::trim) {
            Some(prefix) if !prefix.is_empty() => format!("{prefix}/{}", self.key),
            _ => self.key.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PackDefinition {
    pub id: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub pages: Vec<PageDefinition>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl PackDefinition {
    pub fn from_toml_str(input: &str) -> Result<Self, ManifestError> {
        let pack: Self = toml::from_str(input)?;
        pack.validate()?;
        Ok(pack)
    }

    pub fn validate(&self) -> Result<(), ManifestError> {
        validate_pack_id(&self.id)?;
        self.parsed_version()
            .map_err(|source| ManifestError::InvalidVersion {
                pack_id: self.id.clone(),
                source,
            })?;

        let mut seen_keys = HashSet::with_capacity(self.pages.len());
        for page in &self.pages {
            if page.key.trim().is_empty() {
                return Err(ManifestError::EmptyPageKey {
                    pack_id: self.id.clone(),
                });
            }
            if !seen_keys.insert(page.key.as_str()) {
                return Err(ManifestError::DuplicatePage {
                    pack_id: self.id.clone(),
                    key: page.key.clone(),
                });
            }
        }

        Ok(())
    }

    pub fn parsed_version(&self) -> Result<PackVersion, VersionParseError> {
        parse_version(&self.version)
    }

    pub fn page_keys(&self) -> impl Iterator<Item = &str> {
        self.pages.iter().map(|page| page.key.as_str())
    }

    pub fn page(&self, key: &str) -> Option<&PageDefinition> {
        self.pages.iter().find(|page| page.key == key)
    }
}

fn validate_pack_id(id: &str) -> Result<(), ManifestError> {
    let invalid = |reason: &str| ManifestError::InvalidId {
        id: id.to_string(),
        reason: reason.to_string(),
    };

    if id.is_empty() {
        return Err(invalid("must not be empty"));
    }
    if id.len() > 128 {
        return Err(invalid("must be at most 128 characters"));
    }
    if id.chars().any(|ch| ch.is_whitespace() || ch == '/' || ch == '\\') {
        return Err(invalid("must not contain whitespace or path separators"));
    }

    Ok(())
}
