use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use packwright_core::{compare_versions, parse_version, PageDefinition};
use serde::{Deserialize, Serialize};

use crate::hash::sha256_hex;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub user_id: String,
    pub ref_id: String,
}

impl SessionKey {
    pub fn new(user_id: impl Into<String>, ref_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ref_id: ref_id.into(),
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.user_id, self.ref_id)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackAction {
    Install,
    Update,
    Remove,
    #[default]
    Unchanged,
}

impl PackAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Update => "update",
            Self::Remove => "remove",
            Self::Unchanged => "unchanged",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    /// The title exists in the target store and no pack owns it.
    ExternalCollision,
    /// The title is owned by content from a different source.
    PackConflict,
    /// Two wanted pages in this session resolve to the same title.
    DuplicateTitle,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSelection {
    pub name: String,
    pub default_title: String,
    pub final_title: String,
    pub has_conflict: bool,
    pub conflict_type: Option<ConflictType>,
}

impl PageSelection {
    pub(crate) fn from_definition(page: &PageDefinition, pack_prefix: Option<&str>) -> Self {
        let default_title = page.default_title();
        Self {
            name: page.key.clone(),
            final_title: expected_title(pack_prefix, &page.key, &default_title),
            default_title,
            has_conflict: false,
            conflict_type: None,
        }
    }

    pub(crate) fn set_conflict(&mut self, conflict: Option<ConflictType>) {
        self.has_conflict = conflict.is_some();
        self.conflict_type = conflict;
    }
}

/// Title a page gets when nobody has renamed it by hand.
pub(crate) fn expected_title(pack_prefix: Option<&str>, key: &str, default_title: &str) -> String {
    match pack_prefix {
        Some(prefix) => prefixed_title(prefix, key),
        None => default_title.to_string(),
    }
}

pub(crate) fn prefixed_title(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}/{key}")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackSelection {
    pub selected: bool,
    pub auto_selected: bool,
    pub auto_selected_reason: Option<String>,
    pub action: PackAction,
    pub current_version: Option<String>,
    pub target_version: Option<String>,
    pub prefix: Option<String>,
    pub pages: BTreeMap<String, PageSelection>,
}

impl PackSelection {
    /// Part of the desired end state, either chosen or pulled in.
    pub fn is_wanted(&self) -> bool {
        self.selected || self.auto_selected
    }

    pub fn is_installed(&self) -> bool {
        self.current_version.is_some()
    }

    pub fn is_offered(&self) -> bool {
        self.target_version.is_some()
    }

    pub(crate) fn versions_differ(&self) -> bool {
        match (&self.current_version, &self.target_version) {
            (Some(current), Some(target)) => match compare_versions(current, target) {
                Ok(ordering) => ordering.is_ne(),
                Err(_) => current != target,
            },
            _ => false,
        }
    }

    /// An installed pack whose offered version crosses a major boundary stays
    /// at its installed version. Unparsable versions are never held.
    pub fn is_held_back(&self) -> bool {
        let (Some(current), Some(target)) = (&self.current_version, &self.target_version) else {
            return false;
        };
        match (parse_version(current), parse_version(target)) {
            (Ok(current), Ok(target)) => current.is_major_change(&target),
            _ => false,
        }
    }

    pub(crate) fn derive_action(&self) -> PackAction {
        match (self.is_installed(), self.is_offered()) {
            (false, _) => PackAction::Install,
            (true, false) => PackAction::Remove,
            (true, true) if !self.is_wanted() => PackAction::Remove,
            (true, true) if self.is_held_back() => PackAction::Unchanged,
            (true, true) if self.versions_differ() => PackAction::Update,
            (true, true) => PackAction::Unchanged,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionState {
    pub user_id: String,
    pub ref_id: String,
    pub source_id: String,
    pub packs: BTreeMap<String, PackSelection>,
}

impl SelectionState {
    pub fn new(key: &SessionKey, source_id: impl Into<String>) -> Self {
        Self {
            user_id: key.user_id.clone(),
            ref_id: key.ref_id.clone(),
            source_id: source_id.into(),
            packs: BTreeMap::new(),
        }
    }

    pub fn key(&self) -> SessionKey {
        SessionKey::new(self.user_id.clone(), self.ref_id.clone())
    }

    /// SHA-256 of the canonical JSON form. Every map in the state is ordered,
    /// so equal states hash equally in any process.
    pub fn content_hash(&self) -> Result<String, serde_json::Error> {
        let canonical = serde_json::to_vec(self)?;
        Ok(sha256_hex(&canonical))
    }

    pub fn pack(&self, id: &str) -> Option<&PackSelection> {
        self.packs.get(id)
    }

    pub fn explicit_selection(&self) -> BTreeSet<String> {
        self.ids_where(|pack| pack.selected)
    }

    pub fn wanted(&self) -> BTreeSet<String> {
        self.ids_where(PackSelection::is_wanted)
    }

    pub fn installed(&self) -> BTreeSet<String> {
        self.ids_where(PackSelection::is_installed)
    }

    fn ids_where(&self, predicate: impl Fn(&PackSelection) -> bool) -> BTreeSet<String> {
        self.packs
            .iter()
            .filter(|(_, pack)| predicate(*pack))
            .map(|(id, _)| id.clone())
            .collect()
    }
}
