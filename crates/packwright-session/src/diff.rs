use std::collections::BTreeMap;

use serde::Serialize;

use crate::state::{ConflictType, PackAction, PackSelection, PageSelection, SelectionState};

/// Changed page fields; `None` means unchanged. Nullable fields use a nested
/// option so a change to null serializes as an explicit `null`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PageDiff {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_conflict: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflict_type: Option<Option<ConflictType>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PackDiff {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_selected: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_selected_reason: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<PackAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_version: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_version: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<Option<String>>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub pages: BTreeMap<String, PageDiff>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub removed_pages: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StateDiff {
    pub packs: BTreeMap<String, PackDiff>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub removed: Vec<String>,
}

impl StateDiff {
    pub fn is_empty(&self) -> bool {
        self.packs.is_empty() && self.removed.is_empty()
    }
}

impl PageDiff {
    fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl PackDiff {
    fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

fn changed<T: PartialEq + Clone>(old: &T, new: &T) -> Option<T> {
    (old != new).then(|| new.clone())
}

fn page_diff(old: Option<&PageSelection>, new: &PageSelection) -> PageDiff {
    let blank = PageSelection::default();
    let full = old.is_none();
    let old = old.unwrap_or(&blank);
    let pick = |o: &String, n: &String| if full { Some(n.clone()) } else { changed(o, n) };

    PageDiff {
        name: pick(&old.name, &new.name),
        default_title: pick(&old.default_title, &new.default_title),
        final_title: pick(&old.final_title, &new.final_title),
        has_conflict: if full {
            Some(new.has_conflict)
        } else {
            changed(&old.has_conflict, &new.has_conflict)
        },
        conflict_type: if full {
            Some(new.conflict_type)
        } else {
            changed(&old.conflict_type, &new.conflict_type)
        },
    }
}

fn pack_diff(old: Option<&PackSelection>, new: &PackSelection) -> PackDiff {
    let blank = PackSelection::default();
    let full = old.is_none();
    let old = old.unwrap_or(&blank);

    fn pick<T: PartialEq + Clone>(full: bool, old: &T, new: &T) -> Option<T> {
        if full {
            Some(new.clone())
        } else {
            changed(old, new)
        }
    }

    let mut pages = BTreeMap::new();
    for (key, page) in &new.pages {
        let existing = if full { None } else { old.pages.get(key) };
        let diff = page_diff(existing, page);
        if !diff.is_empty() {
            pages.insert(key.clone(), diff);
        }
    }

    PackDiff {
        selected: pick(full, &old.selected, &new.selected),
        auto_selected: pick(full, &old.auto_selected, &new.auto_selected),
        auto_selected_reason: pick(full, &old.auto_selected_reason, &new.auto_selected_reason),
        action: pick(full, &old.action, &new.action),
        current_version: pick(full, &old.current_version, &new.current_version),
        target_version: pick(full, &old.target_version, &new.target_version),
        prefix: pick(full, &old.prefix, &new.prefix),
        pages,
        removed_pages: old
            .pages
            .keys()
            .filter(|key| !new.pages.contains_key(*key))
            .cloned()
            .collect(),
    }
}

/// Minimal nested diff from `old` to `new`. Packs and pages that only exist
/// in `new` are emitted in full.
pub fn compute_diff(old: &SelectionState, new: &SelectionState) -> StateDiff {
    let mut packs = BTreeMap::new();
    for (id, pack) in &new.packs {
        let diff = pack_diff(old.packs.get(id), pack);
        if !diff.is_empty() {
            packs.insert(id.clone(), diff);
        }
    }

    StateDiff {
        packs,
        removed: old
            .packs
            .keys()
            .filter(|id| !new.packs.contains_key(*id))
            .cloned()
            .collect(),
    }
}

fn overlay<T: Clone>(target: &mut T, value: &Option<T>) {
    if let Some(value) = value {
        *target = value.clone();
    }
}

/// Overlays `diff` onto `old`, the inverse of [`compute_diff`].
pub fn apply_diff(old: &SelectionState, diff: &StateDiff) -> SelectionState {
    let mut state = old.clone();
    for id in &diff.removed {
        state.packs.remove(id);
    }

    for (id, pack_diff) in &diff.packs {
        let pack = state.packs.entry(id.clone()).or_default();
        overlay(&mut pack.selected, &pack_diff.selected);
        overlay(&mut pack.auto_selected, &pack_diff.auto_selected);
        overlay(&mut pack.auto_selected_reason, &pack_diff.auto_selected_reason);
        overlay(&mut pack.action, &pack_diff.action);
        overlay(&mut pack.current_version, &pack_diff.current_version);
        overlay(&mut pack.target_version, &pack_diff.target_version);
        overlay(&mut pack.prefix, &pack_diff.prefix);

        for key in &pack_diff.removed_pages {
            pack.pages.remove(key);
        }
        for (key, page_diff) in &pack_diff.pages {
            let page = pack.pages.entry(key.clone()).or_default();
            overlay(&mut page.name, &page_diff.name);
            overlay(&mut page.default_title, &page_diff.default_title);
            overlay(&mut page.final_title, &page_diff.final_title);
            overlay(&mut page.has_conflict, &page_diff.has_conflict);
            overlay(&mut page.conflict_type, &page_diff.conflict_type);
        }
    }

    state
}
