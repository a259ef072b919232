//! Session transitions.
//!
//! Every function here takes the loaded snapshot and a [`ResolveContext`]
//! explicitly and mutates only that snapshot. Loading and saving belong to
//! the [`CommandProcessor`](crate::CommandProcessor).

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use packwright_core::{parse_version, VersionParseError};
use packwright_resolver::{
    check_update, direct_dependents, resolve_auto_selections, validate_removal, UpdateCandidate,
    VersionIssue,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::apply::{build_operations, Operation};
use crate::conflicts::detect_conflicts;
use crate::context::ResolveContext;
use crate::error::{EntityKind, SessionError};
use crate::state::{
    expected_title, prefixed_title, PackAction, PackSelection, PageSelection, SelectionState,
    SessionKey,
};

/// Raw command as received from an outer API layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRequest {
    pub command: String,
    pub source: String,
    #[serde(rename = "ref")]
    pub reference: String,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Init,
    Select {
        pack_id: String,
    },
    Deselect {
        pack_id: String,
        cascade: bool,
    },
    SetPageTitle {
        pack_id: String,
        page_key: String,
        title: String,
    },
    SetPackPrefix {
        pack_id: String,
        prefix: String,
    },
    Refresh,
    Clear,
    Apply,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct PackPayload {
    pack_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct DeselectPayload {
    pack_id: String,
    #[serde(default)]
    cascade: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct PageTitlePayload {
    pack_id: String,
    page_key: String,
    title: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct PackPrefixPayload {
    pack_id: String,
    prefix: String,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Select { .. } => "select",
            Self::Deselect { .. } => "deselect",
            Self::SetPageTitle { .. } => "setPageTitle",
            Self::SetPackPrefix { .. } => "setPackPrefix",
            Self::Refresh => "refresh",
            Self::Clear => "clear",
            Self::Apply => "apply",
        }
    }

    pub fn from_request(request: &CommandRequest) -> Result<Self, SessionError> {
        let payload = &request.payload;
        Ok(match request.command.as_str() {
            "init" => Self::Init,
            "refresh" => Self::Refresh,
            "clear" => Self::Clear,
            "apply" => Self::Apply,
            "select" => {
                let PackPayload { pack_id } = parse_payload(&request.command, payload)?;
                Self::Select { pack_id }
            }
            "deselect" => {
                let DeselectPayload { pack_id, cascade } =
                    parse_payload(&request.command, payload)?;
                Self::Deselect { pack_id, cascade }
            }
            "setPageTitle" => {
                let PageTitlePayload {
                    pack_id,
                    page_key,
                    title,
                } = parse_payload(&request.command, payload)?;
                Self::SetPageTitle {
                    pack_id,
                    page_key,
                    title,
                }
            }
            "setPackPrefix" => {
                let PackPrefixPayload { pack_id, prefix } =
                    parse_payload(&request.command, payload)?;
                Self::SetPackPrefix { pack_id, prefix }
            }
            other => {
                return Err(SessionError::invalid(format!("unknown command '{other}'")));
            }
        })
    }
}

fn parse_payload<T: serde::de::DeserializeOwned>(
    command: &str,
    payload: &Value,
) -> Result<T, SessionError> {
    T::deserialize(payload)
        .map_err(|err| SessionError::invalid(format!("malformed payload for '{command}': {err}")))
}

/// Builds a fresh session from the manifest and installed snapshots.
pub fn init(
    key: &SessionKey,
    source_id: &str,
    ctx: &ResolveContext<'_>,
) -> Result<(SelectionState, Vec<String>), SessionError> {
    let mut state = SelectionState::new(key, source_id);
    for pack in ctx.packs() {
        let current_version = ctx.installed_version(&pack.id).map(str::to_string);
        state.packs.insert(
            pack.id.clone(),
            PackSelection {
                selected: current_version.is_some(),
                current_version,
                target_version: Some(pack.version.clone()),
                pages: pack
                    .pages
                    .iter()
                    .map(|page| (page.key.clone(), PageSelection::from_definition(page, None)))
                    .collect(),
                ..PackSelection::default()
            },
        );
    }
    for (name, version) in ctx.installed() {
        state
            .packs
            .entry(name.to_string())
            .or_insert_with(|| PackSelection {
                current_version: Some(version.to_string()),
                ..PackSelection::default()
            });
    }

    let mut warnings = ctx.graph().warnings();
    warnings.extend(reconcile(&mut state, ctx)?);
    Ok((state, warnings))
}

pub fn select(
    state: &mut SelectionState,
    ctx: &ResolveContext<'_>,
    pack_id: &str,
) -> Result<Vec<String>, SessionError> {
    let pack = state
        .packs
        .get(pack_id)
        .ok_or_else(|| SessionError::pack_not_found(pack_id))?;
    if !pack.is_offered() {
        return Err(SessionError::invalid(format!(
            "pack '{pack_id}' is no longer offered by source '{}'",
            state.source_id
        )));
    }

    if pack.selected {
        return reconcile(state, ctx);
    }
    if let Some(err) = unparsable_version(pack) {
        return Err(SessionError::invalid(format!("cannot select '{pack_id}': {err}")));
    }

    if let Some(pack) = state.packs.get_mut(pack_id) {
        pack.selected = true;
    }
    reconcile(state, ctx)
}

/// Deselects a pack, optionally cascading to everything that needs it.
/// Returns the warnings and the sorted list of packs deselected by cascade.
pub fn deselect(
    state: &mut SelectionState,
    ctx: &ResolveContext<'_>,
    pack_id: &str,
    cascade: bool,
) -> Result<(Vec<String>, Vec<String>), SessionError> {
    if !state.packs.contains_key(pack_id) {
        return Err(SessionError::pack_not_found(pack_id));
    }

    let wanted = state.wanted();
    let remove = BTreeSet::from([pack_id.to_string()]);
    let mut blocked = validate_removal(ctx.graph(), &remove, &wanted);
    let dependents = blocked.remove(pack_id).unwrap_or_default();

    if !dependents.is_empty() && !cascade {
        return Err(SessionError::CascadeRequired {
            pack_id: pack_id.to_string(),
            dependents,
        });
    }

    let mut cascaded = BTreeSet::new();
    let mut queue: VecDeque<String> = dependents.into_iter().collect();
    while let Some(next) = queue.pop_front() {
        if next == pack_id || !cascaded.insert(next.clone()) {
            continue;
        }
        for dependent in direct_dependents(ctx.graph(), &next, &wanted) {
            if !cascaded.contains(&dependent) {
                queue.push_back(dependent);
            }
        }
    }

    for id in cascaded.iter().map(String::as_str).chain([pack_id]) {
        if let Some(pack) = state.packs.get_mut(id) {
            pack.selected = false;
        }
    }

    let warnings = reconcile(state, ctx)?;
    Ok((warnings, cascaded.into_iter().collect()))
}

pub fn set_page_title(
    state: &mut SelectionState,
    ctx: &ResolveContext<'_>,
    pack_id: &str,
    page_key: &str,
    title: &str,
) -> Result<(), SessionError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(SessionError::invalid("page title must not be empty"));
    }

    let pack = state
        .packs
        .get_mut(pack_id)
        .ok_or_else(|| SessionError::pack_not_found(pack_id))?;
    let page = pack
        .pages
        .get_mut(page_key)
        .ok_or_else(|| SessionError::NotFound {
            kind: EntityKind::Page,
            id: format!("{pack_id}/{page_key}"),
        })?;
    page.final_title = title.to_string();

    detect_conflicts(state, ctx)
}

pub fn set_pack_prefix(
    state: &mut SelectionState,
    ctx: &ResolveContext<'_>,
    pack_id: &str,
    prefix: &str,
) -> Result<(), SessionError> {
    let prefix = prefix.trim().trim_end_matches('/');
    let pack = state
        .packs
        .get_mut(pack_id)
        .ok_or_else(|| SessionError::pack_not_found(pack_id))?;

    for (key, page) in pack.pages.iter_mut() {
        page.final_title = prefixed_title(prefix, key);
    }
    pack.prefix = (!prefix.is_empty()).then(|| prefix.to_string());

    detect_conflicts(state, ctx)
}

/// Rebuilds the session against newer snapshots while keeping what the user
/// chose: explicit selections, pack prefixes and hand-edited titles.
pub fn refresh(
    state: &mut SelectionState,
    ctx: &ResolveContext<'_>,
) -> Result<Vec<String>, SessionError> {
    let mut warnings = ctx.graph().warnings();
    let mut previous = std::mem::take(&mut state.packs);
    let mut packs = BTreeMap::new();

    for pack in ctx.packs() {
        let current_version = ctx.installed_version(&pack.id).map(str::to_string);
        let refreshed = match previous.remove(&pack.id) {
            Some(old) => {
                let pages = pack
                    .pages
                    .iter()
                    .map(|page| {
                        let mut fresh =
                            PageSelection::from_definition(page, old.prefix.as_deref());
                        if let Some(old_page) = old.pages.get(&page.key) {
                            let untouched = expected_title(
                                old.prefix.as_deref(),
                                &old_page.name,
                                &old_page.default_title,
                            );
                            if old_page.final_title != untouched {
                                fresh.final_title = old_page.final_title.clone();
                            }
                        }
                        (page.key.clone(), fresh)
                    })
                    .collect();
                PackSelection {
                    selected: old.selected,
                    current_version,
                    target_version: Some(pack.version.clone()),
                    prefix: old.prefix,
                    pages,
                    ..PackSelection::default()
                }
            }
            None => PackSelection {
                selected: current_version.is_some(),
                current_version,
                target_version: Some(pack.version.clone()),
                pages: pack
                    .pages
                    .iter()
                    .map(|page| (page.key.clone(), PageSelection::from_definition(page, None)))
                    .collect(),
                ..PackSelection::default()
            },
        };
        packs.insert(pack.id.clone(), refreshed);
    }

    for (name, version) in ctx.installed() {
        if packs.contains_key(name) {
            continue;
        }
        let old = previous.remove(name).unwrap_or_default();
        if old.selected {
            warnings.push(format!(
                "pack '{name}' is no longer offered by source '{}' and will be removed",
                state.source_id
            ));
        }
        packs.insert(
            name.to_string(),
            PackSelection {
                current_version: Some(version.to_string()),
                prefix: old.prefix,
                pages: old.pages,
                ..PackSelection::default()
            },
        );
    }

    for (name, old) in previous {
        if old.selected {
            warnings.push(format!(
                "pack '{name}' is no longer offered by source '{}'; selection dropped",
                state.source_id
            ));
        }
    }

    state.packs = packs;
    warnings.extend(reconcile(state, ctx)?);
    Ok(warnings)
}

/// Validates the update policy and converts the state into operations.
pub fn apply(
    state: &SelectionState,
    ctx: &ResolveContext<'_>,
) -> Result<(Vec<Operation>, Vec<String>), SessionError> {
    let review = review_updates(state, ctx);
    if let Some((pack_id, err)) = review.unparsable.into_iter().next() {
        return Err(SessionError::invalid(format!("cannot update '{pack_id}': {err}")));
    }
    let mut warnings = Vec::new();
    for issue in review.issues {
        if issue.is_blocking() {
            return Err(SessionError::DependencyConflict(issue));
        }
        warnings.push(issue.to_string());
    }
    warnings.extend(held_back_warnings(state));

    let operations = build_operations(state, ctx.graph());
    if operations.is_empty() {
        return Err(SessionError::NoOperations);
    }
    Ok((operations, warnings))
}

/// Recomputes everything derived from the explicit selection: auto-selected
/// packs, actions and conflict markers. Returns update-policy findings as
/// warnings.
pub(crate) fn reconcile(
    state: &mut SelectionState,
    ctx: &ResolveContext<'_>,
) -> Result<Vec<String>, SessionError> {
    let explicit: BTreeSet<String> = state
        .explicit_selection()
        .into_iter()
        .filter(|id| ctx.graph().contains_pack(id))
        .collect();
    // Installed packs the user deselected are not exempt, so a dependent pulls
    // them back in instead of leaving them to be removed.
    let retained_installed: BTreeSet<String> = state
        .installed()
        .intersection(&explicit)
        .cloned()
        .collect();
    let auto = resolve_auto_selections(&explicit, ctx.graph(), &retained_installed);

    for (id, pack) in state.packs.iter_mut() {
        match auto.get(id) {
            Some(reason) if !pack.selected => {
                pack.auto_selected = true;
                pack.auto_selected_reason = Some(reason.clone());
            }
            _ => {
                pack.auto_selected = false;
                pack.auto_selected_reason = None;
            }
        }
        pack.action = pack.derive_action();
    }

    detect_conflicts(state, ctx)?;

    let review = review_updates(state, ctx);
    let mut warnings: Vec<String> = review.issues.iter().map(ToString::to_string).collect();
    warnings.extend(held_back_warnings(state));
    warnings.extend(review.unparsable.iter().map(|(pack_id, err)| {
        format!("cannot check the update policy for '{pack_id}': {err}")
    }));
    Ok(warnings)
}

fn updating_packs(state: &SelectionState) -> BTreeSet<String> {
    state
        .packs
        .iter()
        .filter(|(_, pack)| pack.is_wanted() && pack.action == PackAction::Update)
        .map(|(id, _)| id.clone())
        .collect()
}

fn unparsable_version(pack: &PackSelection) -> Option<VersionParseError> {
    [&pack.current_version, &pack.target_version]
        .into_iter()
        .flatten()
        .find_map(|version| parse_version(version).err())
}

/// Wanted packs kept at their installed version because the offered one
/// crosses a major boundary.
fn held_back_warnings(state: &SelectionState) -> Vec<String> {
    state
        .packs
        .iter()
        .filter(|(_, pack)| pack.is_wanted() && pack.is_held_back())
        .map(|(id, pack)| {
            format!(
                "'{id}' stays at {}: {} crosses a major version",
                pack.current_version.as_deref().unwrap_or_default(),
                pack.target_version.as_deref().unwrap_or_default()
            )
        })
        .collect()
}

#[derive(Default)]
struct UpdateReview {
    issues: Vec<VersionIssue>,
    unparsable: Vec<(String, VersionParseError)>,
}

fn review_updates(state: &SelectionState, ctx: &ResolveContext<'_>) -> UpdateReview {
    let updating = updating_packs(state);
    let installed = state.installed();
    let mut review = UpdateReview::default();

    for id in &updating {
        let Some(pack) = state.packs.get(id) else {
            continue;
        };
        let (Some(current), Some(target)) = (&pack.current_version, &pack.target_version) else {
            continue;
        };
        let candidate = UpdateCandidate {
            pack_id: id,
            current,
            target,
        };
        match check_update(ctx.graph(), candidate, &installed, &updating) {
            Ok(found) => review.issues.extend(found),
            Err(err) => review.unparsable.push((id.clone(), err)),
        }
    }

    review
}
