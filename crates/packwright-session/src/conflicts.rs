use std::collections::BTreeMap;

use crate::context::ResolveContext;
use crate::error::SessionError;
use crate::state::{ConflictType, SelectionState};

/// Re-evaluates `has_conflict`/`conflict_type` for every page in the state.
///
/// Only pages of wanted packs can conflict; pages of everything else are
/// reset so stale markers never survive a deselect.
pub(crate) fn detect_conflicts(
    state: &mut SelectionState,
    ctx: &ResolveContext<'_>,
) -> Result<(), SessionError> {
    let mut title_usage: BTreeMap<String, usize> = BTreeMap::new();
    for pack in state.packs.values().filter(|pack| pack.is_wanted()) {
        for page in pack.pages.values() {
            *title_usage.entry(page.final_title.clone()).or_default() += 1;
        }
    }

    let source_id = state.source_id.clone();
    for pack in state.packs.values_mut() {
        let wanted = pack.is_wanted();
        for page in pack.pages.values_mut() {
            let conflict = if !wanted {
                None
            } else if title_usage.get(&page.final_title).copied().unwrap_or(0) > 1 {
                Some(ConflictType::DuplicateTitle)
            } else {
                target_conflict(ctx, &page.final_title, &source_id)?
            };
            page.set_conflict(conflict);
        }
    }

    Ok(())
}

/// Any pack of the session's source may take over a title that source
/// already owns, matching [`classify_title`](crate::classify_title).
fn target_conflict(
    ctx: &ResolveContext<'_>,
    title: &str,
    source_id: &str,
) -> Result<Option<ConflictType>, SessionError> {
    let target = ctx.target();
    if !target.exists(title)? {
        return Ok(None);
    }

    Ok(match target.provenance(title)? {
        None => Some(ConflictType::ExternalCollision),
        Some(provenance) if provenance.source_id != source_id => Some(ConflictType::PackConflict),
        Some(_) => None,
    })
}
