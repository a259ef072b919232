use std::collections::BTreeSet;
use std::fmt;

use packwright_core::TargetLookup;
use serde::Serialize;

use crate::error::SessionError;
use crate::state::SelectionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PreflightBucket {
    Create,
    UpdateUnchanged,
    /// Same source, but the live content drifted since it was last written.
    UpdateModified,
    PackPackConflict,
    ExternalCollision,
}

impl PreflightBucket {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::UpdateUnchanged => "update_unchanged",
            Self::UpdateModified => "update_modified",
            Self::PackPackConflict => "pack_pack_conflict",
            Self::ExternalCollision => "external_collision",
        }
    }
}

impl fmt::Display for PreflightBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PreflightCounts {
    pub create: usize,
    pub update_unchanged: usize,
    pub update_modified: usize,
    pub pack_pack_conflict: usize,
    pub external_collision: usize,
}

impl PreflightCounts {
    pub fn total(&self) -> usize {
        self.create
            + self.update_unchanged
            + self.update_modified
            + self.pack_pack_conflict
            + self.external_collision
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PreflightReport {
    pub create: Vec<String>,
    pub update_unchanged: Vec<String>,
    pub update_modified: Vec<String>,
    pub pack_pack_conflict: Vec<String>,
    pub external_collision: Vec<String>,
}

impl PreflightReport {
    pub fn counts(&self) -> PreflightCounts {
        PreflightCounts {
            create: self.create.len(),
            update_unchanged: self.update_unchanged.len(),
            update_modified: self.update_modified.len(),
            pack_pack_conflict: self.pack_pack_conflict.len(),
            external_collision: self.external_collision.len(),
        }
    }

    pub fn bucket(&self, bucket: PreflightBucket) -> &[String] {
        match bucket {
            PreflightBucket::Create => &self.create,
            PreflightBucket::UpdateUnchanged => &self.update_unchanged,
            PreflightBucket::UpdateModified => &self.update_modified,
            PreflightBucket::PackPackConflict => &self.pack_pack_conflict,
            PreflightBucket::ExternalCollision => &self.external_collision,
        }
    }

    /// True when writing every title would neither clobber foreign content
    /// nor discard manual edits.
    pub fn is_clean(&self) -> bool {
        self.update_modified.is_empty()
            && self.pack_pack_conflict.is_empty()
            && self.external_collision.is_empty()
    }

    fn bucket_mut(&mut self, bucket: PreflightBucket) -> &mut Vec<String> {
        match bucket {
            PreflightBucket::Create => &mut self.create,
            PreflightBucket::UpdateUnchanged => &mut self.update_unchanged,
            PreflightBucket::UpdateModified => &mut self.update_modified,
            PreflightBucket::PackPackConflict => &mut self.pack_pack_conflict,
            PreflightBucket::ExternalCollision => &mut self.external_collision,
        }
    }
}

pub fn classify_title(
    title: &str,
    lookup: &dyn TargetLookup,
    source_id: &str,
) -> Result<PreflightBucket, SessionError> {
    if !lookup.exists(title)? {
        return Ok(PreflightBucket::Create);
    }

    let Some(provenance) = lookup.provenance(title)? else {
        return Ok(PreflightBucket::ExternalCollision);
    };
    if provenance.source_id != source_id {
        return Ok(PreflightBucket::PackPackConflict);
    }

    Ok(match lookup.live_content_hash(title)? {
        Some(live) if live == provenance.content_hash => PreflightBucket::UpdateUnchanged,
        _ => PreflightBucket::UpdateModified,
    })
}

/// Buckets each distinct title by what writing it would do to the target.
pub fn classify<I, S>(
    titles: I,
    lookup: &dyn TargetLookup,
    source_id: &str,
) -> Result<PreflightReport, SessionError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let unique: BTreeSet<String> = titles
        .into_iter()
        .map(|title| title.as_ref().to_string())
        .collect();

    let mut report = PreflightReport::default();
    for title in unique {
        let bucket = classify_title(&title, lookup, source_id)?;
        report.bucket_mut(bucket).push(title);
    }
    Ok(report)
}

/// Final titles of every page the session would write.
pub fn planned_titles(state: &SelectionState) -> Vec<String> {
    let titles: BTreeSet<&str> = state
        .packs
        .values()
        .filter(|pack| pack.is_wanted() && pack.is_offered())
        .flat_map(|pack| pack.pages.values())
        .map(|page| page.final_title.as_str())
        .collect();
    titles.into_iter().map(str::to_string).collect()
}
