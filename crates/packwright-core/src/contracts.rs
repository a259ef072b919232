use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::manifest::PackDefinition;

/// A pack previously materialized into the target store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstalledPack {
    pub name: String,
    pub version: String,
}

/// Ownership record stored alongside a page written by a previous apply.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Provenance {
    pub pack_id: String,
    pub source_id: String,
    pub content_hash: String,
}

/// Supplies already-validated pack definitions for a source at a ref.
pub trait ManifestProvider {
    fn list_packs(&self, source: &str, reference: &str) -> Result<Vec<PackDefinition>>;
}

/// Reports which packs of a source are currently materialized.
pub trait InstalledContent {
    fn list_installed(&self, source: &str, reference: &str) -> Result<Vec<InstalledPack>>;
}

/// Read-only view of the target content store.
pub trait TargetLookup {
    fn exists(&self, title: &str) -> Result<bool>;

    fn provenance(&self, title: &str) -> Result<Option<Provenance>>;

    fn live_content_hash(&self, title: &str) -> Result<Option<String>>;
}

impl<T: ManifestProvider + ?Sized> ManifestProvider for &T {
    fn list_packs(&self, source: &str, reference: &str) -> Result<Vec<PackDefinition>> {
        (**self).list_packs(source, reference)
    }
}

impl<T: InstalledContent + ?Sized> InstalledContent for &T {
    fn list_installed(&self, source: &str, reference: &str) -> Result<Vec<InstalledPack>> {
        (**self).list_installed(source, reference)
    }
}

impl<T: TargetLookup + ?Sized> TargetLookup for &T {
    fn exists(&self, title: &str) -> Result<bool> {
        (**self).exists(title)
    }

    fn provenance(&self, title: &str) -> Result<Option<Provenance>> {
        (**self).provenance(title)
    }

    fn live_content_hash(&self, title: &str) -> Result<Option<String>> {
        (**self).live_content_hash(title)
    }
}
