use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use packwright_core::{ManifestProvider, PackDefinition};
use tracing::debug;

use crate::layout::{validate_ref_name, validate_source_name};

/// Pack manifests laid out as `<root>/<source>/<ref>/<pack>.toml`.
#[derive(Debug, Clone)]
pub struct PackIndex {
    root: PathBuf,
}

impl PackIndex {
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn sources(&self) -> Result<Vec<String>> {
        list_dir_names(&self.root)
    }

    pub fn refs(&self, source: &str) -> Result<Vec<String>> {
        validate_source_name(source)?;
        list_dir_names(&self.root.join(source))
    }

    pub fn load(&self, source: &str, reference: &str) -> Result<Vec<PackDefinition>> {
        validate_source_name(source)?;
        validate_ref_name(reference)?;

        let ref_dir = self.root.join(source).join(reference);
        if !ref_dir.exists() {
            debug!(source, reference, "no pack directory for ref");
            return Ok(Vec::new());
        }

        let mut packs: BTreeMap<String, PackDefinition> = BTreeMap::new();
        for entry in fs::read_dir(&ref_dir)
            .with_context(|| format!("failed reading pack directory: {}", ref_dir.display()))?
        {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }

            let path = entry.path();
            if path.extension().and_then(|v| v.to_str()) != Some("toml") {
                continue;
            }

            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed reading manifest: {}", path.display()))?;
            let pack = PackDefinition::from_toml_str(&content)
                .with_context(|| format!("failed parsing manifest: {}", path.display()))?;
            if packs.contains_key(&pack.id) {
                anyhow::bail!(
                    "duplicate pack id '{}' in {}: remove or rename one manifest",
                    pack.id,
                    ref_dir.display()
                );
            }
            packs.insert(pack.id.clone(), pack);
        }

        debug!(source, reference, packs = packs.len(), "loaded pack manifests");
        Ok(packs.into_values().collect())
    }
}

impl ManifestProvider for PackIndex {
    fn list_packs(&self, source: &str, reference: &str) -> Result<Vec<PackDefinition>> {
        self.load(source, reference)
    }
}

fn list_dir_names(dir: &Path) -> Result<Vec<String>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut names = Vec::new();
    for entry in
        fs::read_dir(dir).with_context(|| format!("failed reading directory: {}", dir.display()))?
    {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
    }
    names.sort();
    Ok(names)
}
