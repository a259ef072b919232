use std::fs;

use anyhow::{Context, Result};
use packwright_core::{InstalledContent, InstalledPack};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::layout::{validate_source_name, StateLayout};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LedgerFile {
    #[serde(default = "ledger_file_version")]
    version: u32,
    #[serde(default)]
    packs: Vec<InstalledPack>,
}

fn ledger_file_version() -> u32 {
    1
}

impl Default for LedgerFile {
    fn default() -> Self {
        Self {
            version: ledger_file_version(),
            packs: Vec::new(),
        }
    }
}

fn parse_ledger_file(content: &str) -> Result<LedgerFile> {
    let ledger: LedgerFile = toml::from_str(content)?;
    let expected = ledger_file_version();
    if ledger.version != expected {
        anyhow::bail!(
            "unsupported installed ledger version {} (expected {})",
            ledger.version,
            expected
        );
    }
    Ok(ledger)
}

/// Per source and ref record of which packs have been materialized.
#[derive(Debug, Clone)]
pub struct InstalledLedger {
    layout: StateLayout,
}

impl InstalledLedger {
    pub fn new(layout: StateLayout) -> Self {
        Self { layout }
    }

    pub fn read(&self, source: &str, reference: &str) -> Result<Vec<InstalledPack>> {
        validate_source_name(source)?;
        let path = self.layout.ledger_path(source, reference);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("failed reading installed ledger: {}", path.display()))?;
        let mut ledger = parse_ledger_file(&content)
            .with_context(|| format!("failed parsing installed ledger: {}", path.display()))?;
        ledger.packs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(ledger.packs)
    }

    pub fn write(&self, source: &str, reference: &str, packs: &[InstalledPack]) -> Result<()> {
        validate_source_name(source)?;
        let path = self.layout.ledger_path(source, reference);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed creating ledger dir: {}", parent.display()))?;
        }

        let mut ledger = LedgerFile {
            packs: packs.to_vec(),
            ..LedgerFile::default()
        };
        ledger.packs.sort_by(|a, b| a.name.cmp(&b.name));
        ledger.packs.dedup_by(|a, b| a.name == b.name);
        let content = toml::to_string(&ledger)
            .with_context(|| format!("failed serializing installed ledger: {}", path.display()))?;
        fs::write(&path, content)
            .with_context(|| format!("failed writing installed ledger: {}", path.display()))?;
        debug!(source, reference, packs = ledger.packs.len(), "wrote installed ledger");
        Ok(())
    }

    /// Marks `name` as installed at `version`, replacing any earlier record.
    pub fn record_installed(
        &self,
        source: &str,
        reference: &str,
        name: &str,
        version: &str,
    ) -> Result<()> {
        let mut packs = self.read(source, reference)?;
        packs.retain(|pack| pack.name != name);
        packs.push(InstalledPack {
            name: name.to_string(),
            version: version.to_string(),
        });
        self.write(source, reference, &packs)
    }

    /// Returns whether a record was removed.
    pub fn record_removed(&self, source: &str, reference: &str, name: &str) -> Result<bool> {
        let mut packs = self.read(source, reference)?;
        let before = packs.len();
        packs.retain(|pack| pack.name != name);
        if packs.len() == before {
            return Ok(false);
        }
        self.write(source, reference, &packs)?;
        Ok(true)
    }
}

impl InstalledContent for InstalledLedger {
    fn list_installed(&self, source: &str, reference: &str) -> Result<Vec<InstalledPack>> {
        self.read(source, reference)
    }
}
