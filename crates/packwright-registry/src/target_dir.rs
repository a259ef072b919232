use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use packwright_core::{Provenance, TargetLookup};
use packwright_session::sha256_hex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ProvenanceFile {
    #[serde(default = "provenance_file_version")]
    version: u32,
    #[serde(default)]
    pages: Vec<ProvenanceRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ProvenanceRecord {
    title: String,
    pack_id: String,
    source_id: String,
    content_sha256: String,
}

fn provenance_file_version() -> u32 {
    1
}

impl Default for ProvenanceFile {
    fn default() -> Self {
        Self {
            version: provenance_file_version(),
            pages: Vec::new(),
        }
    }
}

/// Target content store kept on disk: page bodies under `pages/` keyed by the
/// hex of their title, ownership in `provenance.toml`.
#[derive(Debug, Clone)]
pub struct TargetDirectory {
    root: PathBuf,
}

impl TargetDirectory {
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn page_path(&self, title: &str) -> PathBuf {
        self.root.join("pages").join(hex::encode(title))
    }

    fn provenance_path(&self) -> PathBuf {
        self.root.join("provenance.toml")
    }

    /// Titles of every page present, sorted. Entries whose names do not decode
    /// to a title are ignored.
    pub fn titles(&self) -> Result<Vec<String>> {
        let dir = self.root.join("pages");
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut titles = Vec::new();
        for entry in fs::read_dir(&dir)
            .with_context(|| format!("failed reading target pages: {}", dir.display()))?
        {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            let Ok(bytes) = hex::decode(&name) else {
                continue;
            };
            if let Ok(title) = String::from_utf8(bytes) {
                titles.push(title);
            }
        }
        titles.sort();
        Ok(titles)
    }

    /// Writes a page body and, when `owner` is given, records its provenance
    /// with the hash of the written bytes. Without an owner any existing
    /// provenance for the title is dropped.
    pub fn write_page(
        &self,
        title: &str,
        body: &[u8],
        owner: Option<(&str, &str)>,
    ) -> Result<()> {
        let path = self.page_path(title);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed creating target dir: {}", parent.display()))?;
        }
        fs::write(&path, body)
            .with_context(|| format!("failed writing page '{title}': {}", path.display()))?;

        let mut file = self.load_provenance()?;
        file.pages.retain(|record| record.title != title);
        if let Some((pack_id, source_id)) = owner {
            file.pages.push(ProvenanceRecord {
                title: title.to_string(),
                pack_id: pack_id.to_string(),
                source_id: source_id.to_string(),
                content_sha256: sha256_hex(body),
            });
        }
        self.save_provenance(file)
    }

    fn load_provenance(&self) -> Result<ProvenanceFile> {
        let path = self.provenance_path();
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(ProvenanceFile::default());
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed reading provenance: {}", path.display()));
            }
        };

        let file: ProvenanceFile = toml::from_str(&content)
            .with_context(|| format!("failed parsing provenance: {}", path.display()))?;
        let expected = provenance_file_version();
        if file.version != expected {
            anyhow::bail!(
                "unsupported provenance version {} (expected {}): {}",
                file.version,
                expected,
                path.display()
            );
        }
        Ok(file)
    }

    fn save_provenance(&self, mut file: ProvenanceFile) -> Result<()> {
        let path = self.provenance_path();
        file.pages.sort_by(|a, b| a.title.cmp(&b.title));
        let content = toml::to_string(&file)
            .with_context(|| format!("failed serializing provenance: {}", path.display()))?;
        fs::write(&path, content)
            .with_context(|| format!("failed writing provenance: {}", path.display()))
    }
}

impl TargetLookup for TargetDirectory {
    fn exists(&self, title: &str) -> Result<bool> {
        Ok(self.page_path(title).is_file())
    }

    fn provenance(&self, title: &str) -> Result<Option<Provenance>> {
        Ok(self
            .load_provenance()?
            .pages
            .into_iter()
            .find(|record| record.title == title)
            .map(|record| Provenance {
                pack_id: record.pack_id,
                source_id: record.source_id,
                content_hash: record.content_sha256,
            }))
    }

    fn live_content_hash(&self, title: &str) -> Result<Option<String>> {
        let path = self.page_path(title);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(sha256_hex(&bytes))),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => {
                Err(err).with_context(|| format!("failed reading page: {}", path.display()))
            }
        }
    }
}
