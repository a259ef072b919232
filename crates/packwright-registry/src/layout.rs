use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Directory layout under the packwright state root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateLayout {
    root: PathBuf,
}

impl StateLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join("config.toml")
    }

    pub fn installed_dir(&self) -> PathBuf {
        self.root.join("installed")
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.root.join("sessions")
    }

    /// Refs may contain characters that are unsafe in file names, so they are
    /// hex-encoded.
    pub fn ledger_path(&self, source: &str, reference: &str) -> PathBuf {
        self.installed_dir()
            .join(source)
            .join(format!("{}.toml", hex::encode(reference)))
    }

    pub fn session_path(&self, user_id: &str, ref_id: &str) -> PathBuf {
        self.sessions_dir()
            .join(hex::encode(user_id))
            .join(format!("{}.json", hex::encode(ref_id)))
    }

    pub fn ensure_base_dirs(&self) -> Result<()> {
        for dir in [self.installed_dir(), self.sessions_dir()] {
            fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        Ok(())
    }
}

pub fn default_state_root() -> Result<PathBuf> {
    if cfg!(windows) {
        let app_data = std::env::var("LOCALAPPDATA")
            .context("LOCALAPPDATA is not set; cannot resolve Windows state root")?;
        return Ok(PathBuf::from(app_data).join("Packwright"));
    }

    let home = std::env::var("HOME").context("HOME is not set; cannot resolve state root")?;
    Ok(PathBuf::from(home).join(".packwright"))
}

/// Source names are directory names in both the pack index and the ledger.
pub(crate) fn validate_source_name(name: &str) -> Result<()> {
    let allowed = |ch: char| ch.is_ascii_lowercase() || ch.is_ascii_digit();
    let valid = (1..=64).contains(&name.len())
        && name.starts_with(allowed)
        && name
            .chars()
            .all(|ch| allowed(ch) || matches!(ch, '-' | '_'));
    if !valid {
        anyhow::bail!(
            "invalid source name: '{name}' (expected 1-64 lowercase letters, digits, '-' or '_')"
        );
    }
    Ok(())
}

/// Refs become directory names in the pack index.
pub(crate) fn validate_ref_name(reference: &str) -> Result<()> {
    if reference.is_empty()
        || reference == "."
        || reference == ".."
        || reference.contains(|ch: char| ch == '/' || ch == '\\')
    {
        anyhow::bail!("invalid ref: '{reference}'");
    }
    Ok(())
}
