use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// `<state_root>/config.toml`. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ConfigFile {
    pub(crate) registry_root: Option<PathBuf>,
    pub(crate) target_root: Option<PathBuf>,
    pub(crate) default_source: Option<String>,
    pub(crate) user: Option<String>,
}

impl ConfigFile {
    pub(crate) fn load(path: &Path) -> Result<Self> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed reading config: {}", path.display()));
            }
        };
        toml::from_str(&content).with_context(|| format!("failed parsing config: {}", path.display()))
    }
}

/// Values given on the command line or through `PACKWRIGHT_*` variables.
#[derive(Debug, Clone, Default)]
pub(crate) struct ConfigOverrides {
    pub(crate) registry_root: Option<PathBuf>,
    pub(crate) target_root: Option<PathBuf>,
    pub(crate) source: Option<String>,
    pub(crate) user: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ResolvedConfig {
    pub(crate) state_root: PathBuf,
    pub(crate) registry_root: PathBuf,
    pub(crate) target_root: PathBuf,
    pub(crate) source: Option<String>,
    pub(crate) user: String,
}

impl ResolvedConfig {
    pub(crate) fn require_source(&self) -> Result<&str> {
        self.source.as_deref().context(
            "no source given: pass --source or set default_source in config.toml",
        )
    }
}

/// Overrides win over the config file, which wins over defaults. Relative
/// paths in the config file are taken relative to the state root.
pub(crate) fn resolve_config(
    state_root: PathBuf,
    file: ConfigFile,
    overrides: ConfigOverrides,
    login_user: Option<String>,
) -> ResolvedConfig {
    let anchor = |path: PathBuf| {
        if path.is_relative() {
            state_root.join(path)
        } else {
            path
        }
    };

    let registry_root = overrides
        .registry_root
        .or_else(|| file.registry_root.map(anchor))
        .unwrap_or_else(|| state_root.join("registry"));
    let target_root = overrides
        .target_root
        .or_else(|| file.target_root.map(anchor))
        .unwrap_or_else(|| state_root.join("target"));
    let user = overrides
        .user
        .or(file.user)
        .or(login_user)
        .filter(|user| !user.trim().is_empty())
        .unwrap_or_else(|| "local".to_string());

    ResolvedConfig {
        registry_root,
        target_root,
        source: overrides.source.or(file.default_source),
        user,
        state_root,
    }
}

pub(crate) fn login_user() -> Option<String> {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .ok()
}
