use std::fs;
use std::io;

use anyhow::{Context, Result};
use packwright_session::{SelectionState, SessionKey, SessionStore};
use tracing::debug;

use crate::layout::StateLayout;

/// One JSON document per session under `<state_root>/sessions`.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    layout: StateLayout,
}

impl FileSessionStore {
    pub fn new(layout: StateLayout) -> Self {
        Self { layout }
    }
}

impl SessionStore for FileSessionStore {
    fn get(&self, key: &SessionKey) -> Result<Option<SelectionState>> {
        let path = self.layout.session_path(&key.user_id, &key.ref_id);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed reading session: {}", path.display()));
            }
        };

        let state: SelectionState = serde_json::from_str(&content)
            .with_context(|| format!("failed parsing session: {}", path.display()))?;
        if state.key() != *key {
            anyhow::bail!(
                "session file {} belongs to {}, expected {}",
                path.display(),
                state.key(),
                key
            );
        }
        Ok(Some(state))
    }

    fn save(&self, state: &SelectionState) -> Result<()> {
        let path = self.layout.session_path(&state.user_id, &state.ref_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed creating session dir: {}", parent.display()))?;
        }

        let content = serde_json::to_string_pretty(state)
            .with_context(|| format!("failed serializing session: {}", path.display()))?;
        let staged = path.with_extension("json.tmp");
        fs::write(&staged, content)
            .with_context(|| format!("failed writing session: {}", staged.display()))?;
        fs::rename(&staged, &path)
            .with_context(|| format!("failed replacing session: {}", path.display()))?;
        debug!(session = %state.key(), path = %path.display(), "saved session");
        Ok(())
    }

    fn clear(&self, key: &SessionKey) -> Result<()> {
        let path = self.layout.session_path(&key.user_id, &key.ref_id);
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(session = %key, "removed session file");
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => {
                Err(err).with_context(|| format!("failed removing session: {}", path.display()))
            }
        }
    }
}
