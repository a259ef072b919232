use std::collections::BTreeMap;
use std::sync::Mutex;

use anyhow::{anyhow, Result};

use crate::state::{SelectionState, SessionKey};

/// Opaque persistence for sessions. Expiry is the store's business.
pub trait SessionStore {
    fn get(&self, key: &SessionKey) -> Result<Option<SelectionState>>;
    fn save(&self, state: &SelectionState) -> Result<()>;
    fn clear(&self, key: &SessionKey) -> Result<()>;
}

impl<T: SessionStore + ?Sized> SessionStore for &T {
    fn get(&self, key: &SessionKey) -> Result<Option<SelectionState>> {
        (**self).get(key)
    }

    fn save(&self, state: &SelectionState) -> Result<()> {
        (**self).save(state)
    }

    fn clear(&self, key: &SessionKey) -> Result<()> {
        (**self).clear(key)
    }
}

#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: Mutex<BTreeMap<SessionKey, SelectionState>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.lock()?.is_empty())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<SessionKey, SelectionState>>> {
        self.sessions
            .lock()
            .map_err(|_| anyhow!("session store lock poisoned"))
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, key: &SessionKey) -> Result<Option<SelectionState>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn save(&self, state: &SelectionState) -> Result<()> {
        self.lock()?.insert(state.key(), state.clone());
        Ok(())
    }

    fn clear(&self, key: &SessionKey) -> Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }
}
