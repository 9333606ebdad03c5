//! In-memory credential store.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::StoreError;
use crate::traits::{CredentialStore, StoreKey};

/// A process-local [`CredentialStore`].
///
/// Nothing survives a restart; useful for tests and short-lived tools.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<StoreKey, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store, e.g. to simulate credentials left by a previous run.
    pub fn with_entries(entries: impl IntoIterator<Item = (StoreKey, String)>) -> Self {
        Self {
            entries: RwLock::new(entries.into_iter().collect()),
        }
    }

    /// True when no key is present.
    pub fn is_empty(&self) -> bool {
        self.entries.read().map(|e| e.is_empty()).unwrap_or(true)
    }
}

impl CredentialStore for MemoryStore {
    fn get(&self, key: StoreKey) -> Result<Option<String>, StoreError> {
        let entries = self.entries.read().map_err(|_| StoreError::Poisoned)?;
        Ok(entries.get(&key).cloned())
    }

    fn put(&self, new_entries: &[(StoreKey, String)]) -> Result<(), StoreError> {
        let mut entries = self.entries.write().map_err(|_| StoreError::Poisoned)?;
        for (key, value) in new_entries {
            entries.insert(*key, value.clone());
        }
        Ok(())
    }

    fn remove(&self, keys: &[StoreKey]) -> Result<(), StoreError> {
        let mut entries = self.entries.write().map_err(|_| StoreError::Poisoned)?;
        for key in keys {
            entries.remove(key);
        }
        Ok(())
    }
}
