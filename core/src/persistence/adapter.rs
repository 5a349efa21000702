use std::sync::Arc;

use super::snapshot::PersistenceSnapshot;
use crate::error::PersistenceError;
use crate::traits::{KeyValueStorage, MemoryStorage};

/// Reads and writes `PersistenceSnapshot` blobs through a `KeyValueStorage`.
#[derive(Clone)]
pub struct PersistenceAdapter {
    storage: Arc<dyn KeyValueStorage>,
    key_prefix: String,
}

impl PersistenceAdapter {
    pub fn new(storage: Arc<dyn KeyValueStorage>, key_prefix: impl Into<String>) -> Self {
        Self {
            storage,
            key_prefix: key_prefix.into(),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()), "mapstate:")
    }

    pub fn storage_name(&self) -> &str {
        self.storage.name()
    }

    pub fn storage_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }

    pub fn save(&self, key: &str, snapshot: &PersistenceSnapshot) -> Result<(), PersistenceError> {
        let blob = snapshot.to_json()?;
        let storage_key = self.storage_key(key);
        self.storage
            .set(&storage_key, &blob)
            .map_err(|source| PersistenceError::Storage {
                key: storage_key.clone(),
                source,
            })?;
        tracing::debug!(key = %storage_key, bytes = blob.len(), "snapshot saved");
        Ok(())
    }

    pub fn load(&self, key: &str) -> Result<PersistenceSnapshot, PersistenceError> {
        let storage_key = self.storage_key(key);
        let blob = self
            .storage
            .get(&storage_key)
            .map_err(|source| PersistenceError::Storage {
                key: storage_key.clone(),
                source,
            })?
            .ok_or_else(|| PersistenceError::NotFound(storage_key.clone()))?;
        PersistenceSnapshot::from_json(&storage_key, &blob)
    }
}
