use crate::util::lock;
use std::collections::HashMap;
use std::sync::Mutex;

/// Durable "store/retrieve named blob" medium.
pub trait KeyValueStorage: Send + Sync {
    fn name(&self) -> &str;
    fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    fn set(&self, key: &str, blob: &str) -> anyhow::Result<()>;
}

/// In-process storage; the default when no durable medium is configured.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStorage for MemoryStorage {
    fn name(&self) -> &str {
        "memory"
    }

    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(lock(&self.entries).get(key).cloned())
    }

    fn set(&self, key: &str, blob: &str) -> anyhow::Result<()> {
        lock(&self.entries).insert(key.to_string(), blob.to_string());
        Ok(())
    }
}
