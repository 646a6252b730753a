//! Byte-oriented key-value persistence

use crate::errors::StateResult;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Key-value store used for snapshot checkpoints
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &[u8]) -> StateResult<Option<Vec<u8>>>;

    fn put(&self, key: &[u8], value: &[u8]) -> StateResult<()>;
}

/// In-memory key-value store
#[derive(Default)]
pub struct MemoryDb {
    entries: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl KeyValueStore for MemoryDb {
    fn get(&self, key: &[u8]) -> StateResult<Option<Vec<u8>>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> StateResult<()> {
        self.entries.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }
}
