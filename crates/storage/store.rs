use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use shardex_trie::{TrieDB, TrieError};

/// Ephemeral in-memory store; the default backend for tests and speculative
/// chains.
#[derive(Default)]
pub struct InMemoryStore {
    inner: Arc<Mutex<BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TrieDB for InMemoryStore {
    fn get(&self, key: Vec<u8>) -> Result<Option<Vec<u8>>, TrieError> {
        Ok(self
            .inner
            .lock()
            .map_err(|_| TrieError::LockError)?
            .get(&key)
            .cloned())
    }

    fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<(), TrieError> {
        self.inner
            .lock()
            .map_err(|_| TrieError::LockError)?
            .insert(key, value);
        Ok(())
    }

    fn put_batch(&self, key_values: Vec<(Vec<u8>, Vec<u8>)>) -> Result<(), TrieError> {
        let mut db = self.inner.lock().map_err(|_| TrieError::LockError)?;
        for (key, value) in key_values {
            db.insert(key, value);
        }
        Ok(())
    }
}

/// Read-through overlay over a parent store: reads fall through on miss,
/// writes are buffered locally and shadow the parent. The parent is never
/// mutated, which is what makes cloned states speculative.
pub struct OverlayStore {
    parent: Arc<dyn TrieDB>,
    overlay: Mutex<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl OverlayStore {
    pub fn new(parent: Arc<dyn TrieDB>) -> Self {
        Self {
            parent,
            overlay: Mutex::new(BTreeMap::new()),
        }
    }
}

impl TrieDB for OverlayStore {
    fn get(&self, key: Vec<u8>) -> Result<Option<Vec<u8>>, TrieError> {
        let local = self
            .overlay
            .lock()
            .map_err(|_| TrieError::LockError)?
            .get(&key)
            .cloned();
        match local {
            Some(value) => Ok(Some(value)),
            None => self.parent.get(key),
        }
    }

    fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<(), TrieError> {
        self.overlay
            .lock()
            .map_err(|_| TrieError::LockError)?
            .insert(key, value);
        Ok(())
    }

    fn put_batch(&self, key_values: Vec<(Vec<u8>, Vec<u8>)>) -> Result<(), TrieError> {
        let mut overlay = self.overlay.lock().map_err(|_| TrieError::LockError)?;
        for (key, value) in key_values {
            overlay.insert(key, value);
        }
        Ok(())
    }
}
