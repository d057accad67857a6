//! In-memory storage backend for the forestry.
//!
//! [`MemStore`] keeps node payloads in a [`BTreeMap`] behind an [`RwLock`].
//! It is not a trie itself, just the simplest backend satisfying the
//! [`Store`] contract: the trie logic lives in the `trie` module and talks
//! to storage only through the trait.
//!
//! `MemStore` is intended for tests, development, and as a reference for
//! database-backed implementations. Anything requiring persistence should
//! implement [`Store`] over a real key-value engine instead.
use crate::traits::{Batch, BatchOp, Store};
use std::{collections::BTreeMap, convert::Infallible, sync::RwLock};

/// In-memory [`Store`] over a sorted map.
///
/// All access is guarded by an [`RwLock`], allowing concurrent readers
/// anchored on old roots while a writer commits a new spine.
#[derive(Debug, Default)]
pub struct MemStore {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl Clone for MemStore {
    fn clone(&self) -> Self {
        Self {
            entries: RwLock::new(self.entries.read().expect("store lock poisoned").clone()),
        }
    }
}

impl MemStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, including the reserved root entry.
    pub fn len(&self) -> usize {
        self.entries.read().expect("store lock poisoned").len()
    }

    /// Whether the store holds no entries at all.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Store for MemStore {
    type Error = Infallible;

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Self::Error> {
        Ok(self
            .entries
            .read()
            .expect("store lock poisoned")
            .get(key)
            .cloned())
    }

    fn put(&self, key: &str, value: Vec<u8>) -> Result<(), Self::Error> {
        self.entries
            .write()
            .expect("store lock poisoned")
            .insert(key.to_string(), value);
        Ok(())
    }

    fn del(&self, key: &str) -> Result<(), Self::Error> {
        self.entries
            .write()
            .expect("store lock poisoned")
            .remove(key);
        Ok(())
    }

    fn commit(&self, batch: Batch) -> Result<(), Self::Error> {
        // One write lock for the whole batch makes the commit atomic with
        // respect to readers.
        let mut entries = self.entries.write().expect("store lock poisoned");
        for op in batch.into_ops() {
            match op {
                BatchOp::Put { key, value } => {
                    entries.insert(key, value);
                }
                BatchOp::Del { key } => {
                    entries.remove(&key);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{constant::ROOT_KEY, hash::digest};

    #[test]
    fn put_get_del_round_trip() {
        let store = MemStore::new();
        store.put("k", b"v".to_vec()).unwrap();
        assert_eq!(store.get("k").unwrap(), Some(b"v".to_vec()));
        store.del("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn commit_applies_ops_in_order() {
        let store = MemStore::new();
        let node = digest(b"node");
        let root = digest(b"root");

        let mut batch = Batch::new();
        batch.put_node(&node, b"payload".to_vec());
        batch.put_root(&root);
        store.commit(batch).unwrap();

        assert_eq!(store.get(&node.to_hex()).unwrap(), Some(b"payload".to_vec()));
        assert_eq!(
            store.get(ROOT_KEY).unwrap(),
            Some(root.to_hex().into_bytes())
        );

        let mut batch = Batch::new();
        batch.del_node(&node);
        store.commit(batch).unwrap();
        assert_eq!(store.get(&node.to_hex()).unwrap(), None);
    }

    #[test]
    fn clone_snapshots_current_contents() {
        let store = MemStore::new();
        store.put("k", b"v".to_vec()).unwrap();
        let snapshot = store.clone();
        store.put("k", b"w".to_vec()).unwrap();
        assert_eq!(snapshot.get("k").unwrap(), Some(b"v".to_vec()));
    }
}
