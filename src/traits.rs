//! Storage trait for paging trie nodes in and out of a backend.
use crate::{constant::ROOT_KEY, hash::Hash};
use std::fmt::Debug;

/// A content-addressed key-value backend for trie nodes.
///
/// Node payloads are stored under the 64-hex-character rendering of their
/// hash; the reserved [`ROOT_KEY`] entry holds the current root hash as 64
/// hex characters. Because node keys are content-addressed, readers
/// anchored on different roots never observe conflicting values for the
/// same key.
///
/// Mutating trie operations never call [`Store::put`] or [`Store::del`]
/// directly: they accumulate a [`Batch`] and hand it to [`Store::commit`],
/// so a backend can apply the whole spine update atomically. Within a
/// batch the node writes are ordered before the root update.
pub trait Store {
    /// Backend error type.
    type Error: Debug;

    /// Fetch the payload stored under `key`, if any.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Self::Error>;

    /// Write a single payload outside of any batch.
    fn put(&self, key: &str, value: Vec<u8>) -> Result<(), Self::Error>;

    /// Remove a single payload outside of any batch.
    fn del(&self, key: &str) -> Result<(), Self::Error>;

    /// Apply a whole batch atomically, in order.
    fn commit(&self, batch: Batch) -> Result<(), Self::Error>;
}

/// A single operation inside a [`Batch`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BatchOp {
    /// Write `value` under `key`.
    Put { key: String, value: Vec<u8> },
    /// Remove the entry under `key`.
    Del { key: String },
}

/// An ordered list of store operations committed atomically.
///
/// One batch wraps each top-level trie mutation. Batches are built
/// in-memory and either committed whole or dropped; a failed mutation
/// never leaves a half-applied spine in the store.
#[derive(Clone, Debug, Default)]
pub struct Batch {
    ops: Vec<BatchOp>,
}

impl Batch {
    /// Create an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a node payload write under its content address.
    pub fn put_node(&mut self, hash: &Hash, payload: Vec<u8>) {
        self.ops.push(BatchOp::Put {
            key: hash.to_hex(),
            value: payload,
        });
    }

    /// Queue removal of the node payload stored under `hash`.
    pub fn del_node(&mut self, hash: &Hash) {
        self.ops.push(BatchOp::Del { key: hash.to_hex() });
    }

    /// Queue the root update. Called last so the batch exposes the new
    /// root only after every node below it.
    pub fn put_root(&mut self, root: &Hash) {
        self.ops.push(BatchOp::Put {
            key: ROOT_KEY.to_string(),
            value: root.to_hex().into_bytes(),
        });
    }

    /// Number of queued operations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether the batch holds no operations.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Consume the batch, yielding its operations in order.
    pub fn into_ops(self) -> Vec<BatchOp> {
        self.ops
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::digest;

    #[test]
    fn batches_keep_their_operations_in_order() {
        let mut batch = Batch::new();
        assert!(batch.is_empty());

        let node = digest(b"node");
        batch.put_node(&node, b"payload".to_vec());
        batch.del_node(&node);
        batch.put_root(&digest(b"root"));
        assert!(!batch.is_empty());
        assert_eq!(batch.len(), 3);

        let ops = batch.into_ops();
        assert!(matches!(&ops[0], BatchOp::Put { key, .. } if *key == node.to_hex()));
        assert!(matches!(&ops[1], BatchOp::Del { key } if *key == node.to_hex()));
        assert!(matches!(&ops[2], BatchOp::Put { key, .. } if *key == ROOT_KEY));
    }
}
