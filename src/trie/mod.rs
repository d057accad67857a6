//! The prover-side trie: a store-backed radix-16 Patricia trie whose
//! nodes carry per-branch sparse Merkle commitments over their children.
use crate::hash::Hash;
use thiserror::Error;

pub mod node;
#[allow(clippy::module_inception)]
pub mod trie;

pub use node::{Branch, Leaf, Node};
pub use trie::Trie;

/// Errors surfaced by trie operations, generic over the storage backend's
/// own error type.
#[derive(Debug, Error)]
pub enum TrieError<E> {
    /// `insert` targeted a key that is already present.
    #[error("key is already present in the trie")]
    AlreadyPresent,
    /// `delete` or `prove` targeted a key that is not present.
    #[error("key is not present in the trie")]
    NotPresent,
    /// `prove` was called on an empty trie, where no walk is possible.
    #[error("cannot construct a proof from an empty trie")]
    EmptyTrie,
    /// A node referenced by its parent has no payload in the store.
    #[error("store holds no payload for node {0}")]
    MissingNode(Hash),
    /// A stored payload fails validation or does not hash back to its key.
    #[error("stored payload for node {0} is corrupted")]
    CorruptedNode(Hash),
    /// The reserved root entry is not a 64-character hex digest.
    #[error("stored root entry is malformed")]
    CorruptedRoot,
    /// The storage backend failed.
    #[error("store error: {0:?}")]
    Store(E),
}
