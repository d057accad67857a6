#![doc = include_str!("../README.md")]

pub mod constant;
pub mod hash;
pub mod mem_store;
pub mod merkle;
pub mod path;
pub mod proof;
pub mod traits;
pub mod trie;

pub use hash::Hash;
pub use mem_store::MemStore;
pub use proof::{verify, CborError, Mode, Neighbor, Proof, ProofError, Step, TrieRoot};
pub use traits::{Batch, BatchOp, Store};
pub use trie::{Node, Trie, TrieError};
