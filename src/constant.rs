//! This module defines the constants that determine the shape of the forestry.
use crate::hash::{combine, Hash};
use once_cell::sync::Lazy;

/// Number of bits consumed per trie level. The forestry is a radix-16
/// (hexadecimal) Patricia trie.
pub const NIBBLE_BITS: usize = 4;
/// Branch factor of a trie node. Always a power of two.
pub const RADIX: usize = 1 << NIBBLE_BITS;
/// Size in bytes of every digest handled by the forestry.
pub const DIGEST_SIZE: usize = 32;
/// Number of nibbles in a full path. Keys are routed by the nibbles of
/// their blake2b-256 digest, so every path is exactly 64 nibbles long.
pub const PATH_NIBBLES: usize = 2 * DIGEST_SIZE;
/// Depth of the per-branch Merkle tree over its [`RADIX`] children.
pub const MERKLE_DEPTH: usize = NIBBLE_BITS;

/// Reserved store key holding the current root hash, as 64 hex characters.
/// Every other store key is the 64-hex-character hash of a node payload.
pub const ROOT_KEY: &str = "__root__";

/// Hash of the empty trie, and of any empty child slot inside a branch.
pub const NULL_HASH: Hash = Hash([0u8; DIGEST_SIZE]);

/// Root of a 2-wide Merkle sub-tree with both leaves empty.
pub static NULL_HASH_2: Lazy<Hash> = Lazy::new(|| combine(&NULL_HASH, &NULL_HASH));
/// Root of a 4-wide Merkle sub-tree with all leaves empty.
pub static NULL_HASH_4: Lazy<Hash> = Lazy::new(|| combine(&NULL_HASH_2, &NULL_HASH_2));
/// Root of an 8-wide Merkle sub-tree with all leaves empty.
pub static NULL_HASH_8: Lazy<Hash> = Lazy::new(|| combine(&NULL_HASH_4, &NULL_HASH_4));

/// Root of an all-empty Merkle sub-tree of the given width.
///
/// Widths are the powers of two occurring inside a branch's 16-leaf tree.
pub fn null_root(width: usize) -> Hash {
    match width {
        1 => NULL_HASH,
        2 => *NULL_HASH_2,
        4 => *NULL_HASH_4,
        8 => *NULL_HASH_8,
        _ => unreachable!("no empty sub-tree of width {width} occurs in a branch"),
    }
}
