//! Verifier for membership proofs: recomputes a root hash from a path,
//! an optional value, and a list of steps.
//!
//! The verifier performs no I/O and allocates only the byte buffers it
//! hashes. It never sees the trie — just the proof — so everything it
//! accepts is bound by the root hash the caller compares against.
use crate::{
    constant::{NULL_HASH, PATH_NIBBLES},
    hash::{branch_hash, digest, leaf_hash, Hash},
    merkle::{merkle_16, sparse_merkle_16},
    path::{nibble, nibbles, to_path},
    proof::{Proof, ProofError, Step},
};

/// Which claim a proof is being checked against.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// The key is present, bound to the provided value.
    Including,
    /// The key is absent.
    Excluding,
}

/// Recompute the root committed to by `proof` for the given path.
///
/// In [`Mode::Including`] the returned hash is the root of the trie that
/// contains `(path → value)`; in [`Mode::Excluding`] it is the root of
/// the trie from which the path is absent. Callers compare the result
/// against a known root; the two modes over one proof are what ties a
/// pre-insertion root to a post-insertion one.
///
/// Errors flag structurally malformed proofs. They can never be turned
/// into a successful forgery: a malformed proof simply has no root.
pub fn verify(
    path: &Hash,
    value: Option<&[u8]>,
    proof: &Proof,
    mode: Mode,
) -> Result<Hash, ProofError> {
    let value_hash = value.map(digest);
    walk(
        path.as_ref(),
        value_hash.as_ref(),
        proof.steps(),
        0,
        mode == Mode::Including,
    )
}

fn walk(
    path: &[u8],
    value: Option<&Hash>,
    steps: &[Step],
    cursor: usize,
    including: bool,
) -> Result<Hash, ProofError> {
    let Some((step, rest)) = steps.split_first() else {
        return if including {
            // The target leaf itself, hanging with whatever is left of
            // the path below the last branch.
            let value = value.ok_or(ProofError::MissingValue)?;
            Ok(leaf_hash(&nibbles(path, cursor, PATH_NIBBLES), value))
        } else {
            // The absent target contributes an empty slot.
            Ok(NULL_HASH)
        };
    };

    let skip = step.skip();
    let next_cursor = cursor + 1 + skip;
    if next_cursor > PATH_NIBBLES {
        return Err(ProofError::PathOverrun(cursor));
    }

    if !including && rest.is_empty() {
        match step {
            Step::Fork { skip, neighbor } => {
                // Without the target, this branch never forked: the node
                // here is the neighbor with the skipped prefix nibbles
                // and its routing nibble folded back in. The prefix must
                // come from the caller's path, which is all the branch
                // prefix and the target agreed on.
                let mut bytes = nibbles(path, cursor, cursor + skip);
                bytes.push(neighbor.nibble);
                bytes.extend_from_slice(&neighbor.prefix);
                bytes.extend_from_slice(neighbor.root.as_ref());
                return Ok(digest(&bytes));
            }
            Step::Leaf {
                key: neighbor_path,
                value: neighbor_value,
                ..
            } => {
                // Without the target, the sibling leaf hangs here alone,
                // its suffix running from the current cursor.
                ensure_shared_prefix(path, neighbor_path.as_ref(), cursor)?;
                if neighbor_path.as_ref() == path {
                    return Err(ProofError::PathMismatch(cursor));
                }
                return Ok(leaf_hash(
                    &nibbles(neighbor_path.as_ref(), cursor, PATH_NIBBLES),
                    neighbor_value,
                ));
            }
            // A terminal branch step keeps its shape: the target slot
            // just resolves to NULL_HASH through the recursion below.
            Step::Branch { .. } => {}
        }
    }

    let me = walk(path, value, rest, next_cursor, including)?;
    let this_nibble = nibble(path, next_cursor - 1);

    let merkle = match step {
        Step::Branch { neighbors, .. } => merkle_16(this_nibble, &me, neighbors),
        Step::Fork { neighbor, .. } => {
            if neighbor.nibble == this_nibble {
                return Err(ProofError::NibbleCollision(next_cursor - 1));
            }
            let them = branch_hash(&neighbor.prefix, &neighbor.root);
            sparse_merkle_16(this_nibble, &me, neighbor.nibble, &them)
        }
        Step::Leaf {
            key: neighbor_path,
            value: neighbor_value,
            ..
        } => {
            ensure_shared_prefix(path, neighbor_path.as_ref(), cursor)?;
            let neighbor_nibble = nibble(neighbor_path.as_ref(), next_cursor - 1);
            if neighbor_nibble == this_nibble {
                return Err(ProofError::NibbleCollision(next_cursor - 1));
            }
            let them = leaf_hash(
                &nibbles(neighbor_path.as_ref(), next_cursor, PATH_NIBBLES),
                neighbor_value,
            );
            sparse_merkle_16(this_nibble, &me, neighbor_nibble, &them)
        }
    };

    Ok(branch_hash(&nibbles(path, cursor, next_cursor - 1), &merkle))
}

/// A leaf neighbor must agree with the target on every nibble above the
/// level it is recorded at.
fn ensure_shared_prefix(path: &[u8], neighbor: &[u8], cursor: usize) -> Result<(), ProofError> {
    for i in 0..cursor {
        if nibble(path, i) != nibble(neighbor, i) {
            return Err(ProofError::PathMismatch(i));
        }
    }
    Ok(())
}

/// A verifier-side handle on a trie: nothing but its 32-byte root.
///
/// All operations are pure recomputations over proofs; none of them can
/// mutate state on an invalid proof.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TrieRoot(Hash);

impl TrieRoot {
    /// Wrap a known root hash.
    pub const fn new(root: Hash) -> Self {
        Self(root)
    }

    /// The root of the empty trie.
    pub const fn empty() -> Self {
        Self(NULL_HASH)
    }

    /// Interpret exactly 32 bytes as a root.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProofError> {
        Hash::from_slice(bytes)
            .map(Self)
            .ok_or(ProofError::MalformedRoot(bytes.len()))
    }

    /// The underlying root hash.
    pub fn hash(&self) -> Hash {
        self.0
    }

    /// Whether this is the empty trie's root.
    pub fn is_empty(&self) -> bool {
        self.0 == NULL_HASH
    }

    /// Check that `(key → value)` is present in the trie at this root.
    pub fn has(&self, key: &[u8], value: &[u8], proof: &Proof) -> bool {
        verify(&to_path(key), Some(value), proof, Mode::Including)
            .map_or(false, |root| root == self.0)
    }

    /// Check that `key` is absent from the trie at this root.
    pub fn miss(&self, key: &[u8], proof: &Proof) -> bool {
        verify(&to_path(key), None, proof, Mode::Excluding).map_or(false, |root| root == self.0)
    }

    /// Advance the root by inserting `(key → value)` through `proof`.
    ///
    /// Requires the proof to show the key absent from the current root;
    /// the result is the unique root that additionally contains the pair.
    pub fn insert(&self, key: &[u8], value: &[u8], proof: &Proof) -> Result<Self, ProofError> {
        if !self.miss(key, proof) {
            return Err(ProofError::InvalidProof);
        }
        verify(&to_path(key), Some(value), proof, Mode::Including).map(Self)
    }

    /// Advance the root by removing `(key → value)` through `proof`.
    ///
    /// Requires the proof to show the pair present in the current root;
    /// the result is the root without it.
    pub fn delete(&self, key: &[u8], value: &[u8], proof: &Proof) -> Result<Self, ProofError> {
        if !self.has(key, value, proof) {
            return Err(ProofError::InvalidProof);
        }
        verify(&to_path(key), None, proof, Mode::Excluding).map(Self)
    }

    /// Replace the value under `key`, reusing one proof for both sides.
    ///
    /// Requires the proof to show `(key → old)` present; the result
    /// contains `(key → new)` instead. Equivalent to `delete` then
    /// `insert`, with one recomputation saved.
    pub fn update(
        &self,
        key: &[u8],
        proof: &Proof,
        old: &[u8],
        new: &[u8],
    ) -> Result<Self, ProofError> {
        if !self.has(key, old, proof) {
            return Err(ProofError::InvalidProof);
        }
        verify(&to_path(key), Some(new), proof, Mode::Including).map(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trie::Trie;

    #[test]
    fn empty_handles_are_null() {
        assert!(TrieRoot::empty().is_empty());
        assert_eq!(TrieRoot::empty().hash(), NULL_HASH);
        assert!(TrieRoot::from_bytes(&[0u8; 32]).unwrap().is_empty());
    }

    #[test]
    fn from_bytes_rejects_other_lengths() {
        assert_eq!(
            TrieRoot::from_bytes(&[0u8; 31]),
            Err(ProofError::MalformedRoot(31))
        );
        assert_eq!(
            TrieRoot::from_bytes(&[0u8; 33]),
            Err(ProofError::MalformedRoot(33))
        );
    }

    #[test]
    fn verifying_against_an_empty_proof_needs_a_value() {
        let path = to_path(b"foo");
        assert_eq!(
            verify(&path, None, &Proof::default(), Mode::Including),
            Err(ProofError::MissingValue)
        );
        assert_eq!(
            verify(&path, None, &Proof::default(), Mode::Excluding),
            Ok(NULL_HASH)
        );
    }

    #[test]
    fn single_leaf_inclusion_with_zero_steps() {
        let mut trie = Trie::new();
        trie.insert(b"foo", b"bar").unwrap();
        let proof = trie.prove(b"foo", false).unwrap();
        assert!(proof.is_empty());

        let handle = TrieRoot::new(trie.root());
        assert!(handle.has(b"foo", b"bar", &proof));
        assert!(!handle.has(b"foo", b"baz", &proof));
        assert!(!handle.has(b"fo", b"bar", &proof));
    }

    #[test]
    fn verifier_operations_track_the_prover() {
        let mut trie = Trie::new();
        trie.insert(b"foo", b"14").unwrap();
        trie.insert(b"bar", b"42").unwrap();
        let before = TrieRoot::new(trie.root());

        // Insert through an exclusion proof.
        let proof = trie.prove(b"baz", true).unwrap();
        assert!(before.miss(b"baz", &proof));
        let after = before.insert(b"baz", b"27", &proof).unwrap();
        trie.insert(b"baz", b"27").unwrap();
        assert_eq!(after.hash(), trie.root());

        // Update through a membership proof.
        let proof = trie.prove(b"baz", false).unwrap();
        let updated = after.update(b"baz", &proof, b"27", b"28").unwrap();
        let mut other = Trie::load(trie.store().clone()).unwrap();
        other.delete(b"baz").unwrap();
        other.insert(b"baz", b"28").unwrap();
        assert_eq!(updated.hash(), other.root());

        // Delete through the same proof shape.
        let reverted = updated.update(b"baz", &proof, b"28", b"27").unwrap();
        assert_eq!(reverted, after);
        let removed = after.delete(b"baz", b"27", &proof).unwrap();
        assert_eq!(removed, before);
    }

    #[test]
    fn wrong_proofs_are_rejected_not_applied() {
        let mut trie = Trie::new();
        trie.insert(b"foo", b"14").unwrap();
        trie.insert(b"bar", b"42").unwrap();
        let handle = TrieRoot::new(trie.root());

        let proof = trie.prove(b"foo", false).unwrap();
        // Proof for one key cannot insert another.
        assert!(handle.insert(b"qux", b"1", &proof).is_err());
        // Deleting with the wrong value fails.
        assert!(handle.delete(b"foo", b"15", &proof).is_err());
        // Updating from the wrong old value fails.
        assert!(handle.update(b"foo", &proof, b"15", b"16").is_err());
    }
}
