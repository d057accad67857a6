//! This module is the implementation of generating, verifying, and
//! serializing membership proofs.
use thiserror::Error;

pub mod cbor;
pub(crate) mod prover;
pub mod step;
pub mod verifier;

pub use cbor::CborError;
pub use step::{Neighbor, Proof, Step};
pub use verifier::{verify, Mode, TrieRoot};

/// Errors surfaced while checking a proof.
///
/// Verification itself is total: it always recomputes *some* hash, and a
/// structural failure simply means the proof cannot match any valid root.
/// These errors exist so callers can tell a malformed proof apart from a
/// well-formed one that verifies against a different root.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProofError {
    /// The proof does not verify against the expected root.
    #[error("proof does not verify against the expected root")]
    InvalidProof,
    /// A root handle needs exactly 32 bytes.
    #[error("a root must be exactly 32 bytes, got {0}")]
    MalformedRoot(usize),
    /// Inclusion verification needs the value being proven.
    #[error("inclusion verification requires a value")]
    MissingValue,
    /// A step's `skip` walks past the end of the 64-nibble path.
    #[error("step starting at nibble {0} overruns the path")]
    PathOverrun(usize),
    /// A fork or leaf neighbor claims the same routing nibble as the
    /// target, which cannot happen in a well-formed trie.
    #[error("neighbor shares the target's nibble at position {0}")]
    NibbleCollision(usize),
    /// A leaf neighbor's path diverges from the target's before the point
    /// the step claims they fork at.
    #[error("neighbor path diverges from the target path at nibble {0}")]
    PathMismatch(usize),
}
