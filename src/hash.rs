//! Hashing primitives shared by the prover and the verifier.
//!
//! Every digest in the forestry is a blake2b-256 hash. Inner nodes are
//! combined with [`combine`], which is the only way two digests are ever
//! folded into one.
use crate::constant::DIGEST_SIZE;
use blake2b_simd::Params;
use derive_more::Deref;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A 32-byte blake2b-256 digest.
///
/// Wraps the raw bytes so that paths, node hashes and value digests all
/// share one hex-aware type. Renders as lowercase hex everywhere.
#[derive(Clone, Copy, Deref, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Hash(pub [u8; DIGEST_SIZE]);

impl Hash {
    /// Interpret exactly [`DIGEST_SIZE`] bytes as a digest.
    ///
    /// Returns `None` when the slice has any other length.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let bytes: [u8; DIGEST_SIZE] = bytes.try_into().ok()?;
        Some(Self(bytes))
    }

    /// Lowercase hex rendering, 64 characters.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.to_hex())
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; DIGEST_SIZE]> for Hash {
    fn from(bytes: [u8; DIGEST_SIZE]) -> Self {
        Self(bytes)
    }
}

impl FromStr for Hash {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; DIGEST_SIZE];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(bytes))
    }
}

impl Serialize for Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// Hash arbitrary bytes down to a [`Hash`].
pub fn digest(bytes: &[u8]) -> Hash {
    let hash = Params::new().hash_length(DIGEST_SIZE).hash(bytes);
    let mut out = [0u8; DIGEST_SIZE];
    out.copy_from_slice(hash.as_bytes());
    Hash(out)
}

/// Fold two digests into the digest of their concatenation.
pub fn combine(left: &Hash, right: &Hash) -> Hash {
    let mut state = Params::new().hash_length(DIGEST_SIZE).to_state();
    state.update(left.as_ref());
    state.update(right.as_ref());
    let mut out = [0u8; DIGEST_SIZE];
    out.copy_from_slice(state.finalize().as_bytes());
    Hash(out)
}

/// Hash of a leaf node: its parity-tagged suffix followed by the digest of
/// its value. `suffix` holds one nibble per byte.
pub fn leaf_hash(suffix: &[u8], value_digest: &Hash) -> Hash {
    let mut bytes = crate::path::encode_suffix(suffix);
    bytes.extend_from_slice(value_digest.as_ref());
    digest(&bytes)
}

/// Hash of a branch node: its prefix, one nibble per byte and untagged,
/// followed by the Merkle root of its sixteen children.
pub fn branch_hash(prefix: &[u8], merkle_root: &Hash) -> Hash {
    let mut bytes = Vec::with_capacity(prefix.len() + DIGEST_SIZE);
    bytes.extend_from_slice(prefix);
    bytes.extend_from_slice(merkle_root.as_ref());
    digest(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn digest_matches_blake2b_256_reference_vector() {
        // blake2b-256 of the empty input.
        assert_eq!(
            digest(b"").0,
            hex!("0e5751c026e543b2e8ab2eb06099daa1d1e5df47778f7787faab45cdf12fe3a8")
        );
    }

    #[test]
    fn combine_is_digest_of_concatenation() {
        let left = digest(b"left");
        let right = digest(b"right");
        let mut concat = Vec::new();
        concat.extend_from_slice(left.as_ref());
        concat.extend_from_slice(right.as_ref());
        assert_eq!(combine(&left, &right), digest(&concat));
    }

    #[test]
    fn hex_round_trip() {
        let hash = digest(b"round-trip");
        assert_eq!(hash.to_hex().parse::<Hash>().unwrap(), hash);
        assert_eq!(hash.to_hex().len(), 64);
    }

    #[test]
    fn from_slice_rejects_wrong_lengths() {
        assert!(Hash::from_slice(&[0u8; 31]).is_none());
        assert!(Hash::from_slice(&[0u8; 33]).is_none());
        assert!(Hash::from_slice(&[0u8; 32]).is_some());
    }
}
