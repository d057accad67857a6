//! Proof and step types, with their JSON wire shape.
//!
//! A proof is the ordered list of steps a prover recorded while walking
//! from the root towards a target leaf; step `i` describes the branch
//! met at depth `i`. The JSON rendering matches the historical wire
//! format: hex strings for all digests, branch neighbors flattened into
//! one 128-character-pair hex field, and leaf neighbors in the
//! `{key, value}` shape.
use crate::{
    constant::{DIGEST_SIZE, MERKLE_DEPTH, RADIX},
    hash::Hash,
    path,
};
use derive_more::Deref;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// The sibling sub-trie recorded whole inside a [`Step::Fork`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Neighbor {
    /// The nibble routing to the neighbor inside its branch.
    pub nibble: u8,
    /// The neighbor branch's own prefix, one nibble per byte.
    pub prefix: Vec<u8>,
    /// The Merkle root over the neighbor branch's children.
    pub root: Hash,
}

/// One level of a proof, shaped by how many non-target children the
/// branch at that level has.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Step {
    /// A branch with at least two non-target children: the four
    /// sparse-Merkle neighbors around the target slot, top-down.
    Branch {
        /// Prefix nibbles consumed at this level, before the routing
        /// nibble.
        skip: usize,
        /// Sibling sub-tree roots, `[lvl1, lvl2, lvl3, lvl4]`.
        neighbors: [Hash; MERKLE_DEPTH],
    },
    /// A branch whose only non-target child is itself a branch, recorded
    /// whole.
    Fork {
        /// Prefix nibbles consumed at this level.
        skip: usize,
        /// The sibling branch.
        neighbor: Neighbor,
    },
    /// A branch whose only non-target child is a leaf; its full path and
    /// value digest let a verifier re-hash it at any depth.
    Leaf {
        /// Prefix nibbles consumed at this level.
        skip: usize,
        /// The sibling leaf's full 64-nibble path.
        key: Hash,
        /// The digest of the sibling leaf's value.
        value: Hash,
    },
}

impl Step {
    /// Prefix nibbles consumed by this step before its routing nibble.
    pub fn skip(&self) -> usize {
        match self {
            Step::Branch { skip, .. } | Step::Fork { skip, .. } | Step::Leaf { skip, .. } => *skip,
        }
    }
}

/// An ordered list of [`Step`]s proving membership or absence of one key.
#[derive(Clone, Debug, Default, Deref, PartialEq, Eq)]
pub struct Proof(Vec<Step>);

impl Proof {
    /// Wrap an ordered list of steps.
    pub fn from_steps(steps: Vec<Step>) -> Self {
        Self(steps)
    }

    /// The steps, root-most first.
    pub fn steps(&self) -> &[Step] {
        &self.0
    }

    /// Render the proof in its JSON wire shape.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("proofs are plain JSON data")
    }

    /// Parse a proof from its JSON wire shape.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Encode the proof in its tagged CBOR wire shape.
    pub fn to_cbor(&self) -> Vec<u8> {
        super::cbor::encode(self)
    }

    /// Decode a proof from its tagged CBOR wire shape.
    pub fn from_cbor(bytes: &[u8]) -> Result<Self, super::cbor::CborError> {
        super::cbor::decode(bytes)
    }
}

impl fmt::Display for Proof {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return writeln!(f, "(empty proof)");
        }
        for (i, step) in self.0.iter().enumerate() {
            match step {
                Step::Branch { skip, neighbors } => {
                    writeln!(
                        f,
                        "{i}. branch skip={skip} neighbors=[{}, {}, {}, {}]",
                        neighbors[0], neighbors[1], neighbors[2], neighbors[3]
                    )?;
                }
                Step::Fork { skip, neighbor } => {
                    writeln!(
                        f,
                        "{i}. fork   skip={skip} nibble={:x} prefix={} root={}",
                        neighbor.nibble,
                        path::to_hex(&neighbor.prefix),
                        neighbor.root
                    )?;
                }
                Step::Leaf { skip, key, value } => {
                    writeln!(f, "{i}. leaf   skip={skip} key={key} value={value}")?;
                }
            }
        }
        Ok(())
    }
}

/// JSON wire shape of a [`Step`].
#[derive(Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum WireStep {
    Branch { skip: usize, neighbors: String },
    Fork { skip: usize, neighbor: WireFork },
    Leaf { skip: usize, neighbor: WireLeaf },
}

#[derive(Serialize, Deserialize)]
struct WireFork {
    nibble: u8,
    prefix: String,
    root: Hash,
}

#[derive(Serialize, Deserialize)]
struct WireLeaf {
    key: Hash,
    value: Hash,
}

impl From<&Step> for WireStep {
    fn from(step: &Step) -> Self {
        match step {
            Step::Branch { skip, neighbors } => {
                let mut hex = String::with_capacity(MERKLE_DEPTH * DIGEST_SIZE * 2);
                for neighbor in neighbors {
                    hex.push_str(&neighbor.to_hex());
                }
                WireStep::Branch {
                    skip: *skip,
                    neighbors: hex,
                }
            }
            Step::Fork { skip, neighbor } => WireStep::Fork {
                skip: *skip,
                neighbor: WireFork {
                    nibble: neighbor.nibble,
                    prefix: path::to_hex(&neighbor.prefix),
                    root: neighbor.root,
                },
            },
            Step::Leaf { skip, key, value } => WireStep::Leaf {
                skip: *skip,
                neighbor: WireLeaf {
                    key: *key,
                    value: *value,
                },
            },
        }
    }
}

impl TryFrom<WireStep> for Step {
    type Error = String;

    fn try_from(wire: WireStep) -> Result<Self, Self::Error> {
        match wire {
            WireStep::Branch { skip, neighbors } => {
                let bytes = hex::decode(&neighbors)
                    .map_err(|e| format!("branch neighbors are not hex: {e}"))?;
                if bytes.len() != MERKLE_DEPTH * DIGEST_SIZE {
                    return Err(format!(
                        "branch neighbors must be {} bytes, got {}",
                        MERKLE_DEPTH * DIGEST_SIZE,
                        bytes.len()
                    ));
                }
                let neighbors = std::array::from_fn(|i| {
                    Hash::from_slice(&bytes[i * DIGEST_SIZE..(i + 1) * DIGEST_SIZE])
                        .expect("chunk is 32 bytes")
                });
                Ok(Step::Branch { skip, neighbors })
            }
            WireStep::Fork { skip, neighbor } => {
                if usize::from(neighbor.nibble) >= RADIX {
                    return Err(format!("nibble {} is out of range", neighbor.nibble));
                }
                let prefix = path::from_hex(&neighbor.prefix)
                    .ok_or_else(|| format!("fork prefix {:?} is not hex", neighbor.prefix))?;
                Ok(Step::Fork {
                    skip,
                    neighbor: Neighbor {
                        nibble: neighbor.nibble,
                        prefix,
                        root: neighbor.root,
                    },
                })
            }
            WireStep::Leaf { skip, neighbor } => Ok(Step::Leaf {
                skip,
                key: neighbor.key,
                value: neighbor.value,
            }),
        }
    }
}

impl Serialize for Step {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        WireStep::from(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Step {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = WireStep::deserialize(deserializer)?;
        Step::try_from(wire).map_err(de::Error::custom)
    }
}

impl Serialize for Proof {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Proof {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Vec::<Step>::deserialize(deserializer).map(Proof)
    }
}
