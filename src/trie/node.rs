//! Trie node model: leaves, branches, and the lazily resolved references
//! between them.
//!
//! A node owns either its children directly or 32-byte hash handles that
//! are resolved against the [`Store`] when a walk reaches them. Payloads
//! in the store are content-addressed JSON documents; [`materialize`]
//! re-hashes every payload it loads so a corrupted backend cannot smuggle
//! a node in under the wrong key.
use crate::{
    constant::{PATH_NIBBLES, RADIX},
    hash::{branch_hash, digest, leaf_hash, Hash},
    merkle,
    path::{self, path_nibbles},
    traits::Store,
    trie::TrieError,
};
use serde::{Deserialize, Serialize};

/// A reference to a child node: either resolved in memory or a hash
/// handle pointing into the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum NodeRef {
    /// A node that has been paged out; only its hash is known.
    Hash(Hash),
    /// A node held in memory.
    Node(Box<Node>),
}

impl NodeRef {
    /// The hash of the referenced node, without touching the store.
    pub(crate) fn hash(&self) -> Hash {
        match self {
            NodeRef::Hash(hash) => *hash,
            NodeRef::Node(node) => node.hash(),
        }
    }
}

/// Resolve a reference in place, fetching and validating the node payload
/// from the store when it is not already in memory.
pub(crate) fn materialize<'a, S: Store>(
    reference: &'a mut NodeRef,
    store: &S,
) -> Result<&'a mut Node, TrieError<S::Error>> {
    if let NodeRef::Hash(hash) = reference {
        let hash = *hash;
        let payload = store
            .get(&hash.to_hex())
            .map_err(TrieError::Store)?
            .ok_or(TrieError::MissingNode(hash))?;
        let node = Node::from_payload(&payload, &hash).ok_or(TrieError::CorruptedNode(hash))?;
        *reference = NodeRef::Node(Box::new(node));
    }
    match reference {
        NodeRef::Node(node) => Ok(node),
        NodeRef::Hash(_) => unreachable!("resolved above"),
    }
}

/// A leaf holding one key-value pair.
///
/// `suffix` is the tail of the key's path below the point where the leaf
/// hangs; the key's digest always ends with it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Leaf {
    pub(crate) suffix: Vec<u8>,
    pub(crate) key: Vec<u8>,
    pub(crate) value: Vec<u8>,
    hash: Hash,
}

impl Leaf {
    pub(crate) fn new(suffix: Vec<u8>, key: Vec<u8>, value: Vec<u8>) -> Self {
        let hash = leaf_hash(&suffix, &digest(&value));
        Self {
            suffix,
            key,
            value,
            hash,
        }
    }

    /// The leaf's hash as bound into its parent.
    pub fn hash(&self) -> Hash {
        self.hash
    }

    /// The stored key, in its original bytes.
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    /// The stored value.
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// The remaining path nibbles below the leaf's position.
    pub fn suffix(&self) -> &[u8] {
        &self.suffix
    }

    /// The full 64-nibble path of the stored key.
    pub fn path(&self) -> Hash {
        digest(&self.key)
    }

    /// The digest of the stored value, as it appears inside hashes.
    pub fn value_hash(&self) -> Hash {
        digest(&self.value)
    }

    /// Recompute the cached hash after the suffix changed.
    pub(crate) fn rehash(&mut self) {
        self.hash = leaf_hash(&self.suffix, &digest(&self.value));
    }
}

/// An interior node routing sixteen ways on the nibble after its prefix.
///
/// At least two children are always populated; a branch that would be
/// left with one child collapses into it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Branch {
    pub(crate) prefix: Vec<u8>,
    pub(crate) children: [Option<NodeRef>; RADIX],
    pub(crate) size: usize,
    hash: Hash,
}

impl Branch {
    pub(crate) fn new(prefix: Vec<u8>, children: [Option<NodeRef>; RADIX], size: usize) -> Self {
        let mut branch = Self {
            prefix,
            children,
            size,
            hash: Hash::default(),
        };
        branch.recompute_hash();
        branch
    }

    /// The branch's hash as bound into its parent.
    pub fn hash(&self) -> Hash {
        self.hash
    }

    /// The common nibble prefix of every descendant below this branch.
    pub fn prefix(&self) -> &[u8] {
        &self.prefix
    }

    /// Number of leaves below this branch.
    pub fn size(&self) -> usize {
        self.size
    }

    /// The sixteen child hashes, empty slots as `NULL_HASH`.
    pub(crate) fn child_hashes(&self) -> [Hash; RADIX] {
        std::array::from_fn(|i| {
            self.children[i]
                .as_ref()
                .map_or(crate::constant::NULL_HASH, NodeRef::hash)
        })
    }

    /// Merkle root over the sixteen child hashes.
    pub fn merkle_root(&self) -> Hash {
        merkle::merkle_root(&self.child_hashes())
    }

    /// Indices of the populated child slots.
    pub(crate) fn populated(&self) -> impl Iterator<Item = u8> + '_ {
        self.children
            .iter()
            .enumerate()
            .filter_map(|(i, child)| child.is_some().then_some(i as u8))
    }

    /// Recompute the cached hash after children or prefix changed.
    pub(crate) fn recompute_hash(&mut self) {
        self.hash = branch_hash(&self.prefix, &self.merkle_root());
    }
}

/// A trie node. The empty trie is represented by the absence of a root,
/// not by a node variant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Node {
    /// A key-value pair with the unconsumed tail of its path.
    Leaf(Leaf),
    /// A sixteen-way interior node with a shared prefix.
    Branch(Branch),
}

impl Node {
    /// The node's hash, which is also its key in the store.
    pub fn hash(&self) -> Hash {
        match self {
            Node::Leaf(leaf) => leaf.hash(),
            Node::Branch(branch) => branch.hash(),
        }
    }

    /// Number of leaves in the sub-trie rooted at this node.
    pub fn size(&self) -> usize {
        match self {
            Node::Leaf(_) => 1,
            Node::Branch(branch) => branch.size(),
        }
    }

    /// Serialize the node into its content-addressed store payload.
    pub(crate) fn to_payload(&self) -> Vec<u8> {
        let payload = match self {
            Node::Leaf(leaf) => Payload::Leaf {
                suffix: path::to_hex(&leaf.suffix),
                key: hex::encode(&leaf.key),
                value: hex::encode(&leaf.value),
            },
            Node::Branch(branch) => Payload::Branch {
                prefix: path::to_hex(&branch.prefix),
                size: branch.size,
                children: std::array::from_fn(|i| {
                    branch.children[i].as_ref().map(NodeRef::hash)
                }),
            },
        };
        serde_json::to_vec(&payload).expect("node payloads are plain JSON data")
    }

    /// Rebuild a node from its store payload, checking that it hashes back
    /// to the key it was stored under.
    pub(crate) fn from_payload(bytes: &[u8], expected: &Hash) -> Option<Self> {
        let node = match serde_json::from_slice(bytes).ok()? {
            Payload::Leaf { suffix, key, value } => {
                let suffix = path::from_hex(&suffix)?;
                let key = hex::decode(key).ok()?;
                let value = hex::decode(value).ok()?;
                let leaf = Leaf::new(suffix, key, value);
                // The key's path must end with the stored suffix.
                let nibs = path_nibbles(&leaf.path());
                if !nibs.ends_with(&leaf.suffix) || leaf.suffix.len() > PATH_NIBBLES {
                    return None;
                }
                Node::Leaf(leaf)
            }
            Payload::Branch {
                prefix,
                size,
                children,
            } => {
                let prefix = path::from_hex(&prefix)?;
                let mut slots: [Option<NodeRef>; RADIX] = Default::default();
                for (slot, child) in slots.iter_mut().zip(children) {
                    *slot = child.map(NodeRef::Hash);
                }
                let branch = Branch::new(prefix, slots, size);
                if branch.populated().count() < 2 {
                    return None;
                }
                Node::Branch(branch)
            }
        };
        (node.hash() == *expected).then_some(node)
    }
}

/// On-store JSON shape of a node.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Payload {
    Leaf {
        suffix: String,
        key: String,
        value: String,
    },
    Branch {
        prefix: String,
        size: usize,
        children: [Option<Hash>; RADIX],
    },
}
