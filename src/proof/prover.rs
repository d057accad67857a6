//! Proof construction: walking the trie from the root towards a target
//! leaf, recording one step per traversed branch.
//!
//! The shape of each step is decided by a census of the branch's
//! non-target children: two or more yield a [`Step::Branch`] with the
//! four sparse-Merkle neighbors, exactly one yields a [`Step::Fork`] or
//! [`Step::Leaf`] describing that sibling whole. A walk that cannot
//! reach the target (empty slot, diverging prefix, or a different leaf)
//! ends with the step for the level where the divergence happened; such
//! a partial proof is exactly what excluding-mode verification consumes.
use crate::{
    merkle::merkle_proof,
    path::common_prefix,
    proof::{Neighbor, Proof, Step},
    traits::Store,
    trie::{
        node::{materialize, Node, NodeRef},
        TrieError,
    },
};

/// Walk `nibs` from `root`, collecting steps. Fails with
/// [`TrieError::NotPresent`] when the key is absent and `allow_missing`
/// is not set.
pub(crate) fn prove<S: Store>(
    root: &mut NodeRef,
    store: &S,
    nibs: &[u8],
    key: &[u8],
    allow_missing: bool,
) -> Result<Proof, TrieError<S::Error>> {
    let mut steps = Vec::new();
    let mut cursor = 0;
    let mut current = root;
    loop {
        let node = materialize(current, store)?;
        match node {
            Node::Leaf(leaf) => {
                if leaf.key == key {
                    return Ok(Proof::from_steps(steps));
                }
                // A different leaf sits where the target would hang; its
                // full path and value digest let the verifier re-hash it
                // on either side of the would-be fork.
                let shared = common_prefix(&leaf.suffix, &nibs[cursor..]);
                steps.push(Step::Leaf {
                    skip: shared,
                    key: leaf.path(),
                    value: leaf.value_hash(),
                });
                return missing(steps, allow_missing);
            }
            Node::Branch(branch) => {
                let rest = &nibs[cursor..];
                let shared = common_prefix(branch.prefix(), rest);
                if shared < branch.prefix().len() {
                    // The target diverges inside this branch's prefix;
                    // the branch's own remainder is the sibling.
                    steps.push(Step::Fork {
                        skip: shared,
                        neighbor: Neighbor {
                            nibble: branch.prefix()[shared],
                            prefix: branch.prefix()[shared + 1..].to_vec(),
                            root: branch.merkle_root(),
                        },
                    });
                    return missing(steps, allow_missing);
                }

                let nib = rest[shared];
                let others: Vec<u8> = branch.populated().filter(|i| *i != nib).collect();
                let step = if others.len() >= 2 {
                    Step::Branch {
                        skip: shared,
                        neighbors: merkle_proof(&branch.child_hashes(), nib as usize),
                    }
                } else {
                    // Exactly one sibling: record it whole so excluding
                    // mode can rebuild the branch's collapsed form.
                    let only = others[0];
                    let sibling = materialize(
                        branch.children[only as usize]
                            .as_mut()
                            .expect("census says populated"),
                        store,
                    )?;
                    match sibling {
                        Node::Leaf(leaf) => Step::Leaf {
                            skip: shared,
                            key: leaf.path(),
                            value: leaf.value_hash(),
                        },
                        Node::Branch(sub) => Step::Fork {
                            skip: shared,
                            neighbor: Neighbor {
                                nibble: only,
                                prefix: sub.prefix().to_vec(),
                                root: sub.merkle_root(),
                            },
                        },
                    }
                };
                steps.push(step);

                cursor += shared + 1;
                match branch.children[nib as usize].as_mut() {
                    None => return missing(steps, allow_missing),
                    Some(child) => current = child,
                }
            }
        }
    }
}

fn missing<E>(steps: Vec<Step>, allow_missing: bool) -> Result<Proof, TrieError<E>> {
    if allow_missing {
        Ok(Proof::from_steps(steps))
    } else {
        Err(TrieError::NotPresent)
    }
}
