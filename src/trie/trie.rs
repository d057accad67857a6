//! This module implements [`Trie`], the prover-side authenticated store.
//!
//! A [`Trie`] pairs an in-memory view of the node graph with a [`Store`]
//! backend. Children are paged in lazily as walks reach them; every
//! mutating operation rewrites the changed spine, recomputes the hashes
//! bottom-up, and commits the whole update as one atomic [`Batch`] with
//! the node writes ordered before the new root. A failed mutation commits
//! nothing; callers should [`Trie::reload`] after an error to drop any
//! stale materializations.
use crate::{
    constant::{NULL_HASH, RADIX, ROOT_KEY},
    hash::Hash,
    mem_store::MemStore,
    path::{self, common_prefix, path_nibbles, to_path},
    proof::{prover, Proof},
    traits::{Batch, Store},
    trie::{
        node::{materialize, Branch, Leaf, Node, NodeRef},
        TrieError,
    },
};
use std::fmt;
use tracing::{debug, trace};

/// A store-backed Merkle Patricia Forestry holding arbitrary key-value
/// pairs.
///
/// Equal content always produces an equal root hash, regardless of the
/// order in which the pairs were inserted or what was deleted along the
/// way. The root of an empty trie is [`NULL_HASH`].
#[derive(Debug)]
pub struct Trie<S: Store = MemStore> {
    root: Option<NodeRef>,
    size: usize,
    store: S,
}

impl Trie<MemStore> {
    /// Create an empty trie over a fresh in-memory store.
    pub fn new() -> Self {
        Self {
            root: None,
            size: 0,
            store: MemStore::new(),
        }
    }

    /// Build an in-memory trie from a list of key-value pairs.
    ///
    /// The resulting root is independent of the order of `pairs`.
    pub fn from_list<K, V>(
        pairs: impl IntoIterator<Item = (K, V)>,
    ) -> Result<Self, TrieError<std::convert::Infallible>>
    where
        K: AsRef<[u8]>,
        V: AsRef<[u8]>,
    {
        let mut trie = Self::new();
        for (key, value) in pairs {
            trie.insert(key.as_ref(), value.as_ref())?;
        }
        Ok(trie)
    }
}

impl Default for Trie<MemStore> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Store> Trie<S> {
    /// Open a trie over an existing store, anchoring on its persisted
    /// root. A store without a root entry (or with [`NULL_HASH`]) yields
    /// an empty trie.
    pub fn load(store: S) -> Result<Self, TrieError<S::Error>> {
        let (root, size) = read_root(&store)?;
        Ok(Self { root, size, store })
    }

    /// Re-anchor the in-memory view on the store's persisted root,
    /// discarding any stale materializations left by a failed mutation.
    pub fn reload(&mut self) -> Result<(), TrieError<S::Error>> {
        let (root, size) = read_root(&self.store)?;
        self.root = root;
        self.size = size;
        Ok(())
    }

    /// The root hash; [`NULL_HASH`] for an empty trie.
    pub fn root(&self) -> Hash {
        self.root.as_ref().map_or(NULL_HASH, NodeRef::hash)
    }

    /// Whether the trie holds no pairs at all.
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Number of key-value pairs in the trie.
    pub fn size(&self) -> usize {
        self.size
    }

    /// The storage backend.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Look up the value stored under `key`, if any.
    pub fn get(&mut self, key: &[u8]) -> Result<Option<&[u8]>, TrieError<S::Error>> {
        let nibs = path_nibbles(&to_path(key));
        let Self { root, store, .. } = self;
        let Some(mut current) = root.as_mut() else {
            return Ok(None);
        };
        let mut cursor = 0;
        loop {
            let node = materialize(current, store)?;
            match node {
                Node::Leaf(leaf) => {
                    return Ok((leaf.key == key).then_some(leaf.value.as_slice()));
                }
                Node::Branch(branch) => {
                    let rest = &nibs[cursor..];
                    if !rest.starts_with(branch.prefix()) {
                        return Ok(None);
                    }
                    let nib = rest[branch.prefix().len()] as usize;
                    cursor += branch.prefix().len() + 1;
                    match branch.children[nib].as_mut() {
                        None => return Ok(None),
                        Some(child) => current = child,
                    }
                }
            }
        }
    }

    /// Insert a new pair. Fails with [`TrieError::AlreadyPresent`] when
    /// the key is already stored, leaving the trie untouched.
    pub fn insert(&mut self, key: &[u8], value: &[u8]) -> Result<(), TrieError<S::Error>> {
        let nibs = path_nibbles(&to_path(key));
        let mut batch = Batch::new();
        let Self { root, store, .. } = self;
        insert_into(root, store, &nibs, 0, key, value, &mut batch)?;
        self.size += 1;
        self.commit(batch, "insert")
    }

    /// Remove the pair stored under `key`. Fails with
    /// [`TrieError::NotPresent`] when the key is absent, leaving the trie
    /// untouched.
    pub fn delete(&mut self, key: &[u8]) -> Result<(), TrieError<S::Error>> {
        let nibs = path_nibbles(&to_path(key));
        let mut batch = Batch::new();
        let Self { root, store, .. } = self;
        delete_from(root, store, &nibs, 0, key, &mut batch)?;
        self.size -= 1;
        self.commit(batch, "delete")
    }

    /// Construct a membership proof for `key`.
    ///
    /// When the key is absent and `allow_missing` is set, the partial
    /// walk is returned instead: it verifies in excluding mode against
    /// the current root, and in including mode against the root the trie
    /// would have after inserting the key.
    pub fn prove(&mut self, key: &[u8], allow_missing: bool) -> Result<Proof, TrieError<S::Error>> {
        let Self { root, store, .. } = self;
        let Some(root) = root.as_mut() else {
            return if allow_missing {
                Ok(Proof::default())
            } else {
                Err(TrieError::EmptyTrie)
            };
        };
        let nibs = path_nibbles(&to_path(key));
        let proof = prover::prove(root, store, &nibs, key, allow_missing)?;
        trace!(steps = proof.len(), "proof constructed");
        Ok(proof)
    }

    /// The sub-trie hanging at the given nibble path, when that path is a
    /// prefix of the trie's content.
    ///
    /// A path ending inside a node's prefix resolves to that node as long
    /// as the remainder matches.
    pub fn child_at(&mut self, nibbles: &[u8]) -> Result<Option<&Node>, TrieError<S::Error>> {
        let Self { root, store, .. } = self;
        let Some(mut current) = root.as_mut() else {
            return Ok(None);
        };
        let mut rest = nibbles;
        loop {
            let node = materialize(current, store)?;
            if rest.is_empty() {
                return Ok(Some(node));
            }
            let is_match = match &*node {
                Node::Leaf(leaf) => {
                    if leaf.suffix.starts_with(rest) {
                        true
                    } else {
                        return Ok(None);
                    }
                }
                Node::Branch(branch) => {
                    if rest.len() <= branch.prefix().len() {
                        if branch.prefix().starts_with(rest) {
                            true
                        } else {
                            return Ok(None);
                        }
                    } else if !rest.starts_with(branch.prefix()) {
                        return Ok(None);
                    } else {
                        false
                    }
                }
            };
            if is_match {
                return Ok(Some(node));
            }
            let Node::Branch(branch) = node else {
                unreachable!("only branches descend")
            };
            let plen = branch.prefix().len();
            match branch.children[rest[plen] as usize].as_mut() {
                None => return Ok(None),
                Some(child) => {
                    current = child;
                    rest = &rest[plen + 1..];
                }
            }
        }
    }

    fn commit(&mut self, mut batch: Batch, op: &'static str) -> Result<(), TrieError<S::Error>> {
        let root = self.root();
        batch.put_root(&root);
        debug!(%root, size = self.size, ops = batch.len(), "{op} committed");
        self.store.commit(batch).map_err(TrieError::Store)
    }
}

/// Read the persisted root entry and materialize the root node far enough
/// to recover the pair count.
fn read_root<S: Store>(store: &S) -> Result<(Option<NodeRef>, usize), TrieError<S::Error>> {
    let Some(bytes) = store.get(ROOT_KEY).map_err(TrieError::Store)? else {
        return Ok((None, 0));
    };
    let hash: Hash = std::str::from_utf8(&bytes)
        .ok()
        .and_then(|hex| hex.parse().ok())
        .ok_or(TrieError::CorruptedRoot)?;
    if hash == NULL_HASH {
        return Ok((None, 0));
    }
    let mut root = NodeRef::Hash(hash);
    let size = materialize(&mut root, store)?.size();
    Ok((Some(root), size))
}

fn insert_into<S: Store>(
    slot: &mut Option<NodeRef>,
    store: &S,
    nibs: &[u8],
    cursor: usize,
    key: &[u8],
    value: &[u8],
    batch: &mut Batch,
) -> Result<(), TrieError<S::Error>> {
    let Some(reference) = slot.as_mut() else {
        // An empty slot takes the new pair directly, carrying the whole
        // remaining path as its suffix.
        let leaf = Leaf::new(nibs[cursor..].to_vec(), key.to_vec(), value.to_vec());
        batch.put_node(&leaf.hash(), Node::Leaf(leaf.clone()).to_payload());
        *slot = Some(NodeRef::Node(Box::new(Node::Leaf(leaf))));
        return Ok(());
    };
    let node = materialize(reference, store)?;
    let old_hash = node.hash();
    let rest = &nibs[cursor..];
    match node {
        Node::Leaf(leaf) => {
            if leaf.key == key {
                return Err(TrieError::AlreadyPresent);
            }
            // The leaf forks: both pairs move below a new branch whose
            // prefix is their common path segment.
            let shared = common_prefix(&leaf.suffix, rest);
            debug_assert!(shared < leaf.suffix.len(), "distinct keys share a path");
            let their_nib = leaf.suffix[shared];
            let my_nib = rest[shared];
            let moved = Leaf::new(
                leaf.suffix[shared + 1..].to_vec(),
                leaf.key.clone(),
                leaf.value.clone(),
            );
            let mine = Leaf::new(rest[shared + 1..].to_vec(), key.to_vec(), value.to_vec());

            batch.del_node(&old_hash);
            batch.put_node(&moved.hash(), Node::Leaf(moved.clone()).to_payload());
            batch.put_node(&mine.hash(), Node::Leaf(mine.clone()).to_payload());

            let mut children: [Option<NodeRef>; RADIX] = Default::default();
            children[their_nib as usize] = Some(NodeRef::Node(Box::new(Node::Leaf(moved))));
            children[my_nib as usize] = Some(NodeRef::Node(Box::new(Node::Leaf(mine))));
            let branch = Branch::new(rest[..shared].to_vec(), children, 2);
            batch.put_node(&branch.hash(), Node::Branch(branch.clone()).to_payload());
            *node = Node::Branch(branch);
            Ok(())
        }
        Node::Branch(branch) => {
            let shared = common_prefix(&branch.prefix, rest);
            if shared < branch.prefix.len() {
                // The new path diverges inside this branch's prefix: split
                // it, demoting the branch below a shorter one.
                let their_nib = branch.prefix[shared];
                let my_nib = rest[shared];
                let sub_prefix = branch.prefix[shared + 1..].to_vec();
                let sub_children = std::mem::take(&mut branch.children);
                let sub_size = branch.size;
                let top_prefix = rest[..shared].to_vec();

                let sub = Branch::new(sub_prefix, sub_children, sub_size);
                let mine = Leaf::new(rest[shared + 1..].to_vec(), key.to_vec(), value.to_vec());

                batch.del_node(&old_hash);
                batch.put_node(&sub.hash(), Node::Branch(sub.clone()).to_payload());
                batch.put_node(&mine.hash(), Node::Leaf(mine.clone()).to_payload());

                let mut children: [Option<NodeRef>; RADIX] = Default::default();
                children[their_nib as usize] = Some(NodeRef::Node(Box::new(Node::Branch(sub))));
                children[my_nib as usize] = Some(NodeRef::Node(Box::new(Node::Leaf(mine))));
                let top = Branch::new(top_prefix, children, sub_size + 1);
                batch.put_node(&top.hash(), Node::Branch(top.clone()).to_payload());
                *node = Node::Branch(top);
                Ok(())
            } else {
                // Route into the child slot after the prefix.
                let nib = rest[shared] as usize;
                insert_into(
                    &mut branch.children[nib],
                    store,
                    nibs,
                    cursor + shared + 1,
                    key,
                    value,
                    batch,
                )?;
                batch.del_node(&old_hash);
                branch.size += 1;
                branch.recompute_hash();
                batch.put_node(&branch.hash(), Node::Branch(branch.clone()).to_payload());
                Ok(())
            }
        }
    }
}

fn delete_from<S: Store>(
    slot: &mut Option<NodeRef>,
    store: &S,
    nibs: &[u8],
    cursor: usize,
    key: &[u8],
    batch: &mut Batch,
) -> Result<(), TrieError<S::Error>> {
    {
        let reference = slot.as_mut().ok_or(TrieError::NotPresent)?;
        let node = materialize(reference, store)?;
        let old_hash = node.hash();
        if let Node::Branch(branch) = node {
            let rest = &nibs[cursor..];
            if !rest.starts_with(&branch.prefix) {
                return Err(TrieError::NotPresent);
            }
            let plen = branch.prefix.len();
            let nib = rest[plen] as usize;
            delete_from(
                &mut branch.children[nib],
                store,
                nibs,
                cursor + plen + 1,
                key,
                batch,
            )?;
            batch.del_node(&old_hash);
            branch.size -= 1;

            let remaining: Vec<usize> = branch
                .children
                .iter()
                .enumerate()
                .filter_map(|(i, child)| child.is_some().then_some(i))
                .collect();
            if remaining.len() == 1 {
                // A single-child branch is not canonical: merge its prefix
                // and routing nibble into the surviving child.
                let last = remaining[0];
                let mut child_ref = branch.children[last].take().expect("slot is populated");
                materialize(&mut child_ref, store)?;
                let child = match child_ref {
                    NodeRef::Node(inner) => *inner,
                    NodeRef::Hash(_) => unreachable!("just materialized"),
                };
                batch.del_node(&child.hash());

                let mut merged = std::mem::take(&mut branch.prefix);
                merged.push(last as u8);
                let replacement = match child {
                    Node::Leaf(mut leaf) => {
                        merged.extend_from_slice(&leaf.suffix);
                        leaf.suffix = merged;
                        leaf.rehash();
                        batch.put_node(&leaf.hash(), Node::Leaf(leaf.clone()).to_payload());
                        Node::Leaf(leaf)
                    }
                    Node::Branch(mut sub) => {
                        merged.extend_from_slice(&sub.prefix);
                        sub.prefix = merged;
                        sub.recompute_hash();
                        batch.put_node(&sub.hash(), Node::Branch(sub.clone()).to_payload());
                        Node::Branch(sub)
                    }
                };
                *node = replacement;
            } else {
                branch.recompute_hash();
                batch.put_node(&branch.hash(), Node::Branch(branch.clone()).to_payload());
            }
            return Ok(());
        }

        let Node::Leaf(leaf) = node else {
            unreachable!("branches are handled above")
        };
        if leaf.key != key {
            return Err(TrieError::NotPresent);
        }
        batch.del_node(&old_hash);
    }
    *slot = None;
    Ok(())
}

impl<S: Store> fmt::Display for Trie<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "#{} ({} items)", abbrev(&self.root()), self.size)?;
        if let Some(root) = &self.root {
            fmt_ref(f, root, "")?;
        }
        Ok(())
    }
}

fn abbrev(hash: &Hash) -> String {
    hash.to_hex()[..10].to_string()
}

fn fmt_ref(f: &mut fmt::Formatter<'_>, reference: &NodeRef, indent: &str) -> fmt::Result {
    match reference {
        NodeRef::Hash(hash) => writeln!(f, "{indent}#{}..", abbrev(hash)),
        NodeRef::Node(node) => fmt_node(f, node, indent),
    }
}

fn fmt_node(f: &mut fmt::Formatter<'_>, node: &Node, indent: &str) -> fmt::Result {
    match node {
        Node::Leaf(leaf) => writeln!(
            f,
            "{indent}{} #{} {{ {} }}",
            path::to_hex(&leaf.suffix),
            abbrev(&leaf.hash()),
            String::from_utf8_lossy(&leaf.key),
        ),
        Node::Branch(branch) => {
            if !branch.prefix().is_empty() {
                writeln!(f, "{indent}[{}]", path::to_hex(branch.prefix()))?;
            }
            let populated: Vec<u8> = branch.populated().collect();
            for (i, nib) in populated.iter().enumerate() {
                let last = i + 1 == populated.len();
                let bar = if last { "╰─" } else { "├─" };
                let child = branch.children[*nib as usize]
                    .as_ref()
                    .expect("slot is populated");
                write!(f, "{indent} {bar} {nib:x} ")?;
                match child {
                    NodeRef::Hash(hash) => writeln!(f, "#{}..", abbrev(hash))?,
                    NodeRef::Node(node) => {
                        writeln!(f, "#{}", abbrev(&node.hash()))?;
                        let next = format!("{indent}{}", if last { "    " } else { " │  " });
                        fmt_node(f, node, &next)?;
                    }
                }
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_trie_has_the_null_root() {
        let trie = Trie::new();
        assert_eq!(trie.root(), NULL_HASH);
        assert!(trie.is_empty());
        assert_eq!(trie.size(), 0);
    }

    #[test]
    fn insert_then_get_round_trips() {
        let mut trie = Trie::new();
        trie.insert(b"foo", b"14").unwrap();
        trie.insert(b"bar", b"42").unwrap();
        assert_eq!(trie.size(), 2);
        assert_eq!(trie.get(b"foo").unwrap(), Some(&b"14"[..]));
        assert_eq!(trie.get(b"bar").unwrap(), Some(&b"42"[..]));
        assert_eq!(trie.get(b"baz").unwrap(), None);
    }

    #[test]
    fn duplicate_inserts_are_rejected_and_harmless() {
        let mut trie = Trie::new();
        trie.insert(b"foo", b"14").unwrap();
        let root = trie.root();
        assert!(matches!(
            trie.insert(b"foo", b"15"),
            Err(TrieError::AlreadyPresent)
        ));
        assert_eq!(trie.root(), root);
        assert_eq!(trie.size(), 1);
    }

    #[test]
    fn deleting_a_missing_key_is_rejected() {
        let mut trie = Trie::new();
        trie.insert(b"foo", b"14").unwrap();
        assert!(matches!(trie.delete(b"bar"), Err(TrieError::NotPresent)));
        assert_eq!(trie.size(), 1);
    }

    #[test]
    fn insert_then_delete_restores_the_previous_root() {
        let mut trie = Trie::new();
        trie.insert(b"foo", b"14").unwrap();
        trie.insert(b"bar", b"42").unwrap();
        let root = trie.root();

        trie.insert(b"baz", b"27").unwrap();
        assert_ne!(trie.root(), root);

        trie.delete(b"baz").unwrap();
        assert_eq!(trie.root(), root);
        assert_eq!(trie.size(), 2);
    }

    #[test]
    fn roots_are_insertion_order_independent() {
        let pairs: Vec<(&[u8], &[u8])> = vec![
            (b"apple", b"1"),
            (b"banana", b"2"),
            (b"cherry", b"3"),
            (b"date", b"4"),
            (b"elderberry", b"5"),
        ];
        let forward = Trie::from_list(pairs.clone()).unwrap();
        let mut reversed = pairs.clone();
        reversed.reverse();
        let backward = Trie::from_list(reversed).unwrap();
        assert_eq!(forward.root(), backward.root());

        // Deleting back down to one element matches the direct build.
        let mut pruned = Trie::from_list(pairs.clone()).unwrap();
        for (key, _) in &pairs[1..] {
            pruned.delete(key).unwrap();
        }
        let direct = Trie::from_list(vec![pairs[0]]).unwrap();
        assert_eq!(pruned.root(), direct.root());
    }

    #[test]
    fn load_recovers_content_from_the_store() {
        let mut trie = Trie::new();
        trie.insert(b"foo", b"14").unwrap();
        trie.insert(b"bar", b"42").unwrap();
        trie.insert(b"baz", b"27").unwrap();
        let root = trie.root();
        let store = trie.store().clone();

        let mut reloaded = Trie::load(store).unwrap();
        assert_eq!(reloaded.root(), root);
        assert_eq!(reloaded.size(), 3);
        assert_eq!(reloaded.get(b"baz").unwrap(), Some(&b"27"[..]));

        reloaded.delete(b"foo").unwrap();
        assert_eq!(reloaded.get(b"foo").unwrap(), None);
        assert_eq!(reloaded.get(b"bar").unwrap(), Some(&b"42"[..]));
    }

    #[test]
    fn deleting_to_empty_persists_the_null_root() {
        let mut trie = Trie::new();
        trie.insert(b"foo", b"14").unwrap();
        trie.delete(b"foo").unwrap();
        assert_eq!(trie.root(), NULL_HASH);
        assert_eq!(
            trie.store().get(ROOT_KEY).unwrap(),
            Some(NULL_HASH.to_hex().into_bytes())
        );

        let reloaded = Trie::load(trie.store().clone()).unwrap();
        assert!(reloaded.is_empty());
    }

    #[test]
    fn reload_reanchors_on_the_persisted_root() {
        let mut trie = Trie::new();
        trie.insert(b"foo", b"14").unwrap();
        trie.insert(b"bar", b"42").unwrap();
        let root = trie.root();

        trie.reload().unwrap();
        assert_eq!(trie.root(), root);
        assert_eq!(trie.size(), 2);
        assert_eq!(trie.get(b"foo").unwrap(), Some(&b"14"[..]));
    }

    #[test]
    fn child_at_resolves_prefixes() {
        let mut trie = Trie::new();
        trie.insert(b"foo", b"14").unwrap();
        let nibs = path_nibbles(&to_path(b"foo"));

        // The empty path resolves to the root leaf.
        assert!(matches!(
            trie.child_at(&[]).unwrap(),
            Some(Node::Leaf(leaf)) if leaf.key() == b"foo" && leaf.value() == b"14"
        ));
        // Any prefix of the suffix resolves to the same leaf.
        assert!(trie.child_at(&nibs[..7]).unwrap().is_some());
        // A diverging path does not.
        let mut wrong = nibs[..7].to_vec();
        wrong[6] = (wrong[6] + 1) % 16;
        assert!(trie.child_at(&wrong).unwrap().is_none());
    }

    #[test]
    fn display_renders_without_panicking() {
        let mut trie = Trie::new();
        trie.insert(b"foo", b"14").unwrap();
        trie.insert(b"bar", b"42").unwrap();
        let rendered = format!("{trie}");
        assert!(rendered.contains("(2 items)"));
    }
}
