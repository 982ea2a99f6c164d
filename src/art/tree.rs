//! Adaptive radix tree over byte-string keys, grounded on
//! `original_source/include/art.h`'s `art_tree`/`art_insert`/`art_delete`/
//! `art_search`/`art_iter`/`art_iter_prefix`. Node mutation works by
//! recursive take-and-rebuild (`Option<NodeRef>` moved in, new `NodeRef`
//! moved out) rather than raw pointers.

use crate::core::config::IndexConfig;

use super::leaf::ArtLeaf;
use super::node::{InternalNode, NodeRef, MAX_PREFIX_LEN};
use super::posting::Posting;

/// Appends a `0x00` terminator so no stored key is a byte-prefix of
/// another (ordinary text tokens never contain an embedded NUL).
pub fn terminated(key: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(key.len() + 1);
    out.extend_from_slice(key);
    out.push(0);
    out
}

pub struct ArtTree {
    root: Option<NodeRef>,
    size: u64,
    config: IndexConfig,
}

impl Default for ArtTree {
    fn default() -> Self {
        ArtTree::new()
    }
}

impl ArtTree {
    pub fn new() -> Self {
        ArtTree { root: None, size: 0, config: IndexConfig::default() }
    }

    pub fn with_config(config: IndexConfig) -> Self {
        ArtTree { root: None, size: 0, config }
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub(super) fn root_ref(&self) -> Option<&NodeRef> {
        self.root.as_ref()
    }

    pub fn len(&self) -> u64 {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Inserts `id` (with `score`/`positions`) under `key`. Returns `true`
    /// if this `(key, id)` pair is newly recorded — either a brand new
    /// leaf, or a new id appended to an existing leaf's posting.
    pub fn insert(&mut self, key: &[u8], id: u32, score: i64, positions: &[u32]) -> bool {
        let tkey = terminated(key);
        let root = self.root.take();
        let mut is_new_id = false;
        let mut is_new_leaf = false;
        let new_root = Self::insert_rec(root, &tkey, 0, id, score, positions, &mut is_new_id, &mut is_new_leaf);
        self.root = Some(new_root);
        if is_new_leaf {
            self.size += 1;
        }
        is_new_id
    }

    fn insert_rec(
        node: Option<NodeRef>,
        key: &[u8],
        depth: usize,
        id: u32,
        score: i64,
        positions: &[u32],
        is_new_id: &mut bool,
        is_new_leaf: &mut bool,
    ) -> NodeRef {
        match node {
            None => {
                let mut leaf = ArtLeaf::new(key.to_vec());
                leaf.posting.upsert(id, score, positions);
                *is_new_id = true;
                *is_new_leaf = true;
                NodeRef::leaf(leaf)
            }
            Some(NodeRef::Leaf(mut leaf)) => {
                if leaf.matches(key) {
                    *is_new_id = leaf.posting.upsert(id, score, positions);
                    NodeRef::Leaf(leaf)
                } else {
                    *is_new_id = true;
                    *is_new_leaf = true;
                    let mut new_leaf = ArtLeaf::new(key.to_vec());
                    new_leaf.posting.upsert(id, score, positions);
                    split_for_two_leaves(leaf, new_leaf, key, depth)
                }
            }
            Some(NodeRef::Internal(mut internal)) => {
                let prefix_len = internal.header().prefix_len();
                let prefix = internal.header().prefix().to_vec();
                let avail = key.len() - depth;
                let match_len = prefix
                    .iter()
                    .zip(key[depth..].iter())
                    .take_while(|(a, b)| a == b)
                    .count()
                    .min(avail);

                if match_len < prefix_len {
                    // The incoming key diverges partway through this node's
                    // compressed prefix: split the node at the divergence.
                    let shared = prefix[..match_len].to_vec();
                    let old_byte = prefix[match_len];
                    let remainder = prefix[match_len + 1..].to_vec();
                    internal.header_mut().set_prefix(&remainder);

                    let mut new_leaf = ArtLeaf::new(key.to_vec());
                    new_leaf.posting.upsert(id, score, positions);
                    *is_new_id = true;
                    *is_new_leaf = true;
                    let new_byte = key[depth + match_len];
                    let (new_leaf_score, new_leaf_tc) = (new_leaf.max_score(), new_leaf.max_token_count());
                    let (old_score, old_tc) = (internal.header().max_score, internal.header().max_token_count);

                    let mut split_node = InternalNode::new4(&shared);
                    split_node = InternalNode::insert_with_promotion(split_node, old_byte, NodeRef::Internal(internal));
                    split_node.header_mut().update_aggregates(old_score, old_tc);
                    split_node = InternalNode::insert_with_promotion(split_node, new_byte, NodeRef::leaf(new_leaf));
                    split_node.header_mut().update_aggregates(new_leaf_score, new_leaf_tc);
                    NodeRef::Internal(Box::new(split_node))
                } else {
                    let new_depth = depth + prefix_len;
                    let byte = key[new_depth];
                    match internal.remove(byte) {
                        Some(child) => {
                            let new_child = Self::insert_rec(
                                Some(child),
                                key,
                                new_depth,
                                id,
                                score,
                                positions,
                                is_new_id,
                                is_new_leaf,
                            );
                            let (s, t) = (new_child.max_score(), new_child.max_token_count());
                            internal = InternalNode::insert_with_promotion(internal, byte, new_child);
                            internal.header_mut().update_aggregates(s, t);
                        }
                        None => {
                            let mut leaf = ArtLeaf::new(key.to_vec());
                            leaf.posting.upsert(id, score, positions);
                            *is_new_id = true;
                            *is_new_leaf = true;
                            let (s, t) = (leaf.max_score(), leaf.max_token_count());
                            internal = InternalNode::insert_with_promotion(internal, byte, NodeRef::leaf(leaf));
                            internal.header_mut().update_aggregates(s, t);
                        }
                    }
                    NodeRef::Internal(Box::new(internal))
                }
            }
        }
    }

    pub fn search(&self, key: &[u8]) -> Option<&ArtLeaf> {
        let tkey = terminated(key);
        let mut node = self.root.as_ref()?;
        let mut depth = 0usize;
        loop {
            match node {
                NodeRef::Leaf(leaf) => return if leaf.matches(&tkey) { Some(leaf) } else { None },
                NodeRef::Internal(internal) => {
                    let prefix = internal.header().prefix();
                    if depth + prefix.len() > tkey.len() || &tkey[depth..depth + prefix.len()] != prefix {
                        return None;
                    }
                    depth += prefix.len();
                    if depth >= tkey.len() {
                        return None;
                    }
                    node = internal.get(tkey[depth])?;
                }
            }
        }
    }

    pub fn search_mut(&mut self, key: &[u8]) -> Option<&mut ArtLeaf> {
        let tkey = terminated(key);
        let mut node = self.root.as_mut()?;
        let mut depth = 0usize;
        loop {
            match node {
                NodeRef::Leaf(leaf) => return if leaf.matches(&tkey) { Some(leaf) } else { None },
                NodeRef::Internal(internal) => {
                    let prefix_len = internal.header().prefix_len();
                    if depth + prefix_len > tkey.len() || &tkey[depth..depth + prefix_len] != internal.header().prefix() {
                        return None;
                    }
                    depth += prefix_len;
                    if depth >= tkey.len() {
                        return None;
                    }
                    node = internal.get_mut(tkey[depth])?;
                }
            }
        }
    }

    /// Removes a single `id` from the posting at `key`, deleting the leaf
    /// outright once its posting becomes empty. Returns whether `id` was
    /// present. Used by the rule engine, which tracks ART postings keyed
    /// by term/phrase but wants to drop one internal index at a time
    /// rather than the whole leaf.
    pub fn remove_id(&mut self, key: &[u8], id: u32) -> bool {
        let became_empty = match self.search_mut(key) {
            Some(leaf) => {
                if !leaf.posting.remove(id) {
                    return false;
                }
                leaf.posting.doc_freq() == 0
            }
            None => return false,
        };
        if became_empty {
            self.delete(key);
        }
        true
    }

    /// Removes the leaf for `key` if present, returning its posting.
    pub fn delete(&mut self, key: &[u8]) -> Option<Posting> {
        let tkey = terminated(key);
        let root = self.root.take()?;
        let (new_root, removed) = Self::delete_rec(root, &tkey, 0, &self.config);
        self.root = new_root;
        if removed.is_some() {
            self.size = self.size.saturating_sub(1);
        }
        removed
    }

    fn delete_rec(node: NodeRef, key: &[u8], depth: usize, config: &IndexConfig) -> (Option<NodeRef>, Option<Posting>) {
        match node {
            NodeRef::Leaf(leaf) => {
                if leaf.matches(key) {
                    (None, Some(leaf.posting))
                } else {
                    (Some(NodeRef::Leaf(leaf)), None)
                }
            }
            NodeRef::Internal(mut internal) => {
                let prefix_len = internal.header().prefix_len();
                let prefix = internal.header().prefix().to_vec();
                if depth + prefix_len > key.len() || key[depth..depth + prefix_len] != prefix[..] {
                    return (Some(NodeRef::Internal(internal)), None);
                }
                let new_depth = depth + prefix_len;
                if new_depth >= key.len() {
                    return (Some(NodeRef::Internal(internal)), None);
                }
                let byte = key[new_depth];
                let child = match internal.remove(byte) {
                    Some(child) => child,
                    None => return (Some(NodeRef::Internal(internal)), None),
                };
                let (new_child, removed) = Self::delete_rec(child, key, new_depth, config);
                if let Some(c) = new_child {
                    internal = InternalNode::insert_with_promotion(internal, byte, c);
                }
                if removed.is_none() {
                    return (Some(NodeRef::Internal(internal)), None);
                }
                if internal.num_children() == 0 {
                    return (None, removed);
                }
                recompute_aggregates(&mut internal);
                let internal = InternalNode::demote_if_underfull(internal, config);
                (Some(collapse_if_singleton(internal)), removed)
            }
        }
    }

    pub fn minimum(&self) -> Option<&ArtLeaf> {
        self.root.as_ref().map(minimum_of)
    }

    pub fn maximum(&self) -> Option<&ArtLeaf> {
        self.root.as_ref().map(maximum_of)
    }

    /// Full in-order traversal; `callback` returning `true` stops early.
    pub fn iter<F: FnMut(&ArtLeaf) -> bool>(&self, mut callback: F) {
        if let Some(root) = &self.root {
            iter_node(root, &mut callback);
        }
    }

    /// Visits every leaf whose term starts with `prefix`, in lexicographic
    /// order; `callback` returning `true` stops early.
    pub fn iter_prefix<F: FnMut(&ArtLeaf) -> bool>(&self, prefix: &[u8], mut callback: F) {
        if let Some(root) = &self.root {
            iter_prefix_node(root, prefix, 0, &mut callback);
        }
    }
}

fn minimum_of(node: &NodeRef) -> &ArtLeaf {
    match node {
        NodeRef::Leaf(leaf) => leaf,
        NodeRef::Internal(internal) => minimum_of(internal.iter().next().expect("internal node has >=1 child").1),
    }
}

fn maximum_of(node: &NodeRef) -> &ArtLeaf {
    match node {
        NodeRef::Leaf(leaf) => leaf,
        NodeRef::Internal(internal) => maximum_of(internal.iter().last().expect("internal node has >=1 child").1),
    }
}

fn iter_node<F: FnMut(&ArtLeaf) -> bool>(node: &NodeRef, callback: &mut F) -> bool {
    match node {
        NodeRef::Leaf(leaf) => callback(leaf),
        NodeRef::Internal(internal) => {
            for (_, child) in internal.iter() {
                if iter_node(child, callback) {
                    return true;
                }
            }
            false
        }
    }
}

fn iter_prefix_node<F: FnMut(&ArtLeaf) -> bool>(node: &NodeRef, prefix: &[u8], depth: usize, callback: &mut F) -> bool {
    match node {
        NodeRef::Leaf(leaf) => {
            let term = leaf.term();
            if term.len() >= prefix.len() && &term[..prefix.len()] == prefix {
                callback(leaf)
            } else {
                false
            }
        }
        NodeRef::Internal(internal) => {
            let node_prefix = internal.header().prefix();
            let remaining = &prefix[depth.min(prefix.len())..];
            let cmp_len = node_prefix.len().min(remaining.len());
            if node_prefix[..cmp_len] != remaining[..cmp_len] {
                return false;
            }
            if remaining.len() <= node_prefix.len() {
                return iter_node(node, callback);
            }
            let next_depth = depth + node_prefix.len();
            match internal.get(prefix[next_depth]) {
                Some(child) => iter_prefix_node(child, prefix, next_depth, callback),
                None => false,
            }
        }
    }
}

/// Builds the subtree for two leaves whose keys diverge only after
/// `depth`, chaining extra single-child `Node4`s when the shared run
/// exceeds `MAX_PREFIX_LEN` (see the deviation note on `NodeHeader`).
fn split_for_two_leaves(old_leaf: Box<ArtLeaf>, new_leaf: ArtLeaf, new_key: &[u8], depth: usize) -> NodeRef {
    let lcp = old_leaf.longest_common_prefix(new_key, depth);
    let chunk = lcp.min(MAX_PREFIX_LEN);
    let prefix = new_key[depth..depth + chunk].to_vec();
    let mut node = InternalNode::new4(&prefix);

    if chunk < lcp {
        let branch_byte = new_key[depth + chunk];
        let inner = split_for_two_leaves(old_leaf, new_leaf, new_key, depth + chunk);
        let (s, t) = (inner.max_score(), inner.max_token_count());
        node = InternalNode::insert_with_promotion(node, branch_byte, inner);
        node.header_mut().update_aggregates(s, t);
    } else {
        let old_byte = old_leaf.path_key()[depth + chunk];
        let new_byte = new_key[depth + chunk];
        let (old_s, old_t) = (old_leaf.max_score(), old_leaf.max_token_count());
        let (new_s, new_t) = (new_leaf.max_score(), new_leaf.max_token_count());
        node = InternalNode::insert_with_promotion(node, old_byte, NodeRef::Leaf(old_leaf));
        node.header_mut().update_aggregates(old_s, old_t);
        node = InternalNode::insert_with_promotion(node, new_byte, NodeRef::leaf(new_leaf));
        node.header_mut().update_aggregates(new_s, new_t);
    }
    NodeRef::Internal(Box::new(node))
}

/// Re-establishes `prefix` as `child`'s effective path, chaining extra
/// `Node4` wrappers when `prefix` exceeds `MAX_PREFIX_LEN`. Used when
/// collapsing a singleton `Node4` into its one remaining child.
fn wrap_with_prefix(prefix: &[u8], child: NodeRef) -> NodeRef {
    if prefix.len() <= MAX_PREFIX_LEN {
        match child {
            NodeRef::Internal(mut inner) => {
                inner.header_mut().set_prefix(prefix);
                NodeRef::Internal(inner)
            }
            leaf @ NodeRef::Leaf(_) => leaf,
        }
    } else {
        let head = &prefix[..MAX_PREFIX_LEN];
        let branch_byte = prefix[MAX_PREFIX_LEN];
        let rest = &prefix[MAX_PREFIX_LEN + 1..];
        let inner = wrap_with_prefix(rest, child);
        let (s, t) = (inner.max_score(), inner.max_token_count());
        let mut wrapper = InternalNode::new4(head);
        wrapper = InternalNode::insert_with_promotion(wrapper, branch_byte, inner);
        wrapper.header_mut().update_aggregates(s, t);
        NodeRef::Internal(Box::new(wrapper))
    }
}

/// A `Node4` left with exactly one child collapses: a lone leaf child is
/// promoted directly in its parent's place; a lone internal child
/// absorbs this node's prefix and branch byte.
fn collapse_if_singleton(internal: InternalNode) -> NodeRef {
    if let InternalNode::Node4(mut n4) = internal {
        if n4.num_children() == 1 {
            let (only_byte, _) = n4.iter().next().expect("checked num_children == 1");
            let prefix = n4.header.prefix().to_vec();
            let child = n4.remove(only_byte).expect("byte came from this node's own iterator");
            return match child {
                NodeRef::Leaf(leaf) => NodeRef::Leaf(leaf),
                NodeRef::Internal(child_internal) => {
                    let mut merged = prefix;
                    merged.push(only_byte);
                    merged.extend_from_slice(child_internal.header().prefix());
                    wrap_with_prefix(&merged, NodeRef::Internal(child_internal))
                }
            };
        }
        NodeRef::Internal(Box::new(InternalNode::Node4(n4)))
    } else {
        NodeRef::Internal(Box::new(internal))
    }
}

fn recompute_aggregates(internal: &mut InternalNode) {
    let mut max_score = 0i64;
    let mut max_token_count = 0i64;
    for (_, child) in internal.iter() {
        max_score = max_score.max(child.max_score());
        max_token_count = max_token_count.max(child.max_token_count());
    }
    let header = internal.header_mut();
    header.max_score = max_score;
    header.max_token_count = max_token_count;
}
