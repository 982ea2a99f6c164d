//! Fixed-depth byte-branching trie over signed integers, keyed most
//! significant byte first, with id aggregates cached at every node so a
//! whole matching subtree can be picked up without descending further.
//! Grounded on `original_source/include/numeric_range_trie_test.h`; the
//! per-byte child-array idiom is shared with `art::node::Node256`.

use std::collections::HashMap;

use crate::sorted_array::SortedIntArray;

/// Integer types a numeric range trie can be keyed by. `to_be_bytes_vec`
/// is the two's-complement big-endian decomposition — Rust's own integer
/// types already store negatives in two's complement, so the same byte
/// decomposition function routes correctly into whichever of the two
/// subtrees (negative/non-negative) the sign selects, and *within* a
/// subtree two's complement big-endian bytes already sort the same way
/// the values do — no additional bit inversion is needed, unlike a naive
/// sign-magnitude encoding would require.
pub trait TrieKey: Copy + Ord + std::fmt::Debug {
    const DEPTH: usize;
    const MIN: Self;
    const MAX: Self;
    const ZERO: Self;

    fn is_negative(self) -> bool;
    fn to_be_bytes_vec(self) -> Vec<u8>;
}

impl TrieKey for i32 {
    const DEPTH: usize = 4;
    const MIN: Self = i32::MIN;
    const MAX: Self = i32::MAX;
    const ZERO: Self = 0;

    fn is_negative(self) -> bool {
        self < 0
    }

    fn to_be_bytes_vec(self) -> Vec<u8> {
        self.to_be_bytes().to_vec()
    }
}

impl TrieKey for i64 {
    const DEPTH: usize = 8;
    const MIN: Self = i64::MIN;
    const MAX: Self = i64::MAX;
    const ZERO: Self = 0;

    fn is_negative(self) -> bool {
        self < 0
    }

    fn to_be_bytes_vec(self) -> Vec<u8> {
        self.to_be_bytes().to_vec()
    }
}

#[derive(Debug, Default)]
struct TrieNode {
    children: HashMap<u8, Box<TrieNode>>,
    /// Union of every id inserted anywhere under this subtree.
    ids: SortedIntArray,
}

impl TrieNode {
    fn add_id(&mut self, id: u32) {
        if !self.ids.contains(id) {
            let pos = self.ids.as_slice().partition_point(|&x| x < id);
            self.ids.insert(pos, id);
        }
    }

    /// Collects ids for the half-open/closed range `[lo, hi]` described by
    /// byte sequences `lo_bytes`/`hi_bytes`, tracking whether this call is
    /// still pinned to the lower and/or upper boundary. Maintains the
    /// three-phase descent: "at lower boundary", "at upper boundary",
    /// "strictly between" (the latter short-circuits by taking the whole
    /// subtree aggregate without recursing further).
    fn collect_range(
        &self,
        depth: usize,
        lo_bytes: &[u8],
        hi_bytes: &[u8],
        lo_active: bool,
        hi_active: bool,
        lo_inclusive: bool,
        hi_inclusive: bool,
        out: &mut Vec<u32>,
    ) {
        if depth == lo_bytes.len() {
            let lo_ok = !lo_active || lo_inclusive;
            let hi_ok = !hi_active || hi_inclusive;
            if lo_ok && hi_ok {
                out.extend_from_slice(self.ids.as_slice());
            }
            return;
        }

        let lo_byte = lo_bytes[depth];
        let hi_byte = hi_bytes[depth];

        for (&byte, child) in &self.children {
            if lo_active && byte < lo_byte {
                continue;
            }
            if hi_active && byte > hi_byte {
                continue;
            }
            let child_lo_active = lo_active && byte == lo_byte;
            let child_hi_active = hi_active && byte == hi_byte;
            if !child_lo_active && !child_hi_active {
                out.extend_from_slice(child.ids.as_slice());
            } else {
                child.collect_range(
                    depth + 1,
                    lo_bytes,
                    hi_bytes,
                    child_lo_active,
                    child_hi_active,
                    lo_inclusive,
                    hi_inclusive,
                    out,
                );
            }
        }
    }
}

pub struct NumericRangeTrie<K: TrieKey> {
    positive: TrieNode,
    negative: TrieNode,
    _marker: std::marker::PhantomData<K>,
}

impl<K: TrieKey> Default for NumericRangeTrie<K> {
    fn default() -> Self {
        NumericRangeTrie {
            positive: TrieNode::default(),
            negative: TrieNode::default(),
            _marker: std::marker::PhantomData,
        }
    }
}

fn dedup_sorted(mut ids: Vec<u32>) -> Vec<u32> {
    ids.sort_unstable();
    ids.dedup();
    ids
}

impl<K: TrieKey> NumericRangeTrie<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, value: K, id: u32) {
        let bytes = value.to_be_bytes_vec();
        let root = if value.is_negative() { &mut self.negative } else { &mut self.positive };
        root.add_id(id);
        let mut node = root;
        for &byte in &bytes {
            node = node.children.entry(byte).or_insert_with(|| Box::new(TrieNode::default()));
            node.add_id(id);
        }
    }

    pub fn search_equal_to(&self, value: K) -> Vec<u32> {
        let bytes = value.to_be_bytes_vec();
        let mut node = if value.is_negative() { &self.negative } else { &self.positive };
        for &byte in &bytes {
            match node.children.get(&byte) {
                Some(child) => node = child,
                None => return Vec::new(),
            }
        }
        node.ids.as_slice().to_vec()
    }

    fn search_range_single_tree(
        tree: &TrieNode,
        lo: K,
        lo_inclusive: bool,
        hi: K,
        hi_inclusive: bool,
    ) -> Vec<u32> {
        let lo_bytes = lo.to_be_bytes_vec();
        let hi_bytes = hi.to_be_bytes_vec();
        let mut out = Vec::new();
        tree.collect_range(0, &lo_bytes, &hi_bytes, true, true, lo_inclusive, hi_inclusive, &mut out);
        out
    }

    /// `search_range(lo, true, hi, true) == { id : exists v in [lo,hi] }`.
    /// Splits at zero for cross-sign ranges since positive/negative
    /// values live in separate subtrees.
    pub fn search_range(&self, lo: K, lo_inclusive: bool, hi: K, hi_inclusive: bool) -> Vec<u32> {
        if lo > hi {
            return Vec::new();
        }
        let mut out = Vec::new();
        if hi.is_negative() {
            out.extend(Self::search_range_single_tree(&self.negative, lo, lo_inclusive, hi, hi_inclusive));
        } else if !lo.is_negative() {
            out.extend(Self::search_range_single_tree(&self.positive, lo, lo_inclusive, hi, hi_inclusive));
        } else {
            // lo is negative, hi is non-negative: split at zero.
            out.extend(self.search_less_than_zero_inclusive(lo, lo_inclusive));
            out.extend(Self::search_range_single_tree(&self.positive, K::ZERO, true, hi, hi_inclusive));
        }
        dedup_sorted(out)
    }

    fn search_less_than_zero_inclusive(&self, lo: K, lo_inclusive: bool) -> Vec<u32> {
        // Every negative value is <= -1, i.e. strictly less than the
        // positive tree's minimum; take the whole bounded-below negative
        // range [lo, -1].
        let mut out = Vec::new();
        let lo_bytes = lo.to_be_bytes_vec();
        let hi_bytes = vec![0xFFu8; K::DEPTH];
        self.negative.collect_range(0, &lo_bytes, &hi_bytes, true, false, lo_inclusive, true, &mut out);
        out
    }

    pub fn search_less_than(&self, value: K, inclusive: bool) -> Vec<u32> {
        self.search_range(K::MIN, true, value, inclusive)
    }

    pub fn search_greater_than(&self, value: K, inclusive: bool) -> Vec<u32> {
        self.search_range(value, inclusive, K::MAX, true)
    }
}
