//! Bounded edit-distance search over the tree, grounded on
//! `original_source/include/art.h`'s `art_fuzzy_search`/`art_fuzzy_search_i`
//! and its incremental dynamic-programming-row traversal.
//!
//! Rather than a flat-string `levenshtein_automaton`-style DFA, the
//! Levenshtein row is advanced one tree-edge byte at a time, which is
//! what lets pruning happen mid-path-prefix instead of only at
//! whole-key boundaries.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::core::config::SearchBudget;

use super::leaf::ArtLeaf;
use super::node::NodeRef;
use super::tree::ArtTree;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenOrdering {
    Frequency,
    MaxScore,
}

pub struct FuzzyOptions<'a> {
    pub term: &'a [u8],
    pub min_cost: usize,
    pub max_cost: usize,
    pub max_words: usize,
    pub prefix: bool,
    pub ordering: TokenOrdering,
}

pub struct FuzzyResult<'a> {
    pub leaves: Vec<&'a ArtLeaf>,
    /// Set when the search budget expired before `max_words` leaves were
    /// collected — the leaves gathered so far are still returned.
    pub cutoff: bool,
}

fn advance_row(prev: &[usize], term: &[u8], byte: u8) -> Vec<usize> {
    let mut row = vec![0usize; prev.len()];
    row[0] = prev[0] + 1;
    for i in 1..prev.len() {
        let sub_cost = if term[i - 1] == byte { 0 } else { 1 };
        row[i] = (prev[i - 1] + sub_cost).min(row[i - 1] + 1).min(prev[i] + 1);
    }
    row
}

fn aggregate_key(node: &NodeRef, ordering: TokenOrdering) -> i64 {
    match ordering {
        TokenOrdering::MaxScore => node.max_score(),
        TokenOrdering::Frequency => node.max_token_count(),
    }
}

fn representative_id(node: &NodeRef) -> u32 {
    match node {
        NodeRef::Leaf(leaf) => leaf.posting.ids().first().copied().unwrap_or(u32::MAX),
        NodeRef::Internal(internal) => internal
            .iter()
            .next()
            .map(|(_, child)| representative_id(child))
            .unwrap_or(u32::MAX),
    }
}

struct Candidate<'a> {
    node: &'a NodeRef,
    key: i64,
    id: u32,
}

impl PartialEq for Candidate<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.id == other.id
    }
}
impl Eq for Candidate<'_> {}

impl PartialOrd for Candidate<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Ties broken by id, ascending — achieved by reversing the id comparison
/// so the max-heap treats the smaller id as "larger" and pops it first.
impl Ord for Candidate<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key).then_with(|| other.id.cmp(&self.id))
    }
}

/// Consumes `prefix` byte-by-byte against `term`, pruning as soon as the
/// row's minimum exceeds `max_cost`. When `stop_at` is set, consumption
/// halts the instant `depth` reaches it — bytes past that point never
/// advance the row, so a node's path can't be charged extra cost for
/// characters beyond the query's own length. Returns the advanced row and
/// the depth actually reached, or `None` if pruned partway through.
fn consume_prefix(
    row: &[usize],
    term: &[u8],
    prefix: &[u8],
    mut depth: usize,
    max_cost: usize,
    stop_at: Option<usize>,
) -> Option<(Vec<usize>, usize)> {
    let mut row = row.to_vec();
    for &b in prefix {
        if stop_at.is_some_and(|limit| depth >= limit) {
            break;
        }
        row = advance_row(&row, term, b);
        depth += 1;
        if *row.iter().min().unwrap() > max_cost {
            return None;
        }
    }
    Some((row, depth))
}

fn collect_candidates<'a>(
    node: &'a NodeRef,
    row: &[usize],
    depth: usize,
    opts: &FuzzyOptions,
    budget: &mut SearchBudget,
    heap: &mut BinaryHeap<Candidate<'a>>,
) {
    if budget.tick() {
        return;
    }
    let term_len = opts.term.len();
    match node {
        NodeRef::Leaf(leaf) => {
            let term_tail = &leaf.term()[depth.min(leaf.term().len())..];
            let Some((row, _)) = consume_prefix(row, opts.term, term_tail, depth, opts.max_cost, None) else { return };
            let cost = row[term_len];
            if cost >= opts.min_cost && cost <= opts.max_cost {
                heap.push(Candidate { node, key: aggregate_key(node, opts.ordering), id: representative_id(node) });
            }
        }
        NodeRef::Internal(internal) => {
            let stop_at = if opts.prefix { Some(term_len) } else { None };
            let Some((row, consumed_depth)) =
                consume_prefix(row, opts.term, internal.header().prefix(), depth, opts.max_cost, stop_at)
            else {
                return;
            };
            if opts.prefix && consumed_depth >= term_len {
                let cost = row[term_len];
                if cost >= opts.min_cost && cost <= opts.max_cost {
                    heap.push(Candidate { node, key: aggregate_key(node, opts.ordering), id: representative_id(node) });
                }
                return;
            }
            for (byte, child) in internal.iter() {
                let next_row = advance_row(&row, opts.term, byte);
                if *next_row.iter().min().unwrap() <= opts.max_cost {
                    collect_candidates(child, &next_row, consumed_depth + 1, opts, budget, heap);
                }
            }
        }
    }
}

/// Lazily expands the best-ranked candidate subtrees (largest aggregate
/// first) until `max_words` leaves are produced or the heap runs dry.
fn expand_top_k<'a>(
    mut heap: BinaryHeap<Candidate<'a>>,
    max_words: usize,
    ordering: TokenOrdering,
    budget: &mut SearchBudget,
) -> (Vec<&'a ArtLeaf>, bool) {
    let mut leaves = Vec::new();
    while leaves.len() < max_words {
        if budget.tick() {
            return (leaves, true);
        }
        let Some(top) = heap.pop() else { break };
        match top.node {
            NodeRef::Leaf(leaf) => leaves.push(leaf.as_ref()),
            NodeRef::Internal(internal) => {
                for (_, child) in internal.iter() {
                    heap.push(Candidate { node: child, key: aggregate_key(child, ordering), id: representative_id(child) });
                }
            }
        }
    }
    (leaves, false)
}

impl ArtTree {
    /// Returns up to `opts.max_words` leaves within `[min_cost, max_cost]`
    /// edit distance of `opts.term`, ranked by `opts.ordering`.
    pub fn fuzzy_search(&self, opts: &FuzzyOptions, budget: &mut SearchBudget) -> FuzzyResult<'_> {
        let Some(root) = self.root_ref() else {
            return FuzzyResult { leaves: Vec::new(), cutoff: false };
        };
        let initial_row: Vec<usize> = (0..=opts.term.len()).collect();
        let mut heap = BinaryHeap::new();
        collect_candidates(root, &initial_row, 0, opts, budget, &mut heap);
        let cutoff_during_collect = budget.cutoff;
        let (leaves, cutoff_during_expand) = expand_top_k(heap, opts.max_words, opts.ordering, budget);
        let cutoff = cutoff_during_collect || cutoff_during_expand;
        if cutoff {
            tracing::debug!(found = leaves.len(), term = ?String::from_utf8_lossy(opts.term), "fuzzy search cut off before max_words reached");
        }
        FuzzyResult { leaves, cutoff }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn build() -> ArtTree {
        let mut tree = ArtTree::new();
        for (term, id, score) in [("hello", 1u32, 10i64), ("help", 2, 5), ("world", 3, 20), ("word", 4, 7)] {
            tree.insert(term.as_bytes(), id, score, &[0]);
        }
        tree
    }

    #[test]
    fn exact_term_is_zero_cost_match() {
        let tree = build();
        let mut budget = SearchBudget::unbounded();
        let opts = FuzzyOptions {
            term: b"hello",
            min_cost: 0,
            max_cost: 0,
            max_words: 10,
            prefix: false,
            ordering: TokenOrdering::MaxScore,
        };
        let result = tree.fuzzy_search(&opts, &mut budget);
        assert!(!result.cutoff);
        assert_eq!(result.leaves.len(), 1);
        assert_eq!(result.leaves[0].term(), b"hello");
    }

    #[test]
    fn one_substitution_finds_help_from_hell() {
        let tree = build();
        let mut budget = SearchBudget::unbounded();
        let opts = FuzzyOptions {
            term: b"hell",
            min_cost: 0,
            max_cost: 1,
            max_words: 10,
            prefix: false,
            ordering: TokenOrdering::MaxScore,
        };
        let result = tree.fuzzy_search(&opts, &mut budget);
        let terms: Vec<&[u8]> = result.leaves.iter().map(|l| l.term()).collect();
        assert!(terms.contains(&&b"hello"[..]));
    }

    #[test]
    fn prefix_mode_matches_whole_subtree() {
        let tree = build();
        let mut budget = SearchBudget::unbounded();
        let opts = FuzzyOptions {
            term: b"wor",
            min_cost: 0,
            max_cost: 0,
            max_words: 10,
            prefix: true,
            ordering: TokenOrdering::MaxScore,
        };
        let result = tree.fuzzy_search(&opts, &mut budget);
        let mut terms: Vec<Vec<u8>> = result.leaves.iter().map(|l| l.term().to_vec()).collect();
        terms.sort();
        assert_eq!(terms, vec![b"word".to_vec(), b"world".to_vec()]);
    }

    #[test]
    fn max_words_caps_result_count() {
        let tree = build();
        let mut budget = SearchBudget::unbounded();
        let opts = FuzzyOptions {
            term: b"wor",
            min_cost: 0,
            max_cost: 2,
            max_words: 1,
            prefix: true,
            ordering: TokenOrdering::MaxScore,
        };
        let result = tree.fuzzy_search(&opts, &mut budget);
        assert_eq!(result.leaves.len(), 1);
    }

    fn build_apple_family() -> ArtTree {
        let mut tree = ArtTree::new();
        for (term, id, score) in
            [("apple", 1u32, 10i64), ("appl", 2, 5), ("apply", 3, 7), ("ape", 4, 3), ("banana", 5, 9)]
        {
            tree.insert(term.as_bytes(), id, score, &[0]);
        }
        tree
    }

    #[test]
    fn one_edit_from_appl_finds_apple_appl_and_apply() {
        let tree = build_apple_family();
        let mut budget = SearchBudget::unbounded();
        let opts = FuzzyOptions {
            term: b"appl",
            min_cost: 0,
            max_cost: 1,
            max_words: 3,
            prefix: false,
            ordering: TokenOrdering::MaxScore,
        };
        let result = tree.fuzzy_search(&opts, &mut budget);
        assert!(!result.cutoff);
        let mut terms: Vec<Vec<u8>> = result.leaves.iter().map(|l| l.term().to_vec()).collect();
        terms.sort();
        assert_eq!(terms, vec![b"appl".to_vec(), b"apple".to_vec(), b"apply".to_vec()]);
    }

    /// Regression test for the prefix-pruning bug: `"app"` is a strict
    /// prefix of every key under the shared `appl` internal node, whose
    /// compressed path extends past `term.len()`. Consuming that whole
    /// path before checking the prefix condition used to charge extra
    /// edit cost for the trailing `'l'` and wrongly prune the subtree.
    #[test]
    fn exact_prefix_matches_whole_apple_subtree_by_score() {
        let tree = build_apple_family();
        let mut budget = SearchBudget::unbounded();
        let opts = FuzzyOptions {
            term: b"app",
            min_cost: 0,
            max_cost: 0,
            max_words: 3,
            prefix: true,
            ordering: TokenOrdering::MaxScore,
        };
        let result = tree.fuzzy_search(&opts, &mut budget);
        assert!(!result.cutoff);
        let terms: Vec<Vec<u8>> = result.leaves.iter().map(|l| l.term().to_vec()).collect();
        assert_eq!(terms, vec![b"apple".to_vec(), b"apply".to_vec(), b"appl".to_vec()]);
    }

    #[test]
    fn expired_budget_reports_cutoff() {
        let tree = build();
        let mut budget = SearchBudget::new(Duration::from_nanos(1));
        std::thread::sleep(Duration::from_millis(1));
        for _ in 0..crate::core::config::CHECK_INTERVAL {
            budget.tick();
        }
        let opts = FuzzyOptions {
            term: b"hello",
            min_cost: 0,
            max_cost: 3,
            max_words: 10,
            prefix: false,
            ordering: TokenOrdering::MaxScore,
        };
        let result = tree.fuzzy_search(&opts, &mut budget);
        assert!(result.cutoff);
    }
}
