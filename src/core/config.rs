use std::time::{Duration, Instant};

/// Tunables for the ART node-promotion/demotion thresholds and the
/// numeric range trie's decomposition depth. Defaults mirror the
/// original's node-size thresholds exactly; callers rarely need to
/// change these.
#[derive(Debug, Clone, Copy)]
pub struct IndexConfig {
    pub max_prefix_len: usize,
    pub node4_demote_threshold: usize,
    pub node16_demote_threshold: usize,
    pub node48_demote_threshold: usize,
    pub numeric_trie_depth_32: usize,
    pub numeric_trie_depth_64: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        IndexConfig {
            max_prefix_len: 8,
            node4_demote_threshold: 3,
            node16_demote_threshold: 12,
            node48_demote_threshold: 37,
            numeric_trie_depth_32: 4,
            numeric_trie_depth_64: 8,
        }
    }
}

/// Explicit replacement for the C++ original's module-level
/// `search_begin_us`/`search_stop_us`/`search_cutoff` globals. Threaded
/// by reference through `OrIterator::intersect` and `ArtTree::
/// fuzzy_search`; the periodic 1-in-65,536 check still applies, but
/// against a local deadline instead of process-wide state.
#[derive(Debug, Clone)]
pub struct SearchBudget {
    deadline: Instant,
    pub cutoff: bool,
    processed: u64,
}

/// Every 65,536 inner-loop iterations the budget's wall clock is polled —
/// the check-in cadence for Or-Iterator intersection and ART fuzzy
/// traversal.
pub const CHECK_INTERVAL: u64 = 65_536;

impl SearchBudget {
    pub fn new(budget: Duration) -> Self {
        SearchBudget {
            deadline: Instant::now() + budget,
            cutoff: false,
            processed: 0,
        }
    }

    pub fn unbounded() -> Self {
        SearchBudget::new(Duration::from_secs(3_600 * 24 * 365))
    }

    /// Call once per processed id/node; returns true once the caller
    /// should abort (either because this call tripped the check-interval
    /// and found the deadline passed, or because an earlier call already
    /// set the cutoff flag).
    pub fn tick(&mut self) -> bool {
        if self.cutoff {
            return true;
        }
        self.processed = self.processed.wrapping_add(1);
        if self.processed % CHECK_INTERVAL == 0 && Instant::now() > self.deadline {
            self.cutoff = true;
            tracing::debug!(processed = self.processed, "search budget deadline exceeded, cutting off traversal");
        }
        self.cutoff
    }
}
