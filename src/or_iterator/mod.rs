//! K-way union over posting iterators, intersected with a filter-id
//! stream and an excluded-id set, per
//! `original_source/include/or_iterator.h`. The k==1/k==2/k>=3 split in
//! `intersect` mirrors the original's control flow rather than folding
//! into one generic loop — the original treats them as distinct
//! algorithms (different advance helpers), and so does this.

use crate::core::config::SearchBudget;

/// Unifies the original's two iterator shapes under one enum rather than
/// a null-pointer sentinel convention: a cursor over an
/// already-sorted id slice (the common case — ART/numeric-trie postings),
/// or an opaque caller-supplied iterator for anything else (e.g. a
/// synthetic filter result).
pub enum PostingSource<'a> {
    Sorted { ids: &'a [u32], cursor: usize },
    Opaque(Box<dyn PostingIterator + 'a>),
}

/// The contract an opaque posting source must satisfy; also what
/// `PostingSource::Sorted` is driven through internally.
pub trait PostingIterator {
    fn valid(&self) -> bool;
    fn id(&self) -> u32;
    fn next(&mut self);
    fn skip_to(&mut self, target: u32);
}

impl<'a> PostingSource<'a> {
    pub fn from_sorted(ids: &'a [u32]) -> Self {
        PostingSource::Sorted { ids, cursor: 0 }
    }

    pub fn from_iterator(iter: impl PostingIterator + 'a) -> Self {
        PostingSource::Opaque(Box::new(iter))
    }
}

impl PostingIterator for PostingSource<'_> {
    fn valid(&self) -> bool {
        match self {
            PostingSource::Sorted { ids, cursor } => *cursor < ids.len(),
            PostingSource::Opaque(iter) => iter.valid(),
        }
    }

    fn id(&self) -> u32 {
        match self {
            PostingSource::Sorted { ids, cursor } => ids[*cursor],
            PostingSource::Opaque(iter) => iter.id(),
        }
    }

    fn next(&mut self) {
        match self {
            PostingSource::Sorted { cursor, .. } => *cursor += 1,
            PostingSource::Opaque(iter) => iter.next(),
        }
    }

    fn skip_to(&mut self, target: u32) {
        match self {
            PostingSource::Sorted { ids, cursor } => {
                while *cursor < ids.len() && ids[*cursor] < target {
                    *cursor += 1;
                }
            }
            PostingSource::Opaque(iter) => iter.skip_to(target),
        }
    }
}

/// Optional reference-filter payload transferred into the visitor on
/// accept: the `take_id` policy transfers any attached reference-filter
/// payload into the visitor's single-filter-result slot.
pub trait ReferenceFilter {
    fn valid(&mut self, id: u32) -> Option<i64>;
}

/// Caller-supplied intersection context: a sorted filter-id array (with
/// its own advancing cursor) or an opaque reference-filter predicate, plus
/// a sorted excluded-ids array.
pub enum FilterState<'a> {
    None,
    Ids { ids: &'a [u32], cursor: usize },
    Reference(Box<dyn ReferenceFilter + 'a>),
}

impl<'a> FilterState<'a> {
    pub fn from_ids(ids: &'a [u32]) -> Self {
        FilterState::Ids { ids, cursor: 0 }
    }
}

/// `take_id`'s verdict for one candidate id: accepted (possibly carrying
/// a reference-filter payload) or rejected.
pub struct TakeResult {
    pub accepted: bool,
    pub filter_result: Option<i64>,
}

/// The `take_id` admission policy: excluded ids reject first; then a
/// sorted filter-id array or an opaque reference filter; with neither
/// configured, every id is accepted.
fn take_id(id: u32, excluded: &[u32], filter: &mut FilterState) -> TakeResult {
    if excluded.binary_search(&id).is_ok() {
        return TakeResult { accepted: false, filter_result: None };
    }
    match filter {
        FilterState::None => TakeResult { accepted: true, filter_result: None },
        FilterState::Ids { ids, cursor } => {
            while *cursor < ids.len() && ids[*cursor] < id {
                *cursor += 1;
            }
            let accepted = *cursor < ids.len() && ids[*cursor] == id;
            TakeResult { accepted, filter_result: None }
        }
        FilterState::Reference(reference) => match reference.valid(id) {
            Some(payload) => TakeResult { accepted: true, filter_result: Some(payload) },
            None => TakeResult { accepted: false, filter_result: None },
        },
    }
}

/// One accepted id plus whatever payload `take_id` attached to it.
pub struct Emitted {
    pub id: u32,
    pub filter_result: Option<i64>,
}

pub struct IntersectOutcome {
    pub cutoff: bool,
}

/// Drives `iters` forward in lockstep, invoking `visit` for every id that
/// is current in at least one iterator, not excluded, and accepted by
/// `filter`. Returns once every iterator is exhausted or the budget trips.
pub fn intersect(
    mut iters: Vec<PostingSource>,
    excluded: &[u32],
    mut filter: FilterState,
    budget: &mut SearchBudget,
    mut visit: impl FnMut(Emitted),
) -> IntersectOutcome {
    iters.retain(|it| it.valid());
    let outcome = match iters.len() {
        0 => IntersectOutcome { cutoff: false },
        1 => intersect_one(&mut iters[0], excluded, &mut filter, budget, &mut visit),
        2 => intersect_two(&mut iters, excluded, &mut filter, budget, &mut visit),
        _ => intersect_many(&mut iters, excluded, &mut filter, budget, &mut visit),
    };
    if outcome.cutoff {
        tracing::debug!(iterators = iters.len(), "or-iterator intersection cut off before exhausting all postings");
    }
    outcome
}

fn emit_or_advance(
    iter: &mut PostingSource,
    excluded: &[u32],
    filter: &mut FilterState,
    visit: &mut impl FnMut(Emitted),
) {
    let id = iter.id();
    let result = take_id(id, excluded, filter);
    if result.accepted {
        visit(Emitted { id, filter_result: result.filter_result });
    }
    iter.next();
}

/// `k == 1`: sequentially walk the sole iterator, skipping to the
/// filter's current id whenever one is available rather than visiting
/// every id the filter will reject anyway.
fn intersect_one(
    iter: &mut PostingSource,
    excluded: &[u32],
    filter: &mut FilterState,
    budget: &mut SearchBudget,
    visit: &mut impl FnMut(Emitted),
) -> IntersectOutcome {
    while iter.valid() {
        if budget.tick() {
            return IntersectOutcome { cutoff: true };
        }
        if let FilterState::Ids { ids, cursor } = filter {
            while *cursor < ids.len() && ids[*cursor] < iter.id() {
                *cursor += 1;
            }
            if *cursor < ids.len() {
                iter.skip_to(ids[*cursor]);
                if !iter.valid() {
                    break;
                }
            }
        }
        emit_or_advance(iter, excluded, filter, visit);
    }
    IntersectOutcome { cutoff: false }
}

/// `k == 2`: standard two-way merge — the iterator sitting on the smaller
/// id skips to the other's id; when both equal, emit and advance both.
fn intersect_two(
    iters: &mut [PostingSource],
    excluded: &[u32],
    filter: &mut FilterState,
    budget: &mut SearchBudget,
    visit: &mut impl FnMut(Emitted),
) -> IntersectOutcome {
    while iters[0].valid() && iters[1].valid() {
        if budget.tick() {
            return IntersectOutcome { cutoff: true };
        }
        let (a, b) = (iters[0].id(), iters[1].id());
        match a.cmp(&b) {
            std::cmp::Ordering::Less => iters[0].skip_to(b),
            std::cmp::Ordering::Greater => iters[1].skip_to(a),
            std::cmp::Ordering::Equal => {
                let result = take_id(a, excluded, filter);
                if result.accepted {
                    visit(Emitted { id: a, filter_result: result.filter_result });
                }
                iters[0].next();
                iters[1].next();
            }
        }
    }
    IntersectOutcome { cutoff: false }
}

/// `k >= 3`: same two-phase loop as the two-way merge, but
/// `advance_non_largest` finds the maximum id across all iterators and
/// skips every other iterator forward to at least that id.
fn intersect_many(
    iters: &mut [PostingSource],
    excluded: &[u32],
    filter: &mut FilterState,
    budget: &mut SearchBudget,
    visit: &mut impl FnMut(Emitted),
) -> IntersectOutcome {
    loop {
        if budget.tick() {
            return IntersectOutcome { cutoff: true };
        }
        if iters.iter().any(|it| !it.valid()) {
            return IntersectOutcome { cutoff: false };
        }
        let max_id = iters.iter().map(|it| it.id()).max().unwrap();
        let mut all_equal = true;
        for it in iters.iter_mut() {
            if it.id() != max_id {
                it.skip_to(max_id);
                all_equal = false;
            }
        }
        if !all_equal {
            continue;
        }
        let result = take_id(max_id, excluded, filter);
        if result.accepted {
            visit(Emitted { id: max_id, filter_result: result.filter_result });
        }
        for it in iters.iter_mut() {
            it.next();
        }
    }
}
