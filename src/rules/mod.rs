//! The rule engine: synonym expansion and curation (pinned/hidden hits,
//! query rewriting) sit above the core index structures and persist
//! through the [`crate::kv_store::KvStore`] abstraction.

pub mod curation;
pub mod manager;
pub mod synonym;

pub use curation::{Curation, CurationAction, CurationIndex, CurationOutcome, CurationRule, MatchMode, QueryContext};
pub use synonym::{Synonym, SynonymIndex};
