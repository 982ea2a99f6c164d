//! Core data structures for a full-text search engine's term index: an
//! adaptive radix tree over posting lists, a fixed-depth numeric range
//! trie, frame-of-reference-compressed sorted integer sets, a k-way
//! or-iterator for fanning queries across terms, and the synonym/curation
//! rule engine that sits above them.
//!
//! ```text
//! ┌─────────────────────────── RULE ENGINE ───────────────────────────┐
//! │  rules::synonym::SynonymIndex     rules::curation::CurationIndex  │
//! │  rules::manager::{SynonymIndexManager, CurationIndexManager}      │
//! └───────────────────────────────┬────────────────────────────────────┘
//!                                 │ ArtTree lookups, KvStore persistence
//! ┌───────────────────────────────┴────────────────────────────────────┐
//! │  art::ArtTree (term → Posting)   or_iterator (k-way union/isect)   │
//! │  numeric_trie::NumericRangeTrie  sorted_array::SortedIntArray      │
//! │  tokenize::Tokenizer              filter_ast (curation filter-by)  │
//! └───────────────────────────────┬────────────────────────────────────┘
//!                                 │
//! ┌───────────────────────────────┴────────────────────────────────────┐
//! │  compression::for_codec            core::{config, error, types}    │
//! │  kv_store::KvStore (external persistence collaborator)             │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```

pub mod art;
pub mod compression;
pub mod core;
pub mod filter_ast;
pub mod kv_store;
pub mod numeric_trie;
pub mod or_iterator;
pub mod rules;
pub mod sorted_array;
pub mod tokenize;

pub use art::ArtTree;
pub use core::error::{Error, ErrorKind, Result};
pub use kv_store::KvStore;
pub use numeric_trie::NumericRangeTrie;
pub use or_iterator::intersect;
pub use rules::{CurationIndex, SynonymIndex};
pub use sorted_array::SortedIntArray;
