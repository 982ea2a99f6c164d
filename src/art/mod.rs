//! Adaptive radix term index: node layouts, leaves, postings, the tree
//! itself, and fuzzy (bounded edit-distance) search. Grounded on
//! `original_source/include/art.h`/`art.cpp`.

pub mod fuzzy;
pub mod leaf;
pub mod node;
pub mod posting;
pub mod tree;

pub use fuzzy::{FuzzyOptions, TokenOrdering};
pub use leaf::ArtLeaf;
pub use posting::Posting;
pub use tree::ArtTree;
