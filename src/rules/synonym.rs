//! Synonym rules and token-stream reduction, grounded on
//! `original_source/include/synonym_index.h` /
//! `src/synonym_index.cpp`'s `SynonymIndex`/`synonym_reduction_internal`.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::art::{ArtTree, FuzzyOptions, TokenOrdering};
use crate::core::config::SearchBudget;
use crate::core::error::{Error, Result};
use crate::kv_store::{prefix_upper_bound, KvStore};

pub const COLLECTION_SYNONYM_PREFIX: &str = "$CY";

/// A one-way (`root` non-empty, `root → synonyms`) or multi-way (`root`
/// empty, every listed vector mutually equivalent) synonym rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Synonym {
    pub id: String,
    #[serde(default)]
    pub root: Vec<String>,
    pub synonyms: Vec<Vec<String>>,
    #[serde(default)]
    pub locale: String,
    #[serde(default)]
    pub symbols: Vec<char>,
}

impl Synonym {
    pub fn is_one_way(&self) -> bool {
        !self.root.is_empty()
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(Error::validation("synonym id must not be empty"));
        }
        if self.synonyms.is_empty() {
            return Err(Error::validation("synonym must list at least one synonym token vector"));
        }
        for vector in self.synonyms.iter().chain(std::iter::once(&self.root)).filter(|v| !v.is_empty()) {
            if vector.iter().any(|t| t.is_empty()) {
                return Err(Error::validation("synonym token vectors must not contain empty tokens"));
            }
        }
        Ok(())
    }

    /// The phrase keys this rule is indexed under: the root phrase for a
    /// one-way rule, or every synonym phrase for a multi-way one.
    fn indexed_forms(&self) -> Vec<String> {
        if self.is_one_way() {
            vec![self.root.join(" ")]
        } else {
            self.synonyms.iter().map(|v| v.join(" ")).collect()
        }
    }
}

fn synonym_key(collection: &str, id: &str) -> String {
    format!("{COLLECTION_SYNONYM_PREFIX}_{collection}_{id}")
}

/// A map from id to synonym entity plus a dedicated ART over each rule's
/// indexed phrase form(s), used for typo-tolerant lookup during
/// reduction. Internal ART posting ids are a dense counter, not the
/// caller-facing string id (per the original's `synonym_index` counter).
#[derive(Default)]
pub struct SynonymIndex {
    ids_index: std::collections::HashMap<String, u32>,
    next_index: u32,
    definitions: std::collections::BTreeMap<u32, Synonym>,
    art: ArtTree,
}

impl SynonymIndex {
    pub fn new() -> Self {
        SynonymIndex::default()
    }

    /// Reloads a collection's synonyms from the key-value store at
    /// startup by scanning the `$CY_<collection>_` prefix.
    pub fn load(collection: &str, kv: &dyn KvStore) -> Result<Self> {
        let mut index = SynonymIndex::new();
        let prefix = format!("{COLLECTION_SYNONYM_PREFIX}_{collection}_");
        let mut load_err = None;
        kv.scan_fill(&prefix, &mut |_key, value| {
            match serde_json::from_slice::<Synonym>(value) {
                Ok(synonym) => index.insert_in_memory(synonym),
                Err(e) => load_err = Some(Error::from(e)),
            }
            load_err.is_none()
        })?;
        if let Some(err) = load_err {
            return Err(err);
        }
        Ok(index)
    }

    fn insert_in_memory(&mut self, synonym: Synonym) {
        let idx = self.next_index;
        self.next_index += 1;
        for form in synonym.indexed_forms() {
            self.art.insert(form.as_bytes(), idx, 0, &[]);
        }
        self.ids_index.insert(synonym.id.clone(), idx);
        self.definitions.insert(idx, synonym);
    }

    pub fn get_synonym(&self, id: &str) -> Option<&Synonym> {
        self.ids_index.get(id).and_then(|idx| self.definitions.get(idx))
    }

    pub fn synonyms(&self) -> impl Iterator<Item = &Synonym> {
        self.definitions.values()
    }

    /// If `id` already exists, removes it first (matching the original's
    /// "delete existing entries so we can upsert"), then indexes `synonym`
    /// fresh and persists it under `$CY_<collection>_<id>`.
    pub fn add_synonym(&mut self, collection: &str, synonym: Synonym, kv: &dyn KvStore) -> Result<()> {
        synonym.validate()?;
        if self.ids_index.contains_key(&synonym.id) {
            self.remove_synonym(collection, &synonym.id, kv)?;
        }
        kv.insert(&synonym_key(collection, &synonym.id), serde_json::to_vec(&synonym)?)?;
        tracing::debug!(id = %synonym.id, collection, "added synonym rule");
        self.insert_in_memory(synonym);
        Ok(())
    }

    /// Deletes the persisted record and removes `id`'s internal index
    /// from every ART posting it appears in, dropping the leaf outright
    /// once a posting empties. Returns whether `id` was present.
    pub fn remove_synonym(&mut self, collection: &str, id: &str, kv: &dyn KvStore) -> Result<bool> {
        let Some(idx) = self.ids_index.remove(id) else { return Ok(false) };
        let synonym = self.definitions.remove(&idx).expect("ids_index and definitions stay in sync");
        for form in synonym.indexed_forms() {
            self.art.remove_id(form.as_bytes(), idx);
        }
        kv.remove(&synonym_key(collection, id))?;
        tracing::debug!(id, collection, "removed synonym rule");
        Ok(true)
    }

    /// Range-deletes every synonym this collection owns — used when the
    /// referencing collection itself is dropped.
    pub fn drop_collection(collection: &str, kv: &dyn KvStore) -> Result<()> {
        let prefix = format!("{COLLECTION_SYNONYM_PREFIX}_{collection}_");
        let end = prefix_upper_bound(&prefix);
        kv.delete_range(&prefix, &end)
    }

    /// Expands `tokens` through every applicable synonym rule: windows
    /// shrink from the full token count down to 1, each window's phrase
    /// is fuzzy-matched against the indexed rules,
    /// and every match's alternative vectors are spliced in and
    /// recursively re-expanded. `visited` (scoped to one top-level call)
    /// guards against reprocessing the same phrase twice, which is what
    /// keeps a rule that maps back onto itself from looping forever.
    pub fn synonym_reduction(&self, tokens: &[String], locale: &str, prefix: bool, num_typos: usize) -> Vec<Vec<String>> {
        if self.definitions.is_empty() || tokens.is_empty() {
            return Vec::new();
        }
        let mut visited = HashSet::new();
        let mut results = Vec::new();
        self.reduce(tokens, tokens.len(), 0, tokens, locale, prefix, num_typos, &mut visited, &mut results);
        results
    }

    #[allow(clippy::too_many_arguments)]
    fn reduce(
        &self,
        tokens: &[String],
        start_w: usize,
        start_s: usize,
        original: &[String],
        locale: &str,
        prefix: bool,
        num_typos: usize,
        visited: &mut HashSet<String>,
        results: &mut Vec<Vec<String>>,
    ) -> bool {
        let mut recursed = false;
        for w in (1..=start_w).rev() {
            let s_begin = if w == start_w { start_s } else { 0 };
            if w > tokens.len() {
                continue;
            }
            for s in s_begin..=(tokens.len() - w) {
                let phrase = tokens[s..s + w].join(" ");
                let opts = FuzzyOptions {
                    term: phrase.as_bytes(),
                    min_cost: 0,
                    max_cost: num_typos,
                    max_words: 10,
                    prefix,
                    ordering: TokenOrdering::Frequency,
                };
                let mut budget = SearchBudget::unbounded();
                let hit = self.art.fuzzy_search(&opts, &mut budget);
                if visited.contains(&phrase) {
                    tracing::trace!(phrase, "synonym cycle guard: phrase already visited, skipping");
                    continue;
                }
                for leaf in hit.leaves {
                    for &idx in leaf.posting.ids() {
                        let Some(def) = self.definitions.get(&idx) else { continue };
                        if !def.locale.is_empty() && def.locale != locale {
                            continue;
                        }
                        for alt in &def.synonyms {
                            let mut new_tokens = Vec::with_capacity(s + alt.len() + (tokens.len() - s - w));
                            new_tokens.extend_from_slice(&tokens[..s]);
                            new_tokens.extend_from_slice(alt);
                            new_tokens.extend_from_slice(&tokens[s + w..]);
                            visited.insert(phrase.clone());
                            recursed = true;
                            self.reduce(&new_tokens, w, s, original, locale, prefix, num_typos, visited, results);
                        }
                    }
                }
            }
        }
        if !recursed && !visited.is_empty() && tokens != original {
            results.push(tokens.to_vec());
        }
        recursed
    }
}
