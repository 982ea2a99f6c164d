//! Curation (pinned/hidden hits and query rewriting) rules and rule
//! evaluation, grounded on `original_source/include/curation_index_manager.h`
//! and `src/curation_index_manager.cpp` (registry key `$OISET_<index_name>`,
//! item keys `<COLLECTION_CURATION_SET_PREFIX>_<index_name>_<id>`) plus the
//! rule/action JSON shape exercised by `test/collection_curation_test.cpp`.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::core::error::{Error, Result};
use crate::filter_ast::{self, FilterExpr};
use crate::kv_store::{prefix_upper_bound, KvStore};

pub const CURATION_INDEX_KEY: &str = "$OISET";
pub const COLLECTION_CURATION_SET_PREFIX: &str = "collection_curation_set";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    Exact,
    Contains,
}

/// The match conditions a curation rule fires on. At least one of `query`
/// or `tags` must be set (enforced by [`Curation::validate`]); `filter_by`
/// may narrow either further.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CurationRule {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default = "default_match_mode")]
    pub match_mode: MatchMode,
    #[serde(default)]
    pub filter_by: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_match_mode() -> MatchMode {
    MatchMode::Exact
}

/// What a matching rule does to the in-flight search. `includes` pins
/// `(doc_id, position)` pairs into the result list; `excludes` removes
/// doc ids outright. `replace_query` and `remove_matched_tokens` are
/// mutually exclusive — both rewrite the token stream, in incompatible
/// ways.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CurationAction {
    #[serde(default)]
    pub includes: Vec<(String, usize)>,
    #[serde(default)]
    pub excludes: Vec<String>,
    #[serde(default)]
    pub filter_by: Option<String>,
    #[serde(default)]
    pub sort_by: Option<String>,
    #[serde(default)]
    pub replace_query: Option<String>,
    #[serde(default)]
    pub remove_matched_tokens: bool,
    #[serde(default)]
    pub filter_curated_hits: bool,
    #[serde(default)]
    pub stop_processing: bool,
    #[serde(default)]
    pub metadata: serde_json::Value,
    #[serde(default)]
    pub effective_from_ts: Option<i64>,
    #[serde(default)]
    pub effective_to_ts: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Curation {
    pub id: String,
    #[serde(default)]
    pub rule: CurationRule,
    #[serde(default)]
    pub action: CurationAction,
}

impl Curation {
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(Error::validation("curation id must not be empty"));
        }
        if self.rule.query.is_none() && self.rule.tags.is_empty() {
            return Err(Error::validation("curation rule needs a query or a tag set to match on"));
        }
        if let Some(filter_by) = &self.rule.filter_by {
            filter_ast::parse(filter_by)?;
        }
        if let Some(filter_by) = &self.action.filter_by {
            filter_ast::parse(filter_by)?;
        }
        if self.action.replace_query.is_some() && self.action.remove_matched_tokens {
            return Err(Error::validation("replace_query and remove_matched_tokens are mutually exclusive"));
        }
        if let (Some(from), Some(to)) = (self.action.effective_from_ts, self.action.effective_to_ts) {
            if from > to {
                return Err(Error::validation("effective_from_ts must not be after effective_to_ts"));
            }
        }
        Ok(())
    }
}

fn curation_item_key(index_name: &str, id: &str) -> String {
    format!("{COLLECTION_CURATION_SET_PREFIX}_{index_name}_{id}")
}

fn curation_registry_key(index_name: &str) -> String {
    format!("{CURATION_INDEX_KEY}_{index_name}")
}

/// Which tag-match group a rule falls into, and therefore its evaluation
/// precedence: exact/wildcard tag matches fire before subset matches,
/// which fire before tag-less rules (checked only when the query itself
/// carries no tags).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum TagGroup {
    Exact,
    Subset,
    Untagged,
}

fn classify_tags(rule_tags: &[String], query_tags: &[String]) -> Option<TagGroup> {
    if !rule_tags.is_empty() {
        if rule_tags.iter().any(|t| t == "*") {
            return Some(TagGroup::Exact);
        }
        let rule_set: HashSet<&str> = rule_tags.iter().map(String::as_str).collect();
        let query_set: HashSet<&str> = query_tags.iter().map(String::as_str).collect();
        if rule_set == query_set {
            return Some(TagGroup::Exact);
        }
        if rule_set.is_subset(&query_set) {
            return Some(TagGroup::Subset);
        }
        return None;
    }
    if query_tags.is_empty() {
        return Some(TagGroup::Untagged);
    }
    None
}

fn placeholder_name(token: &str) -> Option<&str> {
    token.strip_prefix('{').and_then(|s| s.strip_suffix('}'))
}

type Bindings = HashMap<String, Vec<String>>;

/// Matches a whole-phrase template against `tokens`: a placeholder token
/// consumes a contiguous, non-empty run; a literal token must equal the
/// corresponding query token exactly. Backtracks over run lengths, which
/// is acceptable since rule templates are short and this isn't a
/// hot-path lookup.
fn match_exact(rule_tokens: &[String], tokens: &[String]) -> Option<Bindings> {
    fn rec(rt: &[String], qt: &[String], bindings: &mut Bindings) -> bool {
        let Some(head) = rt.first() else { return qt.is_empty() };
        if let Some(name) = placeholder_name(head) {
            for len in 1..=qt.len() {
                let run = qt[..len].to_vec();
                if bindings.get(name).is_some_and(|existing| existing != &run) {
                    continue;
                }
                let mut trial = bindings.clone();
                trial.insert(name.to_string(), run);
                if rec(&rt[1..], &qt[len..], &mut trial) {
                    *bindings = trial;
                    return true;
                }
            }
            false
        } else {
            match qt.first() {
                Some(tok) if tok.eq_ignore_ascii_case(head) => rec(&rt[1..], &qt[1..], bindings),
                _ => false,
            }
        }
    }
    let mut bindings = HashMap::new();
    rec(rule_tokens, tokens, &mut bindings).then_some(bindings)
}

/// Matches a subsequence template against `tokens`: every rule token must
/// appear, in order, with arbitrary tokens allowed in between. A
/// placeholder here binds a single token rather than a run — contains
/// mode has no natural run boundary the way exact mode does, since gaps
/// around a placeholder are themselves unconstrained.
fn match_contains(rule_tokens: &[String], tokens: &[String]) -> Option<Bindings> {
    let mut bindings = HashMap::new();
    let mut cursor = 0usize;
    for rt in rule_tokens {
        if let Some(name) = placeholder_name(rt) {
            let tok = tokens.get(cursor)?;
            if bindings.get(name).is_some_and(|existing: &Vec<String>| existing.first() != Some(tok)) {
                return None;
            }
            bindings.insert(name.to_string(), vec![tok.clone()]);
            cursor += 1;
        } else {
            let offset = tokens[cursor..].iter().position(|t| t.eq_ignore_ascii_case(rt))?;
            cursor += offset + 1;
        }
    }
    Some(bindings)
}

fn substitute(template: &str, bindings: &Bindings) -> String {
    let mut out = template.to_string();
    for (name, tokens) in bindings {
        out = out.replace(&format!("{{{name}}}"), &tokens.join(" "));
    }
    out
}

/// The query-side context a curation rule is evaluated against.
pub struct QueryContext<'a> {
    pub tokens: &'a [String],
    pub tags: &'a [String],
    pub filter_by: &'a FilterExpr,
    pub now_ts: i64,
}

/// The accumulated effect of every curation rule that matched, in
/// evaluation order. `filter_by`/`sort_by` are the last rule's override
/// if any rule set one; `metadata` merges object keys with later rules
/// winning ties.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CurationOutcome {
    pub tokens: Vec<String>,
    pub includes: Vec<(String, usize)>,
    pub excludes: Vec<String>,
    pub filter_by: Option<String>,
    pub sort_by: Option<String>,
    pub filter_curated_hits: bool,
    pub metadata: serde_json::Value,
    pub matched_ids: Vec<String>,
}

impl CurationOutcome {
    /// Splices `includes` into `base` the way a retrieved result list is
    /// reshaped around pinned slots: pins are applied in ascending
    /// position (1-based, matching the wire `position: <int ≥ 1>` field),
    /// each one either confirming the id already sits in its slot or
    /// inserting it there and pushing everything from that slot onward
    /// down by one. A pin whose id fails `satisfies_filter` when
    /// `filter_curated_hits` is set never occupies a slot at all — its
    /// closing shifts every later pin's target slot back by one, which is
    /// what lets a later pin "slide forward" into the gap instead of
    /// leaving a hole.
    ///
    /// `satisfies_filter` is supplied by the caller: this crate has no
    /// document corpus of its own, so whether a pinned id is a valid,
    /// filter-matching candidate is something only the caller's retrieval
    /// layer can answer.
    pub fn reshape(&self, base: &[String], mut satisfies_filter: impl FnMut(&str) -> bool) -> Vec<String> {
        let mut pins: Vec<&(String, usize)> = self.includes.iter().collect();
        pins.sort_by_key(|(_, position)| *position);

        let mut out = base.to_vec();
        let mut closed = 0usize;
        for (id, position) in pins {
            if self.filter_curated_hits && !satisfies_filter(id) {
                closed += 1;
                continue;
            }
            let target = position.saturating_sub(1).saturating_sub(closed).min(out.len());
            if out.get(target).map(String::as_str) != Some(id.as_str()) {
                out.insert(target, id.clone());
            }
        }
        out
    }
}

/// A map from index name to the rules it holds, persisted via `KvStore`
/// under `$OISET_<index_name>` (registry) and
/// `collection_curation_set_<index_name>_<id>` (items), per
/// `curation_index_manager.cpp`.
#[derive(Default)]
pub struct CurationIndex {
    definitions: std::collections::BTreeMap<String, Curation>,
}

impl CurationIndex {
    pub fn new() -> Self {
        CurationIndex::default()
    }

    pub fn load(index_name: &str, kv: &dyn KvStore) -> Result<Self> {
        let mut index = CurationIndex::new();
        let prefix = format!("{COLLECTION_CURATION_SET_PREFIX}_{index_name}_");
        let mut load_err = None;
        kv.scan_fill(&prefix, &mut |_key, value| {
            match serde_json::from_slice::<Curation>(value) {
                Ok(curation) => {
                    index.definitions.insert(curation.id.clone(), curation);
                }
                Err(e) => load_err = Some(Error::from(e)),
            }
            load_err.is_none()
        })?;
        if let Some(err) = load_err {
            return Err(err);
        }
        kv.insert(&curation_registry_key(index_name), Vec::new())?;
        Ok(index)
    }

    pub fn get(&self, id: &str) -> Option<&Curation> {
        self.definitions.get(id)
    }

    pub fn curations(&self) -> impl Iterator<Item = &Curation> {
        self.definitions.values()
    }

    pub fn upsert(&mut self, index_name: &str, curation: Curation, kv: &dyn KvStore) -> Result<()> {
        curation.validate()?;
        kv.insert(&curation_item_key(index_name, &curation.id), serde_json::to_vec(&curation)?)?;
        kv.insert(&curation_registry_key(index_name), Vec::new())?;
        self.definitions.insert(curation.id.clone(), curation);
        Ok(())
    }

    pub fn remove(&mut self, index_name: &str, id: &str, kv: &dyn KvStore) -> Result<bool> {
        if self.definitions.remove(id).is_none() {
            return Ok(false);
        }
        kv.remove(&curation_item_key(index_name, id))?;
        Ok(true)
    }

    pub fn drop_index(index_name: &str, kv: &dyn KvStore) -> Result<()> {
        let prefix = format!("{COLLECTION_CURATION_SET_PREFIX}_{index_name}_");
        let end = prefix_upper_bound(&prefix);
        kv.delete_range(&prefix, &end)?;
        kv.remove(&curation_registry_key(index_name))
    }

    fn rule_matches(&self, curation: &Curation, ctx: &QueryContext) -> Option<Bindings> {
        let action = &curation.action;
        if let Some(from) = action.effective_from_ts {
            if ctx.now_ts < from {
                return None;
            }
        }
        if let Some(to) = action.effective_to_ts {
            if ctx.now_ts > to {
                return None;
            }
        }
        let mut bindings = HashMap::new();
        if let Some(query) = &curation.rule.query {
            let rule_tokens: Vec<String> = query.split_whitespace().map(str::to_string).collect();
            let matched = match curation.rule.match_mode {
                MatchMode::Exact => match_exact(&rule_tokens, ctx.tokens),
                MatchMode::Contains => match_contains(&rule_tokens, ctx.tokens),
            };
            bindings = matched?;
        }
        if let Some(filter_by) = &curation.rule.filter_by {
            let rule_filter_by = substitute(filter_by, &bindings);
            let rule_expr = filter_ast::parse(&rule_filter_by).ok()?;
            let is_subset = rule_expr.clauses.iter().all(|rc| ctx.filter_by.clauses.contains(rc));
            if !is_subset {
                return None;
            }
        }
        Some(bindings)
    }

    fn apply_action(&self, curation: &Curation, bindings: &Bindings, outcome: &mut CurationOutcome) {
        let action = &curation.action;
        outcome.matched_ids.push(curation.id.clone());
        outcome.includes.extend(action.includes.iter().cloned());
        outcome.excludes.extend(action.excludes.iter().cloned());
        if let Some(filter_by) = &action.filter_by {
            let substituted = substitute(filter_by, bindings);
            outcome.filter_by = Some(match &outcome.filter_by {
                Some(existing) => format!("{existing} && {substituted}"),
                None => substituted,
            });
        }
        if let Some(sort_by) = &action.sort_by {
            outcome.sort_by = Some(substitute(sort_by, bindings));
        }
        if action.filter_curated_hits {
            outcome.filter_curated_hits = true;
        }
        if let serde_json::Value::Object(extra) = &action.metadata {
            if !outcome.metadata.is_object() {
                outcome.metadata = serde_json::Value::Object(serde_json::Map::new());
            }
            let merged = outcome.metadata.as_object_mut().expect("just normalized to an object");
            for (k, v) in extra {
                merged.insert(k.clone(), v.clone());
            }
        }
        if let Some(replacement) = &action.replace_query {
            outcome.tokens = substitute(replacement, bindings).split_whitespace().map(str::to_string).collect();
        } else if action.remove_matched_tokens {
            if let Some(query) = &curation.rule.query {
                let rule_tokens: Vec<String> = query.split_whitespace().map(str::to_string).collect();
                if curation.rule.match_mode == MatchMode::Exact {
                    // An exact-mode template consumes every token by
                    // definition (see match_exact), so nothing remains.
                    outcome.tokens.clear();
                } else {
                    remove_contains_matched_tokens(&rule_tokens, &mut outcome.tokens);
                }
            }
        }
    }

    /// Matches every non-expired rule against `ctx`, grouped by tag
    /// precedence (exact/wildcard before subset before untagged) and then
    /// by ascending id within a group, applying actions in that order.
    /// Stops as soon as a matching rule sets `stop_processing`.
    pub fn evaluate(&self, ctx: &QueryContext) -> CurationOutcome {
        let mut outcome = CurationOutcome { tokens: ctx.tokens.to_vec(), ..Default::default() };
        'groups: for group in [TagGroup::Exact, TagGroup::Subset, TagGroup::Untagged] {
            for curation in self.definitions.values() {
                if classify_tags(&curation.rule.tags, ctx.tags) != Some(group) {
                    continue;
                }
                let scoped_ctx = QueryContext { tokens: &outcome.tokens, tags: ctx.tags, filter_by: ctx.filter_by, now_ts: ctx.now_ts };
                let Some(bindings) = self.rule_matches(curation, &scoped_ctx) else { continue };
                tracing::debug!(id = %curation.id, group = ?group, "curation rule matched");
                self.apply_action(curation, &bindings, &mut outcome);
                if curation.action.stop_processing {
                    tracing::debug!(id = %curation.id, "curation stop_processing set, halting rule evaluation");
                    break 'groups;
                }
            }
        }
        outcome
    }
}

fn remove_contains_matched_tokens(rule_tokens: &[String], tokens: &mut Vec<String>) {
    let mut cursor = 0usize;
    let mut drop_indices = HashSet::new();
    for rt in rule_tokens {
        if placeholder_name(rt).is_some() {
            if cursor < tokens.len() {
                drop_indices.insert(cursor);
                cursor += 1;
            }
            continue;
        }
        if let Some(offset) = tokens[cursor..].iter().position(|t| t.eq_ignore_ascii_case(rt)) {
            drop_indices.insert(cursor + offset);
            cursor += offset + 1;
        }
    }
    let mut i = 0;
    tokens.retain(|_| {
        let keep = !drop_indices.contains(&i);
        i += 1;
        keep
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv_store::InMemoryKvStore;

    fn toks(s: &str) -> Vec<String> {
        s.split_whitespace().map(str::to_string).collect()
    }

    fn basic_curation(id: &str, query: &str, includes: &[(&str, usize)]) -> Curation {
        Curation {
            id: id.to_string(),
            rule: CurationRule { query: Some(query.to_string()), match_mode: MatchMode::Exact, filter_by: None, tags: Vec::new() },
            action: CurationAction {
                includes: includes.iter().map(|(id, pos)| (id.to_string(), *pos)).collect(),
                ..Default::default()
            },
        }
    }

    #[test]
    fn validate_requires_query_or_tags() {
        let curation = Curation {
            id: "c1".to_string(),
            rule: CurationRule::default(),
            action: CurationAction::default(),
        };
        assert!(curation.validate().is_err());
    }

    #[test]
    fn validate_rejects_conflicting_actions() {
        let mut curation = basic_curation("c1", "shoes", &[]);
        curation.action.replace_query = Some("boots".to_string());
        curation.action.remove_matched_tokens = true;
        assert!(curation.validate().is_err());
    }

    #[test]
    fn upsert_then_remove_round_trips_through_kv_store() {
        let kv = InMemoryKvStore::new();
        let mut index = CurationIndex::new();
        index.upsert("products", basic_curation("c1", "shoes", &[("doc-1", 0)]), &kv).unwrap();
        assert!(index.get("c1").is_some());
        assert!(kv.get("collection_curation_set_products_c1").unwrap().is_some());

        assert!(index.remove("products", "c1", &kv).unwrap());
        assert!(index.get("c1").is_none());
        assert!(kv.get("collection_curation_set_products_c1").unwrap().is_none());
    }

    #[test]
    fn exact_match_pins_included_hit() {
        let kv = InMemoryKvStore::new();
        let mut index = CurationIndex::new();
        index.upsert("products", basic_curation("c1", "running shoes", &[("doc-7", 0)]), &kv).unwrap();

        let tokens = toks("running shoes");
        let filter_by = FilterExpr::default();
        let ctx = QueryContext { tokens: &tokens, tags: &[], filter_by: &filter_by, now_ts: 0 };
        let outcome = index.evaluate(&ctx);
        assert_eq!(outcome.includes, vec![("doc-7".to_string(), 0)]);
        assert_eq!(outcome.matched_ids, vec!["c1".to_string()]);
    }

    #[test]
    fn contains_match_does_not_require_exact_phrase() {
        let kv = InMemoryKvStore::new();
        let mut index = CurationIndex::new();
        let mut curation = basic_curation("c1", "shoes", &[("doc-7", 0)]);
        curation.rule.match_mode = MatchMode::Contains;
        index.upsert("products", curation, &kv).unwrap();

        let tokens = toks("red running shoes size 10");
        let filter_by = FilterExpr::default();
        let ctx = QueryContext { tokens: &tokens, tags: &[], filter_by: &filter_by, now_ts: 0 };
        let outcome = index.evaluate(&ctx);
        assert_eq!(outcome.includes, vec![("doc-7".to_string(), 0)]);
    }

    #[test]
    fn exact_tag_group_is_evaluated_before_subset_group() {
        let kv = InMemoryKvStore::new();
        let mut index = CurationIndex::new();
        let subset = Curation {
            id: "b1".to_string(),
            rule: CurationRule { query: None, match_mode: MatchMode::Exact, filter_by: None, tags: vec!["summer".to_string()] },
            action: CurationAction { includes: vec![("doc-subset".to_string(), 0)], ..Default::default() },
        };
        let exact = Curation {
            id: "a1".to_string(),
            rule: CurationRule { query: None, match_mode: MatchMode::Exact, filter_by: None, tags: vec!["summer".to_string(), "sale".to_string()] },
            action: CurationAction { includes: vec![("doc-exact".to_string(), 0)], stop_processing: true, ..Default::default() },
        };
        index.upsert("products", subset, &kv).unwrap();
        index.upsert("products", exact, &kv).unwrap();

        let tokens = toks("anything");
        let filter_by = FilterExpr::default();
        let tags = vec!["summer".to_string(), "sale".to_string()];
        let ctx = QueryContext { tokens: &tokens, tags: &tags, filter_by: &filter_by, now_ts: 0 };
        let outcome = index.evaluate(&ctx);
        assert_eq!(outcome.matched_ids, vec!["a1".to_string()]);
        assert_eq!(outcome.includes, vec![("doc-exact".to_string(), 0)]);
    }

    #[test]
    fn wildcard_tag_matches_any_query_tags() {
        let kv = InMemoryKvStore::new();
        let mut index = CurationIndex::new();
        let curation = Curation {
            id: "w1".to_string(),
            rule: CurationRule { query: None, match_mode: MatchMode::Exact, filter_by: None, tags: vec!["*".to_string()] },
            action: CurationAction { includes: vec![("doc-any".to_string(), 0)], ..Default::default() },
        };
        index.upsert("products", curation, &kv).unwrap();

        let tokens = toks("anything");
        let filter_by = FilterExpr::default();
        let tags = vec!["whatever".to_string()];
        let ctx = QueryContext { tokens: &tokens, tags: &tags, filter_by: &filter_by, now_ts: 0 };
        assert_eq!(index.evaluate(&ctx).includes, vec![("doc-any".to_string(), 0)]);
    }

    #[test]
    fn filter_by_rule_requires_subset_of_query_filter() {
        let kv = InMemoryKvStore::new();
        let mut index = CurationIndex::new();
        let mut curation = basic_curation("c1", "shoes", &[("doc-7", 0)]);
        curation.rule.filter_by = Some("category:=footwear".to_string());
        index.upsert("products", curation, &kv).unwrap();

        let tokens = toks("shoes");
        let narrow = filter_ast::parse("category:=footwear").unwrap();
        let wide = filter_ast::parse("category:=footwear && price:<100").unwrap();
        let unrelated = filter_ast::parse("category:=apparel").unwrap();

        let ctx_match = QueryContext { tokens: &tokens, tags: &[], filter_by: &wide, now_ts: 0 };
        assert_eq!(index.evaluate(&ctx_match).includes.len(), 1);

        let ctx_exact = QueryContext { tokens: &tokens, tags: &[], filter_by: &narrow, now_ts: 0 };
        assert_eq!(index.evaluate(&ctx_exact).includes.len(), 1);

        let ctx_miss = QueryContext { tokens: &tokens, tags: &[], filter_by: &unrelated, now_ts: 0 };
        assert!(index.evaluate(&ctx_miss).includes.is_empty());
    }

    #[test]
    fn effective_window_gates_the_rule() {
        let kv = InMemoryKvStore::new();
        let mut index = CurationIndex::new();
        let mut curation = basic_curation("c1", "shoes", &[("doc-7", 0)]);
        curation.action.effective_from_ts = Some(1_000);
        curation.action.effective_to_ts = Some(2_000);
        index.upsert("products", curation, &kv).unwrap();

        let tokens = toks("shoes");
        let filter_by = FilterExpr::default();
        let before = QueryContext { tokens: &tokens, tags: &[], filter_by: &filter_by, now_ts: 500 };
        assert!(index.evaluate(&before).includes.is_empty());
        let during = QueryContext { tokens: &tokens, tags: &[], filter_by: &filter_by, now_ts: 1_500 };
        assert!(!index.evaluate(&during).includes.is_empty());
        let after = QueryContext { tokens: &tokens, tags: &[], filter_by: &filter_by, now_ts: 2_500 };
        assert!(index.evaluate(&after).includes.is_empty());
    }

    #[test]
    fn replace_query_rewrites_the_token_stream() {
        let kv = InMemoryKvStore::new();
        let mut index = CurationIndex::new();
        let mut curation = basic_curation("c1", "sneakers", &[]);
        curation.action.replace_query = Some("running shoes".to_string());
        index.upsert("products", curation, &kv).unwrap();

        let tokens = toks("sneakers");
        let filter_by = FilterExpr::default();
        let ctx = QueryContext { tokens: &tokens, tags: &[], filter_by: &filter_by, now_ts: 0 };
        assert_eq!(index.evaluate(&ctx).tokens, toks("running shoes"));
    }

    #[test]
    fn remove_matched_tokens_drops_the_matched_span_in_contains_mode() {
        let kv = InMemoryKvStore::new();
        let mut index = CurationIndex::new();
        let mut curation = basic_curation("c1", "sale", &[]);
        curation.rule.match_mode = MatchMode::Contains;
        curation.action.remove_matched_tokens = true;
        index.upsert("products", curation, &kv).unwrap();

        let tokens = toks("summer sale shoes");
        let filter_by = FilterExpr::default();
        let ctx = QueryContext { tokens: &tokens, tags: &[], filter_by: &filter_by, now_ts: 0 };
        assert_eq!(index.evaluate(&ctx).tokens, toks("summer shoes"));
    }

    #[test]
    fn dynamic_placeholder_binds_into_the_injected_filter_by() {
        let kv = InMemoryKvStore::new();
        let mut index = CurationIndex::new();
        let mut curation = basic_curation("c1", "{brand} shoes", &[]);
        curation.action.filter_by = Some("brand:=`{brand}`".to_string());
        index.upsert("products", curation, &kv).unwrap();

        let tokens = toks("nike shoes");
        let filter_by = FilterExpr::default();
        let ctx = QueryContext { tokens: &tokens, tags: &[], filter_by: &filter_by, now_ts: 0 };
        let outcome = index.evaluate(&ctx);
        assert_eq!(outcome.filter_by.as_deref(), Some("brand:=`nike`"));
    }

    #[test]
    fn metadata_merges_with_later_rules_winning_ties() {
        let kv = InMemoryKvStore::new();
        let mut index = CurationIndex::new();
        let mut first = basic_curation("a1", "shoes", &[]);
        first.action.metadata = serde_json::json!({"banner": "first", "shared": "a"});
        let mut second = basic_curation("b1", "shoes", &[]);
        second.action.metadata = serde_json::json!({"shared": "b"});
        index.upsert("products", first, &kv).unwrap();
        index.upsert("products", second, &kv).unwrap();

        let tokens = toks("shoes");
        let filter_by = FilterExpr::default();
        let ctx = QueryContext { tokens: &tokens, tags: &[], filter_by: &filter_by, now_ts: 0 };
        let outcome = index.evaluate(&ctx);
        assert_eq!(outcome.metadata, serde_json::json!({"banner": "first", "shared": "b"}));
    }

    #[test]
    fn stop_processing_short_circuits_later_rules() {
        let kv = InMemoryKvStore::new();
        let mut index = CurationIndex::new();
        let mut first = basic_curation("a1", "shoes", &[("doc-1", 0)]);
        first.action.stop_processing = true;
        let second = basic_curation("b1", "shoes", &[("doc-2", 0)]);
        index.upsert("products", first, &kv).unwrap();
        index.upsert("products", second, &kv).unwrap();

        let tokens = toks("shoes");
        let filter_by = FilterExpr::default();
        let ctx = QueryContext { tokens: &tokens, tags: &[], filter_by: &filter_by, now_ts: 0 };
        let outcome = index.evaluate(&ctx);
        assert_eq!(outcome.includes, vec![("doc-1".to_string(), 0)]);
    }

    #[test]
    fn evaluate_then_reshape_closes_up_missing_pins_end_to_end() {
        let kv = InMemoryKvStore::new();
        let mut index = CurationIndex::new();
        for (rule_id, doc_id, position) in [("pin7", "7", 1usize), ("pin17", "17", 2), ("pin10", "10", 3)] {
            let mut curation = basic_curation(rule_id, "shoes", &[(doc_id, position)]);
            curation.action.filter_curated_hits = true;
            index.upsert("products", curation, &kv).unwrap();
        }

        let tokens = toks("shoes");
        let filter_by = FilterExpr::default();
        let ctx = QueryContext { tokens: &tokens, tags: &[], filter_by: &filter_by, now_ts: 0 };
        let outcome = index.evaluate(&ctx);
        assert!(outcome.filter_curated_hits);

        let base = vec!["10".to_string(), "11".to_string(), "12".to_string()];
        let universe = ["10", "11", "12"];
        let reshaped = outcome.reshape(&base, |id| universe.contains(&id));
        assert_eq!(reshaped, base);
    }

    #[test]
    fn reshape_closes_up_slots_for_pins_that_fail_the_filter() {
        // Three pins (7->1, 17->2, 10->3), filter_curated_hits=true, and a
        // "satisfies filter" predicate that only id 10 passes (7 and 17
        // aren't valid candidates at all). 7's slot closes, 17's slot
        // closes too, and 10 slides forward into slot 1 where it already
        // sits — base list comes back unchanged.
        let outcome = CurationOutcome {
            includes: vec![("7".to_string(), 1), ("17".to_string(), 2), ("10".to_string(), 3)],
            filter_curated_hits: true,
            ..Default::default()
        };
        let base = vec!["10".to_string(), "11".to_string(), "12".to_string()];
        let universe = ["10", "11", "12"];
        let got = outcome.reshape(&base, |id| universe.contains(&id));
        assert_eq!(got, vec!["10".to_string(), "11".to_string(), "12".to_string()]);
    }

    #[test]
    fn reshape_inserts_a_passing_pin_at_its_slot_and_pushes_the_rest_down() {
        let outcome = CurationOutcome {
            includes: vec![("99".to_string(), 2)],
            filter_curated_hits: false,
            ..Default::default()
        };
        let base = vec!["10".to_string(), "11".to_string(), "12".to_string()];
        let got = outcome.reshape(&base, |_| true);
        assert_eq!(got, vec!["10".to_string(), "99".to_string(), "11".to_string(), "12".to_string()]);
    }
}
