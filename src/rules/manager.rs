//! Per-collection handles to the rule indices, grounded on
//! `original_source/include/synonym_index_manager.h` /
//! `curation_index_manager.h`'s `std::unordered_map<name, iterator>`
//! shape. Unlike the original's process-wide singletons, these are plain
//! owned structs a caller constructs once per server.
//!
//! Each named index is wrapped in its own `RwLock` rather than sharing
//! one lock across every collection's rules — synonym and curation
//! reads/writes are synchronized per index, not globally — reduction/
//! evaluation takes a shared lock, add/remove an exclusive one.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::core::error::{Error, Result};
use crate::kv_store::KvStore;
use crate::rules::curation::{CurationIndex, CURATION_INDEX_KEY};
use crate::rules::synonym::SynonymIndex;

pub const SYNONYM_INDEX_KEY: &str = "$SI";

#[derive(Default)]
pub struct SynonymIndexManager {
    indices: RwLock<HashMap<String, Arc<RwLock<SynonymIndex>>>>,
}

impl SynonymIndexManager {
    pub fn new() -> Self {
        SynonymIndexManager::default()
    }

    /// Reloads every index named under the `$SI_` registry, each from its
    /// own `$CY_<name>_` prefix in turn.
    pub fn load_all(&self, kv: &dyn KvStore) -> Result<()> {
        let prefix = format!("{SYNONYM_INDEX_KEY}_");
        let mut names = Vec::new();
        kv.scan_fill(&prefix, &mut |key, _value| {
            if let Some(name) = key.strip_prefix(&prefix) {
                names.push(name.to_string());
            }
            true
        })?;
        let mut guard = self.indices.write();
        for name in names {
            let index = SynonymIndex::load(&name, kv)?;
            guard.insert(name, Arc::new(RwLock::new(index)));
        }
        Ok(())
    }

    pub fn add_index(&self, name: &str, kv: &dyn KvStore) -> Result<Arc<RwLock<SynonymIndex>>> {
        let mut guard = self.indices.write();
        if guard.contains_key(name) {
            return Err(Error::validation(format!("synonym index '{name}' already exists")));
        }
        kv.insert(&format!("{SYNONYM_INDEX_KEY}_{name}"), Vec::new())?;
        let handle = Arc::new(RwLock::new(SynonymIndex::new()));
        guard.insert(name.to_string(), handle.clone());
        Ok(handle)
    }

    pub fn get_index(&self, name: &str) -> Option<Arc<RwLock<SynonymIndex>>> {
        self.indices.read().get(name).cloned()
    }

    pub fn remove_index(&self, name: &str, kv: &dyn KvStore) -> Result<bool> {
        let mut guard = self.indices.write();
        if guard.remove(name).is_none() {
            return Ok(false);
        }
        SynonymIndex::drop_collection(name, kv)?;
        kv.remove(&format!("{SYNONYM_INDEX_KEY}_{name}"))?;
        Ok(true)
    }

    pub fn index_names(&self) -> Vec<String> {
        self.indices.read().keys().cloned().collect()
    }
}

#[derive(Default)]
pub struct CurationIndexManager {
    indices: RwLock<HashMap<String, Arc<RwLock<CurationIndex>>>>,
}

impl CurationIndexManager {
    pub fn new() -> Self {
        CurationIndexManager::default()
    }

    pub fn load_all(&self, kv: &dyn KvStore) -> Result<()> {
        let prefix = format!("{CURATION_INDEX_KEY}_");
        let mut names = Vec::new();
        kv.scan_fill(&prefix, &mut |key, _value| {
            if let Some(name) = key.strip_prefix(&prefix) {
                names.push(name.to_string());
            }
            true
        })?;
        let mut guard = self.indices.write();
        for name in names {
            let index = CurationIndex::load(&name, kv)?;
            guard.insert(name, Arc::new(RwLock::new(index)));
        }
        Ok(())
    }

    pub fn add_index(&self, name: &str, kv: &dyn KvStore) -> Result<Arc<RwLock<CurationIndex>>> {
        let mut guard = self.indices.write();
        if guard.contains_key(name) {
            return Err(Error::validation(format!("curation index '{name}' already exists")));
        }
        kv.insert(&format!("{CURATION_INDEX_KEY}_{name}"), Vec::new())?;
        let handle = Arc::new(RwLock::new(CurationIndex::new()));
        guard.insert(name.to_string(), handle.clone());
        Ok(handle)
    }

    pub fn get_index(&self, name: &str) -> Option<Arc<RwLock<CurationIndex>>> {
        self.indices.read().get(name).cloned()
    }

    pub fn remove_index(&self, name: &str, kv: &dyn KvStore) -> Result<bool> {
        let mut guard = self.indices.write();
        if guard.remove(name).is_none() {
            return Ok(false);
        }
        CurationIndex::drop_index(name, kv)?;
        kv.remove(&format!("{CURATION_INDEX_KEY}_{name}"))?;
        Ok(true)
    }

    pub fn index_names(&self) -> Vec<String> {
        self.indices.read().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv_store::InMemoryKvStore;
    use crate::rules::synonym::Synonym;

    #[test]
    fn add_index_is_rejected_on_name_collision() {
        let kv = InMemoryKvStore::new();
        let manager = SynonymIndexManager::new();
        manager.add_index("products", &kv).unwrap();
        assert!(manager.add_index("products", &kv).is_err());
    }

    #[test]
    fn load_all_reconstructs_indices_from_the_registry() {
        let kv = InMemoryKvStore::new();
        {
            let manager = SynonymIndexManager::new();
            let handle = manager.add_index("products", &kv).unwrap();
            handle
                .write()
                .add_synonym(
                    "products",
                    Synonym { id: "s1".to_string(), root: vec!["tv".to_string()], synonyms: vec![vec!["television".to_string()]], locale: String::new(), symbols: Vec::new() },
                    &kv,
                )
                .unwrap();
        }

        let reloaded = SynonymIndexManager::new();
        reloaded.load_all(&kv).unwrap();
        let handle = reloaded.get_index("products").unwrap();
        assert!(handle.read().get_synonym("s1").is_some());
    }

    #[test]
    fn remove_index_drops_the_registry_marker_and_its_items() {
        let kv = InMemoryKvStore::new();
        let manager = SynonymIndexManager::new();
        manager.add_index("products", &kv).unwrap();
        assert!(manager.remove_index("products", &kv).unwrap());
        assert!(manager.get_index("products").is_none());
        assert!(kv.get("$SI_products").unwrap().is_none());
    }

    #[test]
    fn curation_manager_round_trips_through_the_registry_too() {
        use crate::rules::curation::{Curation, CurationAction, CurationRule, MatchMode};

        let kv = InMemoryKvStore::new();
        let manager = CurationIndexManager::new();
        let handle = manager.add_index("products", &kv).unwrap();
        handle
            .write()
            .upsert(
                "products",
                Curation {
                    id: "c1".to_string(),
                    rule: CurationRule { query: Some("shoes".to_string()), match_mode: MatchMode::Exact, filter_by: None, tags: Vec::new() },
                    action: CurationAction::default(),
                },
                &kv,
            )
            .unwrap();

        let reloaded = CurationIndexManager::new();
        reloaded.load_all(&kv).unwrap();
        assert!(reloaded.get_index("products").unwrap().read().get("c1").is_some());
    }
}
