//! The external key-value store contract the rule engine persists
//! through. Grounded on this crate's own `storage`-layer naming
//! conventions (`get`/`insert`/`remove` plus a prefix scan), generalized
//! to an abstract trait since the actual storage engine lives outside
//! this crate's scope.
//!
//! `InMemoryKvStore` is test scaffolding for manager unit tests, not a
//! production backend — it has no grounding source in the example pack.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::core::error::Result;

pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    fn insert(&self, key: &str, value: Vec<u8>) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;

    /// Deletes every key in `[start, end)`.
    fn delete_range(&self, start: &str, end: &str) -> Result<()>;

    /// Invokes `visit(key, value)` for every key with `prefix`, in
    /// ascending key order, until it returns `false` or keys are
    /// exhausted — used at startup to reload persisted rule indices.
    fn scan_fill(&self, prefix: &str, visit: &mut dyn FnMut(&str, &[u8]) -> bool) -> Result<()>;
}

/// The conventional "successor" bound for a prefix scan: the smallest
/// string greater than every string starting with `prefix`, obtained by
/// bumping the last byte. Used to turn `remove`'s prefix range-delete
/// into a concrete `[start, end)` pair.
pub fn prefix_upper_bound(prefix: &str) -> String {
    let mut bytes = prefix.as_bytes().to_vec();
    while let Some(last) = bytes.pop() {
        if last < 0xff {
            bytes.push(last + 1);
            return String::from_utf8(bytes).unwrap_or_else(|_| format!("{prefix}\u{10FFFF}"));
        }
    }
    format!("{prefix}\u{10FFFF}")
}

#[derive(Default)]
pub struct InMemoryKvStore {
    data: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        InMemoryKvStore::default()
    }
}

impl KvStore for InMemoryKvStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.data.read().get(key).cloned())
    }

    fn insert(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.data.write().insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.data.write().remove(key);
        Ok(())
    }

    fn delete_range(&self, start: &str, end: &str) -> Result<()> {
        let mut guard = self.data.write();
        let keys: Vec<String> = guard.range(start.to_string()..end.to_string()).map(|(k, _)| k.clone()).collect();
        for key in keys {
            guard.remove(&key);
        }
        Ok(())
    }

    fn scan_fill(&self, prefix: &str, visit: &mut dyn FnMut(&str, &[u8]) -> bool) -> Result<()> {
        let guard = self.data.read();
        let end = prefix_upper_bound(prefix);
        for (key, value) in guard.range(prefix.to_string()..end) {
            if !visit(key, value) {
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_upper_bound_excludes_unrelated_keys() {
        let store = InMemoryKvStore::new();
        store.insert("$CY_a_1", b"x".to_vec()).unwrap();
        store.insert("$CY_a_2", b"y".to_vec()).unwrap();
        store.insert("$CZ_a_1", b"z".to_vec()).unwrap();

        let mut seen = Vec::new();
        store
            .scan_fill("$CY_a_", &mut |k, _| {
                seen.push(k.to_string());
                true
            })
            .unwrap();
        assert_eq!(seen, vec!["$CY_a_1", "$CY_a_2"]);
    }

    #[test]
    fn delete_range_removes_only_the_prefix() {
        let store = InMemoryKvStore::new();
        store.insert("a", b"1".to_vec()).unwrap();
        store.insert("b", b"2".to_vec()).unwrap();
        store.insert("c", b"3".to_vec()).unwrap();
        store.delete_range("a", "c").unwrap();
        assert!(store.get("a").unwrap().is_none());
        assert!(store.get("b").unwrap().is_none());
        assert!(store.get("c").unwrap().is_some());
    }

    #[test]
    fn scan_fill_can_stop_early() {
        let store = InMemoryKvStore::new();
        for i in 0..5 {
            store.insert(&format!("k{i}"), vec![i as u8]).unwrap();
        }
        let mut count = 0;
        store
            .scan_fill("k", &mut |_, _| {
                count += 1;
                count < 2
            })
            .unwrap();
        assert_eq!(count, 2);
    }
}
