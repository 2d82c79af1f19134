//! LRU bookkeeping for the disk tier: per-key last-access sequence numbers
//! and sizes, plus the aggregate byte total capacity checks compare against.

use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy)]
pub struct EntryMeta {
    pub size: u64,
    pub last_access: u64,
}

#[derive(Default)]
pub struct AccessIndex {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, EntryMeta>,
    total_bytes: u64,
}

impl AccessIndex {
    /// Insert or replace the entry for `key`.
    pub fn upsert(&self, key: &str, size: u64, seq: u64) {
        let mut inner = self.inner.write();
        let meta = EntryMeta { size, last_access: seq };
        if let Some(prev) = inner.entries.insert(key.to_string(), meta) {
            inner.total_bytes = inner.total_bytes.saturating_sub(prev.size);
        }
        inner.total_bytes = inner.total_bytes.saturating_add(size);
    }

    /// Record an access for `key`. Returns false when the key is not indexed.
    pub fn touch(&self, key: &str, seq: u64) -> bool {
        let mut inner = self.inner.write();
        match inner.entries.get_mut(key) {
            Some(meta) => {
                meta.last_access = seq;
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, key: &str) -> Option<EntryMeta> {
        let mut inner = self.inner.write();
        let meta = inner.entries.remove(key)?;
        inner.total_bytes = inner.total_bytes.saturating_sub(meta.size);
        Some(meta)
    }

    /// Drop every entry, returning the keys that were indexed.
    pub fn drain_keys(&self) -> Vec<String> {
        let mut inner = self.inner.write();
        inner.total_bytes = 0;
        inner.entries.drain().map(|(key, _)| key).collect()
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.inner.read().entries.contains_key(key)
    }

    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.inner.read().total_bytes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().entries.is_empty()
    }

    /// The `n` least-recently-accessed keys, oldest first. Equal access
    /// sequences order by key ascending so eviction is deterministic.
    pub fn oldest(&self, n: usize) -> Vec<String> {
        let inner = self.inner.read();
        let mut entries: Vec<(u64, &String)> =
            inner.entries.iter().map(|(key, meta)| (meta.last_access, key)).collect();
        entries.sort_unstable_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)));
        entries.into_iter().take(n).map(|(_, key)| key.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_replaces_and_tracks_totals() {
        let index = AccessIndex::default();
        index.upsert("a", 100, 1);
        index.upsert("b", 50, 2);
        assert_eq!(index.total_bytes(), 150);
        index.upsert("a", 10, 3);
        assert_eq!(index.total_bytes(), 60);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn remove_releases_bytes() {
        let index = AccessIndex::default();
        index.upsert("a", 100, 1);
        index.remove("a");
        assert_eq!(index.total_bytes(), 0);
        assert!(index.is_empty());
        assert!(index.remove("a").is_none());
    }

    #[test]
    fn oldest_orders_by_access_then_key() {
        let index = AccessIndex::default();
        index.upsert("b", 1, 7);
        index.upsert("c", 1, 3);
        index.upsert("a", 1, 7);
        assert_eq!(index.oldest(3), vec!["c".to_string(), "a".to_string(), "b".to_string()]);
        assert_eq!(index.oldest(1), vec!["c".to_string()]);
    }

    #[test]
    fn touch_refreshes_access_order() {
        let index = AccessIndex::default();
        index.upsert("a", 1, 1);
        index.upsert("b", 1, 2);
        assert!(index.touch("a", 3));
        assert_eq!(index.oldest(1), vec!["b".to_string()]);
        assert!(!index.touch("missing", 4));
    }

    #[test]
    fn drain_returns_all_keys() {
        let index = AccessIndex::default();
        index.upsert("a", 1, 1);
        index.upsert("b", 1, 2);
        let mut keys = index.drain_keys();
        keys.sort_unstable();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(index.total_bytes(), 0);
    }
}
