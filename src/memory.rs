//! Volatile tier: a bounded table of live values. Purely an opportunistic
//! accelerator; the disk tier stays the durable source of truth, so losing
//! the whole table at any moment is always legal and callers see only a
//! cache miss on their next lookup.

use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;

pub struct MemoryStore<V> {
    store: Mutex<LruCache<String, V>>,
}

impl<V: Clone> MemoryStore<V> {
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self { store: Mutex::new(LruCache::new(cap)) }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.store.lock().get(key).cloned()
    }

    pub fn insert(&self, key: &str, value: V) {
        self.store.lock().put(key.to_string(), value);
    }

    pub fn remove(&self, key: &str) {
        self.store.lock().pop(key);
    }

    pub fn clear(&self) {
        self.store.lock().clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.store.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store.lock().is_empty()
    }
}
