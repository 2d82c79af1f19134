pub mod codec;
pub mod disk;
pub mod errors;
pub mod eviction;
pub mod locks;
pub mod logger;
pub mod memory;
pub mod pool;

use crate::disk::DiskStore;
use crate::errors::CacheError;
use crate::locks::{KeyGate, KeyGates};
use crate::memory::MemoryStore;
use log::{debug, warn};
use parking_lot::RwLock;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Values a cache can hold: anything serde can move to and from bytes.
pub trait CacheValue: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}
impl<T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static> CacheValue for T {}

/// Configuration for a cache instance.
#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// Names the instance and its storage root; sanitized for filesystem
    /// use. Two instances with different names never collide on disk.
    pub name: String,
    /// Storage root override. Defaults to `<user cache dir>/tiercache`.
    pub root: Option<PathBuf>,
    /// Max total bytes on disk before LRU eviction kicks in.
    pub disk_capacity: u64,
    /// Max entry count on disk.
    pub max_object_count: u64,
    /// Max entries held in the memory tier.
    pub memory_capacity: usize,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            name: "tiercache".into(),
            root: None,
            disk_capacity: 64 * 1024 * 1024,
            max_object_count: 10_000,
            memory_capacity: 1024,
        }
    }
}

struct Inner<V> {
    name: String,
    memory: MemoryStore<V>,
    disk: Option<DiskStore>,
    gates: KeyGates,
    disk_capacity: AtomicU64,
    max_object_count: AtomicU64,
    /// Bumped by `clear`; a scheduled write from an older epoch never lands.
    epoch: AtomicU64,
    /// Readers and writers hold this shared while touching the disk tier;
    /// `clear` holds it exclusively while detaching state, so nothing it
    /// removed can be resurrected by an in-flight operation.
    clear_lock: RwLock<()>,
}

/// A named two-tier cache: a volatile, pressure-evictable memory tier over a
/// durable, capacity-bounded, LRU-evicted disk tier.
///
/// Thread safe; clones share the same instance. Reads fall through memory to
/// disk and repopulate memory on a disk hit. Writes land in memory
/// immediately and reach disk on a shared background pool, where every
/// completion also runs, never on the caller's stack.
pub struct Cache<V> {
    inner: Arc<Inner<V>>,
}

impl<V> Clone for Cache<V> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<V: CacheValue> Cache<V> {
    /// Create a cache named `name` with the given disk byte capacity and
    /// entry-count cap. When the storage root cannot be initialized the
    /// instance degrades to memory-only operation rather than failing.
    pub fn new(name: &str, disk_capacity: u64, max_object_count: u64) -> Self {
        Self::with_options(CacheOptions {
            name: name.to_string(),
            disk_capacity,
            max_object_count,
            ..Default::default()
        })
    }

    pub fn with_options(options: CacheOptions) -> Self {
        let root = options
            .root
            .unwrap_or_else(default_root)
            .join(sanitize_name(&options.name));
        let disk = match DiskStore::open(root) {
            Ok(store) => Some(store),
            Err(e) => {
                warn!("cache {:?}: disk tier unavailable, running memory-only: {e}", options.name);
                None
            }
        };
        Self {
            inner: Arc::new(Inner {
                name: options.name,
                memory: MemoryStore::new(options.memory_capacity),
                disk,
                gates: KeyGates::default(),
                disk_capacity: AtomicU64::new(options.disk_capacity),
                max_object_count: AtomicU64::new(options.max_object_count),
                epoch: AtomicU64::new(0),
                clear_lock: RwLock::new(()),
            }),
        }
    }

    /// Synchronous read-through lookup. A memory hit returns immediately; a
    /// disk hit decodes, repopulates the memory tier, and returns; anything
    /// else is `None`. Blocks for at most one disk read and never on other
    /// keys' in-flight operations.
    ///
    /// # Errors
    /// Only `CacheError::EmptyKey`; storage failures surface as a miss.
    pub fn get(&self, key: &str) -> Result<Option<V>, CacheError> {
        validate_key(key)?;
        Ok(self.lookup(key))
    }

    /// Asynchronous variant of [`Self::get`]. The completion is invoked
    /// exactly once on the shared background pool, strictly after this call
    /// returns.
    ///
    /// # Errors
    /// Only `CacheError::EmptyKey`, reported synchronously; the completion
    /// is not invoked in that case.
    pub fn get_with<F>(&self, key: &str, completion: F) -> Result<(), CacheError>
    where
        F: FnOnce(Option<V>) + Send + 'static,
    {
        validate_key(key)?;
        let cache = self.clone();
        let key = key.to_string();
        pool::shared().execute(move || completion(cache.lookup(&key)));
        Ok(())
    }

    /// Store `value` under `key`. The memory tier updates before this call
    /// returns, so subsequent reads see the value while the encode, disk
    /// write, and eviction pass run on the background pool.
    ///
    /// # Errors
    /// Only `CacheError::EmptyKey`; disk failures are logged and absorbed,
    /// the memory copy staying authoritative.
    pub fn insert(&self, key: &str, value: V) -> Result<(), CacheError> {
        self.insert_inner(key, value, || {})
    }

    /// Variant of [`Self::insert`] whose completion fires on the background
    /// pool once the disk write and the following eviction pass are done.
    ///
    /// # Errors
    /// Only `CacheError::EmptyKey`, reported synchronously; the completion
    /// is not invoked in that case.
    pub fn insert_with<F>(&self, key: &str, value: V, completion: F) -> Result<(), CacheError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.insert_inner(key, value, completion)
    }

    fn insert_inner<F>(&self, key: &str, value: V, completion: F) -> Result<(), CacheError>
    where
        F: FnOnce() + Send + 'static,
    {
        validate_key(key)?;
        let gate = self.inner.gates.gate(key);
        let generation = {
            let _guard = gate.lock();
            let generation = gate.bump();
            self.inner.memory.insert(key, value.clone());
            generation
        };
        let epoch = self.inner.epoch.load(Ordering::Acquire);
        let cache = self.clone();
        let key = key.to_string();
        // The job keeps the gate checked out until the write lands or is
        // superseded, so the gate's generation state outlives the schedule.
        pool::shared().execute(move || {
            cache.write_through(&key, &value, &gate, generation, epoch);
            cache.inner.gates.release(&key, gate);
            completion();
        });
        Ok(())
    }

    /// Remove `key` from both tiers. Once this returns, an immediate lookup
    /// misses in memory and on disk; only the trash purge is backgrounded.
    ///
    /// # Errors
    /// Only `CacheError::EmptyKey`; disk failures are logged and retried by
    /// a later eviction pass.
    pub fn remove(&self, key: &str) -> Result<(), CacheError> {
        validate_key(key)?;
        let gate = self.inner.gates.gate(key);
        {
            let _guard = gate.lock();
            gate.bump();
            self.inner.memory.remove(key);
            if let Some(disk) = self.inner.disk.as_ref() {
                if let Err(e) = disk.remove(key) {
                    warn!("disk remove failed for {key:?}: {e}");
                }
            }
        }
        self.inner.gates.release(key, gate);
        self.schedule_trash_purge();
        Ok(())
    }

    /// Clear both tiers. Ordered after every operation that completed before
    /// this call; writes still in flight from before the clear never land.
    pub fn clear(&self) {
        let detached = {
            let _exclusive = self.inner.clear_lock.write();
            self.inner.epoch.fetch_add(1, Ordering::AcqRel);
            self.inner.memory.clear();
            self.inner.disk.as_ref().map(|disk| disk.detach_all())
        };
        if let (Some(disk), Some(paths)) = (self.inner.disk.as_ref(), detached) {
            disk.discard_files(&paths);
            self.schedule_trash_purge();
        }
        debug!("cache {:?} cleared", self.inner.name);
    }

    /// Host-signaled low-memory reaction: drops the memory tier. Cheap and
    /// non-blocking; the disk tier is untouched and later reads fall through
    /// to it.
    pub fn handle_memory_pressure(&self) {
        eviction::on_memory_pressure(&self.inner.memory);
    }

    pub fn set_disk_capacity(&self, bytes: u64) {
        self.inner.disk_capacity.store(bytes, Ordering::Relaxed);
    }

    pub fn set_max_object_count(&self, count: u64) {
        self.inner.max_object_count.store(count, Ordering::Relaxed);
    }

    #[must_use]
    pub fn disk_capacity(&self) -> u64 {
        self.inner.disk_capacity.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn max_object_count(&self) -> u64 {
        self.inner.max_object_count.load(Ordering::Relaxed)
    }

    /// Total bytes currently accounted to the disk tier. Zero in memory-only
    /// mode.
    #[must_use]
    pub fn disk_total_bytes(&self) -> u64 {
        self.inner.disk.as_ref().map_or(0, DiskStore::total_bytes)
    }

    /// Entry count on the disk tier. Zero in memory-only mode.
    #[must_use]
    pub fn disk_entry_count(&self) -> usize {
        self.inner.disk.as_ref().map_or(0, DiskStore::entry_count)
    }

    #[must_use]
    pub fn memory_entry_count(&self) -> usize {
        self.inner.memory.len()
    }

    /// Number of keys with an operation currently in flight. Per-key
    /// coordination state is freed as soon as the last operation on a key
    /// finishes, so this does not grow with the key space.
    #[must_use]
    pub fn in_flight_key_count(&self) -> usize {
        self.inner.gates.len()
    }

    /// Whether the disk tier is running, or the instance degraded to
    /// memory-only operation at construction.
    #[must_use]
    pub fn is_durable(&self) -> bool {
        self.inner.disk.is_some()
    }

    fn lookup(&self, key: &str) -> Option<V> {
        if let Some(value) = self.inner.memory.get(key) {
            return Some(value);
        }
        let disk = self.inner.disk.as_ref()?;
        let _shared = self.inner.clear_lock.read();
        let gate = self.inner.gates.gate(key);
        let found = {
            let _guard = gate.lock();
            // A writer may have repopulated memory while we waited on the
            // gate.
            if let Some(value) = self.inner.memory.get(key) {
                Some(value)
            } else {
                self.read_from_disk(disk, key)
            }
        };
        self.inner.gates.release(key, gate);
        found
    }

    fn read_from_disk(&self, disk: &DiskStore, key: &str) -> Option<V> {
        let payload = match disk.get(key) {
            Ok(Some(payload)) => payload,
            Ok(None) => return None,
            Err(e) => {
                warn!("disk read failed for {key:?}: {e}");
                return None;
            }
        };
        match codec::decode::<V>(&payload) {
            Ok(value) => {
                self.inner.memory.insert(key, value.clone());
                Some(value)
            }
            Err(e) => {
                warn!("evicting undecodable entry for {key:?}: {e}");
                if let Err(e) = disk.remove(key) {
                    warn!("could not evict {key:?}: {e}");
                }
                None
            }
        }
    }

    fn write_through(&self, key: &str, value: &V, gate: &KeyGate, generation: u64, epoch: u64) {
        let Some(disk) = self.inner.disk.as_ref() else { return };
        let payload = match codec::encode(value) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("encode failed for {key:?}, memory copy stays authoritative: {e}");
                return;
            }
        };
        let landed = {
            let _shared = self.inner.clear_lock.read();
            let _guard = gate.lock();
            if gate.generation() != generation
                || self.inner.epoch.load(Ordering::Acquire) != epoch
            {
                debug!("write for {key:?} superseded before it landed");
                false
            } else {
                match disk.set(key, &payload) {
                    Ok(()) => true,
                    Err(e) => {
                        warn!("disk write failed for {key:?}, memory copy stays authoritative: {e}");
                        false
                    }
                }
            }
        };
        if landed {
            eviction::run_capacity_pass(
                disk,
                &self.inner.gates,
                self.inner.disk_capacity.load(Ordering::Relaxed),
                self.inner.max_object_count.load(Ordering::Relaxed),
                key,
            );
            disk.purge_trash();
        }
    }

    fn schedule_trash_purge(&self) {
        if self.inner.disk.is_none() {
            return;
        }
        let cache = self.clone();
        pool::shared().execute(move || {
            if let Some(disk) = cache.inner.disk.as_ref() {
                disk.purge_trash();
            }
        });
    }
}

fn validate_key(key: &str) -> Result<(), CacheError> {
    if key.is_empty() { Err(CacheError::EmptyKey) } else { Ok(()) }
}

fn default_root() -> PathBuf {
    dirs_next::cache_dir().unwrap_or_else(std::env::temp_dir).join("tiercache")
}

/// Keep names safe for filesystem use without losing uniqueness for
/// reasonable inputs.
fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '_' })
        .collect();
    if cleaned.is_empty() { "cache".to_string() } else { cleaned }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_name_replaces_path_unsafe_characters() {
        assert_eq!(sanitize_name("thumbnails"), "thumbnails");
        assert_eq!(sanitize_name("a/b\\c:d"), "a_b_c_d");
        assert_eq!(sanitize_name(""), "cache");
    }

    #[test]
    fn empty_key_is_rejected_synchronously() {
        assert!(matches!(validate_key(""), Err(CacheError::EmptyKey)));
        assert!(validate_key("k").is_ok());
    }
}
