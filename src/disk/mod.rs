//! Durable tier: one file per key under a storage root owned by a single
//! cache instance. Writes publish atomically (temp file, then rename) and
//! every read or write refreshes the entry's position in the access index.
//!
//! The store is safe for concurrent use across distinct keys; callers
//! serialize same-key operations through [`crate::locks::KeyGates`], which
//! also keeps an entry from being evicted mid-read or mid-write.

pub mod record;

mod index;
mod trash;

pub use index::EntryMeta;

use crate::errors::CacheError;
use index::AccessIndex;
use log::{debug, info, warn};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

const DATA_EXT: &str = "bin";

pub struct DiskStore {
    root: PathBuf,
    index: AccessIndex,
    seq: AtomicU64,
}

impl DiskStore {
    /// Open the store rooted at `root`, creating the directory if needed and
    /// rebuilding the access index from the files already present. Stale
    /// trash from a previous process is purged.
    ///
    /// # Errors
    /// Returns `CacheError::StorageRoot` when the directory cannot be
    /// created or scanned; callers are expected to degrade to memory-only
    /// operation.
    pub fn open(root: PathBuf) -> Result<Self, CacheError> {
        fs::create_dir_all(&root)
            .map_err(|e| CacheError::StorageRoot(format!("{}: {e}", root.display())))?;
        let store = Self { root, index: AccessIndex::default(), seq: AtomicU64::new(0) };
        store.rebuild_index().map_err(|e| {
            CacheError::StorageRoot(format!("{}: {e}", store.root.display()))
        })?;
        trash::purge(&store.root);
        info!(
            "disk tier open at {}: {} entries, {} bytes",
            store.root.display(),
            store.index.len(),
            store.index.total_bytes()
        );
        Ok(store)
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Deterministic, collision-free key-to-path mapping. Hashing keeps
    /// path-unsafe key characters out of the storage root.
    fn path_for(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        self.root.join(format!("{}.{DATA_EXT}", hex::encode(digest)))
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Read the payload stored under `key`, counting the read as an access.
    /// A corrupt record is evicted and reported as a miss.
    ///
    /// # Errors
    /// Returns an error only for I/O failures other than the file being
    /// absent.
    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        if !self.index.contains(key) {
            return Ok(None);
        }
        let path = self.path_for(key);
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.index.remove(key);
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        let stored_key = match record::decode(&data) {
            Ok((stored_key, payload)) if stored_key == key => {
                self.index.touch(key, self.next_seq());
                touch_mtime(&path);
                return Ok(Some(payload));
            }
            Ok((stored_key, _)) => stored_key,
            Err(e) => {
                warn!("evicting corrupt entry for {key:?}: {e}");
                self.evict_corrupt(key, &path);
                return Ok(None);
            }
        };
        warn!("evicting entry for {key:?}: file holds key {stored_key:?}");
        self.evict_corrupt(key, &path);
        Ok(None)
    }

    fn evict_corrupt(&self, key: &str, path: &Path) {
        self.index.remove(key);
        if let Err(e) = trash::trash_file(&self.root, path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!("could not trash corrupt file {}: {e}", path.display());
            }
        }
    }

    /// Atomically publish `payload` under `key`. Readers never observe a
    /// partial write: the record lands in a temp file first and is renamed
    /// into place.
    ///
    /// # Errors
    /// Returns an error when the record cannot be written or published; the
    /// index is left untouched in that case.
    pub fn set(&self, key: &str, payload: &[u8]) -> Result<(), CacheError> {
        let bytes = record::encode(key, payload);
        let path = self.path_for(key);
        let mut tmp = tempfile::NamedTempFile::new_in(&self.root)?;
        tmp.write_all(&bytes)?;
        tmp.persist(&path).map_err(|e| CacheError::Io(e.error))?;
        self.index.upsert(key, bytes.len() as u64, self.next_seq());
        debug!("wrote {} bytes for {key:?}", bytes.len());
        Ok(())
    }

    /// Remove the entry for `key`. Returns whether an entry was present.
    ///
    /// # Errors
    /// Returns an error when the data file could not be discarded; the entry
    /// then stays indexed (and counted against capacity) so a later pass can
    /// retry it.
    pub fn remove(&self, key: &str) -> Result<bool, CacheError> {
        if !self.index.contains(key) {
            return Ok(false);
        }
        let path = self.path_for(key);
        match trash::trash_file(&self.root, &path) {
            Ok(()) => {
                self.index.remove(key);
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.index.remove(key);
                Ok(true)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Drop every entry from the index, returning the data-file paths that
    /// still need discarding. Split from [`Self::discard_files`] so the
    /// caller can detach under its clear ordering and move files afterwards.
    pub fn detach_all(&self) -> Vec<PathBuf> {
        self.index.drain_keys().iter().map(|key| self.path_for(key)).collect()
    }

    /// Move detached data files into the trash. Failures are logged; an
    /// orphaned file is re-indexed or purged on the next open.
    pub fn discard_files(&self, paths: &[PathBuf]) {
        for path in paths {
            if let Err(e) = trash::trash_file(&self.root, path) {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!("could not trash {}: {e}", path.display());
                }
            }
        }
    }

    /// Delete whatever is sitting in the trash directory.
    pub fn purge_trash(&self) {
        trash::purge(&self.root);
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.index.contains(key)
    }

    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.index.total_bytes()
    }

    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.index.len()
    }

    /// The `n` least-recently-accessed keys, oldest first; ties order by key
    /// ascending.
    pub fn oldest_keys(&self, n: usize) -> Vec<String> {
        self.index.oldest(n)
    }

    /// Scan the storage root and seed the index. Entries order by file
    /// mtime, then key, so LRU state approximately survives a restart and
    /// equal-mtime ties evict deterministically. Unreadable files are
    /// discarded as corrupt.
    fn rebuild_index(&self) -> io::Result<()> {
        let mut found: Vec<(SystemTime, String, u64)> = Vec::new();
        for entry in fs::read_dir(&self.root)?.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(DATA_EXT) {
                continue;
            }
            let Ok(meta) = entry.metadata() else { continue };
            if !meta.is_file() {
                continue;
            }
            match record::read_key(&path) {
                Ok(key) => {
                    let mtime = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
                    found.push((mtime, key, meta.len()));
                }
                Err(e) => {
                    warn!("discarding unreadable cache file {}: {e}", path.display());
                    let _ = fs::remove_file(&path);
                }
            }
        }
        found.sort_unstable_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        for (_, key, size) in found {
            let seq = self.next_seq();
            self.index.upsert(&key, size, seq);
        }
        Ok(())
    }
}

/// Best effort: the in-process sequence counter is authoritative, the mtime
/// only seeds LRU order across restarts.
fn touch_mtime(path: &Path) {
    if let Ok(file) = fs::OpenOptions::new().write(true).open(path) {
        let _ = file.set_modified(SystemTime::now());
    }
}
