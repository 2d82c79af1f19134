use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::mpsc;
use std::time::Duration;
use tiercache::{Cache, CacheOptions};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
struct Blob(Vec<u8>);

fn blob(len: usize) -> Blob {
    Blob(vec![0xAB; len])
}

fn new_cache(root: &Path, disk_capacity: u64, max_object_count: u64) -> Cache<Blob> {
    Cache::with_options(CacheOptions {
        name: "evict".into(),
        root: Some(root.to_path_buf()),
        disk_capacity,
        max_object_count,
        ..Default::default()
    })
}

fn insert_blocking(cache: &Cache<Blob>, key: &str, value: Blob) {
    let (tx, rx) = mpsc::channel();
    cache
        .insert_with(key, value, move || {
            let _ = tx.send(());
        })
        .expect("insert scheduled");
    rx.recv_timeout(Duration::from_secs(10)).expect("set completion");
}

/// Disk-tier presence, bypassing the memory tier.
fn on_disk(cache: &Cache<Blob>, key: &str) -> bool {
    cache.handle_memory_pressure();
    cache.get(key).unwrap().is_some()
}

#[test]
fn byte_capacity_keeps_only_the_most_recent_entries() {
    let dir = tempfile::tempdir().unwrap();
    // Room for roughly two and a half 1 KiB payloads.
    let cache = new_cache(dir.path(), 2560, 1000);

    for n in 0..6 {
        insert_blocking(&cache, &format!("k{n}"), blob(1024));
    }
    assert!(cache.disk_total_bytes() <= 2560);
    assert!(cache.disk_entry_count() >= 1);

    // Survivors are a suffix of the insertion order.
    assert!(on_disk(&cache, "k5"));
    assert!(!on_disk(&cache, "k0"));
    assert!(!on_disk(&cache, "k1"));
}

#[test]
fn object_count_cap_keeps_the_most_recently_accessed() {
    let dir = tempfile::tempdir().unwrap();
    let cache = new_cache(dir.path(), u64::MAX, 3);

    for n in 0..8 {
        insert_blocking(&cache, &format!("k{n}"), blob(16));
    }
    assert_eq!(cache.disk_entry_count(), 3);
    for n in 0..5 {
        assert!(!on_disk(&cache, &format!("k{n}")), "k{n} should have been evicted");
    }
    for n in 5..8 {
        assert!(on_disk(&cache, &format!("k{n}")), "k{n} should have survived");
    }
}

#[test]
fn a_disk_read_refreshes_an_entry_against_eviction() {
    let dir = tempfile::tempdir().unwrap();
    let cache = new_cache(dir.path(), u64::MAX, 3);

    insert_blocking(&cache, "a", blob(16));
    insert_blocking(&cache, "b", blob(16));
    insert_blocking(&cache, "c", blob(16));

    // Touch "a" on disk, making "b" the oldest.
    assert!(on_disk(&cache, "a"));

    insert_blocking(&cache, "d", blob(16));
    assert!(on_disk(&cache, "a"));
    assert!(!on_disk(&cache, "b"));
}

#[test]
fn a_single_oversized_entry_is_retained() {
    let dir = tempfile::tempdir().unwrap();
    let cache = new_cache(dir.path(), 64, 1000);

    insert_blocking(&cache, "huge", blob(4096));
    // The pass must not evict the entry it was triggered by when nothing
    // else is left, even though it exceeds capacity on its own.
    assert_eq!(cache.disk_entry_count(), 1);
    assert!(on_disk(&cache, "huge"));

    // A second oversized write evicts the first and is itself retained.
    insert_blocking(&cache, "huger", blob(4096));
    assert_eq!(cache.disk_entry_count(), 1);
    assert!(on_disk(&cache, "huger"));
    assert!(!on_disk(&cache, "huge"));
}

#[test]
fn capacity_changes_apply_on_the_next_pass() {
    let dir = tempfile::tempdir().unwrap();
    let cache = new_cache(dir.path(), u64::MAX, 100);

    for n in 0..6 {
        insert_blocking(&cache, &format!("k{n}"), blob(16));
    }
    assert_eq!(cache.disk_entry_count(), 6);

    // Tightening the cap is not retroactive...
    cache.set_max_object_count(2);
    assert_eq!(cache.disk_entry_count(), 6);

    // ...but the next write's pass enforces it.
    insert_blocking(&cache, "k6", blob(16));
    assert_eq!(cache.disk_entry_count(), 2);
    assert!(on_disk(&cache, "k6"));
}

#[test]
fn pressure_eviction_does_not_touch_the_disk_tier() {
    let dir = tempfile::tempdir().unwrap();
    let cache = new_cache(dir.path(), u64::MAX, 100);

    insert_blocking(&cache, "k", blob(64));
    let bytes = cache.disk_total_bytes();

    cache.handle_memory_pressure();
    assert_eq!(cache.memory_entry_count(), 0);
    assert_eq!(cache.disk_total_bytes(), bytes);
    assert_eq!(cache.disk_entry_count(), 1);
}
