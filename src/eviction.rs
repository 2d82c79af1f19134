//! Eviction policy for both tiers: the memory-pressure reaction and the
//! capacity pass that runs after every disk write.

use crate::disk::DiskStore;
use crate::locks::KeyGates;
use crate::memory::MemoryStore;
use log::{debug, warn};
use std::collections::HashSet;

/// Memory-pressure reaction: drop the whole volatile tier. Callers already
/// tolerate memory-tier loss at any moment, so a full clear is the cheapest
/// valid response. Fire-and-forget; the disk tier is untouched.
pub fn on_memory_pressure<V: Clone>(memory: &MemoryStore<V>) {
    let dropped = memory.len();
    memory.clear();
    debug!("memory pressure: dropped {dropped} cached entries");
}

/// Capacity pass: evict oldest-access-first until the disk tier fits both
/// the byte capacity and the entry-count cap, or nothing evictable remains.
///
/// `written_key` is the entry whose write triggered the pass. When it is the
/// only entry left it is retained even while oversized; evicting it would
/// just have the caller rewrite it, looping forever. A failed eviction is
/// logged and skipped, leaving the entry counted so a later pass retries it.
pub fn run_capacity_pass(
    disk: &DiskStore,
    gates: &KeyGates,
    disk_capacity: u64,
    max_object_count: u64,
    written_key: &str,
) {
    let mut skipped: HashSet<String> = HashSet::new();
    loop {
        let over_bytes = disk.total_bytes() > disk_capacity;
        let over_count = disk.entry_count() as u64 > max_object_count;
        if !over_bytes && !over_count {
            break;
        }
        let candidates = disk.oldest_keys(skipped.len() + 1);
        let Some(victim) = candidates.into_iter().find(|key| !skipped.contains(key)) else {
            break;
        };
        if victim == written_key && disk.entry_count() <= 1 {
            break;
        }
        let gate = gates.gate(&victim);
        let removed = {
            let _guard = gate.lock();
            disk.remove(&victim)
        };
        gates.release(&victim, gate);
        match removed {
            Ok(true) => {
                debug!("evicted {victim:?}, {} bytes remain", disk.total_bytes());
            }
            Ok(false) => {
                // Raced another remove; the counters already dropped.
            }
            Err(e) => {
                warn!("eviction failed for {victim:?}, skipping this pass: {e}");
                skipped.insert(victim);
            }
        }
    }
}
