use parking_lot::{Mutex, MutexGuard};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Serialization point for all operations touching a single key.
///
/// The mutex orders same-key tier operations; the generation counter lets a
/// scheduled disk write detect that a later insert or remove superseded it
/// before it landed.
pub struct KeyGate {
    lock: Mutex<()>,
    generation: AtomicU64,
}

impl KeyGate {
    pub fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock()
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Advance the generation, invalidating any write scheduled under an
    /// older one. Returns the new generation.
    pub fn bump(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }
}

/// Table of per-key gates shared by the façade and the eviction pass.
///
/// Every operation checks a gate out with [`KeyGates::gate`] and hands it
/// back with [`KeyGates::release`] once done, so the table holds state only
/// for keys with an operation in flight, not for every key ever touched.
#[derive(Default)]
pub struct KeyGates {
    map: Mutex<HashMap<String, Arc<KeyGate>>>,
}

impl KeyGates {
    pub fn gate(&self, key: &str) -> Arc<KeyGate> {
        let mut map = self.map.lock();
        if let Some(gate) = map.get(key) {
            return Arc::clone(gate);
        }
        let gate = Arc::new(KeyGate { lock: Mutex::new(()), generation: AtomicU64::new(0) });
        map.insert(key.to_string(), Arc::clone(&gate));
        gate
    }

    /// Hand a gate back, pruning the map entry when no other operation still
    /// holds it. An in-flight background write keeps its gate checked out
    /// from scheduling until it lands, so generation state survives exactly
    /// as long as something can still act on it.
    pub fn release(&self, key: &str, gate: Arc<KeyGate>) {
        let mut map = self.map.lock();
        drop(gate);
        if map.get(key).is_some_and(|entry| Arc::strong_count(entry) == 1) {
            map.remove(key);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.map.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_is_shared_per_key() {
        let gates = KeyGates::default();
        let a = gates.gate("k");
        let b = gates.gate("k");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &gates.gate("other")));
    }

    #[test]
    fn bump_advances_generation() {
        let gates = KeyGates::default();
        let gate = gates.gate("k");
        assert_eq!(gate.generation(), 0);
        assert_eq!(gate.bump(), 1);
        assert_eq!(gate.generation(), 1);
    }

    #[test]
    fn release_prunes_idle_gates() {
        let gates = KeyGates::default();
        let gate = gates.gate("k");
        assert_eq!(gates.len(), 1);
        gates.release("k", gate);
        assert!(gates.is_empty());
    }

    #[test]
    fn release_keeps_gates_other_operations_still_hold() {
        let gates = KeyGates::default();
        let first = gates.gate("k");
        let second = gates.gate("k");
        assert!(Arc::ptr_eq(&first, &second));

        gates.release("k", second);
        assert_eq!(gates.len(), 1, "a held gate must not be pruned");

        gates.release("k", first);
        assert!(gates.is_empty());
    }

    #[test]
    fn table_stays_empty_across_many_distinct_keys() {
        let gates = KeyGates::default();
        for n in 0..1000 {
            let key = format!("k{n}");
            let gate = gates.gate(&key);
            gate.bump();
            gates.release(&key, gate);
        }
        assert!(gates.is_empty());
    }
}
