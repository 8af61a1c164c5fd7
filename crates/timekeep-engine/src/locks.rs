//! Per-key async mutual exclusion.
//!
//! Callers serialize read-modify-write work on one key (for example one
//! employee-day) while work on other keys proceeds in parallel. Entries are
//! held weakly and pruned once no guard for them remains.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::OwnedMutexGuard;

type Slot = tokio::sync::Mutex<()>;

/// A set of async locks addressed by key.
#[derive(Debug)]
pub struct KeyedLocks<K> {
    slots: Mutex<HashMap<K, Weak<Slot>>>,
}

impl<K> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`.
    pub async fn lock(&self, key: K) -> OwnedMutexGuard<()> {
        self.slot(key).lock_owned().await
    }

    /// Acquire several keys. Keys are sorted and deduplicated first so that
    /// concurrent callers always lock in the same order.
    pub async fn lock_many(&self, mut keys: Vec<K>) -> Vec<OwnedMutexGuard<()>>
    where
        K: Ord,
    {
        keys.sort();
        keys.dedup();
        let mut guards = Vec::with_capacity(keys.len());
        for key in keys {
            guards.push(self.lock(key).await);
        }
        guards
    }

    /// Number of keys with a live lock handle.
    pub fn active(&self) -> usize {
        self.slots
            .lock()
            .map(|slots| slots.values().filter(|w| w.strong_count() > 0).count())
            .unwrap_or_default()
    }

    fn slot(&self, key: K) -> Arc<Slot> {
        let mut slots = match self.slots.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(existing) = slots.get(&key).and_then(Weak::upgrade) {
            return existing;
        }
        slots.retain(|_, w| w.strong_count() > 0);
        let slot = Arc::new(Slot::new(()));
        slots.insert(key, Arc::downgrade(&slot));
        slot
    }
}
