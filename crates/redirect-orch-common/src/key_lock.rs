//! Per-key mutual exclusion.
//!
//! Operations touching the same keys serialize; operations on disjoint keys
//! run in parallel. A caller that needs several keys gets all of them or
//! waits holding none, and keys are always taken as one sorted set, so two
//! callers can never deadlock on each other.

use parking_lot::{Condvar, Mutex};
use std::collections::BTreeSet;
use std::fmt;

/// A set of per-key locks.
pub struct KeyedLock<K> {
    held: Mutex<BTreeSet<K>>,
    released: Condvar,
}

impl<K: Ord + Clone> KeyedLock<K> {
    pub fn new() -> Self {
        Self {
            held: Mutex::new(BTreeSet::new()),
            released: Condvar::new(),
        }
    }

    /// Blocks until every key in `keys` is free, then takes them all.
    ///
    /// Duplicate keys are taken once. An empty key set returns immediately.
    pub fn lock_all<I>(&self, keys: I) -> KeyedGuard<'_, K>
    where
        I: IntoIterator<Item = K>,
    {
        let keys: BTreeSet<K> = keys.into_iter().collect();
        let mut held = self.held.lock();
        while keys.iter().any(|k| held.contains(k)) {
            self.released.wait(&mut held);
        }
        held.extend(keys.iter().cloned());
        KeyedGuard { lock: self, keys }
    }

    fn release(&self, keys: &BTreeSet<K>) {
        let mut held = self.held.lock();
        for key in keys {
            held.remove(key);
        }
        drop(held);
        self.released.notify_all();
    }
}

impl<K: Ord + Clone> Default for KeyedLock<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: fmt::Debug> fmt::Debug for KeyedLock<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedLock")
            .field("held", &*self.held.lock())
            .finish()
    }
}

/// Keys held by one caller. Released on drop.
#[must_use = "keys are released as soon as the guard is dropped"]
pub struct KeyedGuard<'a, K: Ord + Clone> {
    lock: &'a KeyedLock<K>,
    keys: BTreeSet<K>,
}

impl<K: Ord + Clone> Drop for KeyedGuard<'_, K> {
    fn drop(&mut self) {
        self.lock.release(&self.keys);
    }
}
