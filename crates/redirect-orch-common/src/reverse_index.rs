//! Reference tracking.
//!
//! A `ReverseIndex` records which keys reference a given object, so that
//! "everything that uses X" can be answered without scanning, and removal of
//! X can be refused while it is referenced.

use std::collections::{BTreeMap, BTreeSet};

/// Index from a referenced object `R` to the keys `K` that reference it.
#[derive(Debug, Clone)]
pub struct ReverseIndex<R, K> {
    refs: BTreeMap<R, BTreeSet<K>>,
}

impl<R, K> ReverseIndex<R, K>
where
    R: Ord + Clone,
    K: Ord + Clone,
{
    pub fn new() -> Self {
        Self {
            refs: BTreeMap::new(),
        }
    }

    /// Records that `key` references `target`.
    pub fn add(&mut self, target: R, key: K) {
        self.refs.entry(target).or_default().insert(key);
    }

    /// Drops one reference; the target disappears once nothing references it.
    pub fn remove(&mut self, target: &R, key: &K) -> bool {
        let Some(keys) = self.refs.get_mut(target) else {
            return false;
        };
        let removed = keys.remove(key);
        if keys.is_empty() {
            self.refs.remove(target);
        }
        removed
    }

    /// Keys referencing `target`, in ascending order.
    pub fn keys_for(&self, target: &R) -> impl Iterator<Item = &K> {
        self.refs.get(target).into_iter().flatten()
    }

    pub fn is_referenced(&self, target: &R) -> bool {
        self.refs.contains_key(target)
    }

}

impl<R, K> Default for ReverseIndex<R, K>
where
    R: Ord + Clone,
    K: Ord + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
