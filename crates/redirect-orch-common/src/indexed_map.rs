//! Map with a unique secondary key.
//!
//! Objects that can be addressed two ways (by an assigned id and by their
//! natural identity) are kept in one `IndexedMap` so the two views can never
//! drift apart. Like a plain lookup table it never creates entries on
//! access: `get()` returns `Option`, and insertion is explicit.

use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IndexedMapError {
    #[error("Primary key already present")]
    DuplicateKey,

    #[error("Secondary key already present")]
    DuplicateSecondary,
}

/// A map from `K` to `V` with a unique secondary key `S` per entry.
///
/// Iteration follows primary key order.
///
/// # Example
///
/// ```
/// use redirect_orch_common::IndexedMap;
///
/// let mut map: IndexedMap<u32, &str, &str> = IndexedMap::new();
/// map.insert(1, "one", "first").unwrap();
///
/// assert_eq!(map.get(&1), Some(&"first"));
/// assert_eq!(map.key_for(&"one"), Some(&1));
/// assert!(map.insert(2, "one", "second").is_err());
///
/// map.remove(&1);
/// assert!(map.key_for(&"one").is_none());
/// ```
#[derive(Debug, Clone)]
pub struct IndexedMap<K, S, V> {
    entries: BTreeMap<K, (S, V)>,
    secondary: BTreeMap<S, K>,
}

impl<K, S, V> IndexedMap<K, S, V>
where
    K: Ord + Clone,
    S: Ord + Clone,
{
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            secondary: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Returns the value for `key`. **This never creates entries.**
    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key).map(|(_, v)| v)
    }

    /// Returns a mutable reference to the value for `key`.
    ///
    /// The secondary key is stored apart from the value and cannot be
    /// changed through this reference.
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.entries.get_mut(key).map(|(_, v)| v)
    }

    pub fn get_by_secondary(&self, secondary: &S) -> Option<&V> {
        self.secondary.get(secondary).and_then(|k| self.get(k))
    }

    /// Returns the primary key registered under `secondary`.
    pub fn key_for(&self, secondary: &S) -> Option<&K> {
        self.secondary.get(secondary)
    }

    /// Inserts a new entry.
    ///
    /// Fails without modifying the map if either key is already present.
    pub fn insert(&mut self, key: K, secondary: S, value: V) -> Result<(), IndexedMapError> {
        if self.entries.contains_key(&key) {
            return Err(IndexedMapError::DuplicateKey);
        }
        if self.secondary.contains_key(&secondary) {
            return Err(IndexedMapError::DuplicateSecondary);
        }
        self.secondary.insert(secondary.clone(), key.clone());
        self.entries.insert(key, (secondary, value));
        Ok(())
    }

    /// Removes an entry and its secondary key.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let (secondary, value) = self.entries.remove(key)?;
        self.secondary.remove(&secondary);
        Some(value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter().map(|(k, (_, v))| (k, v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.keys()
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.values().map(|(_, v)| v)
    }
}

impl<K, S, V> Default for IndexedMap<K, S, V>
where
    K: Ord + Clone,
    S: Ord + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_no_auto_vivification() {
        let map: IndexedMap<String, String, u32> = IndexedMap::new();
        assert!(map.get(&"missing".to_string()).is_none());
        assert!(map.get_by_secondary(&"missing".to_string()).is_none());
        assert!(map.is_empty());
    }

    #[test]
    fn test_duplicate_keys_rejected() {
        let mut map = IndexedMap::new();
        map.insert("h1", "pair-a", 1).unwrap();

        assert_eq!(map.insert("h1", "pair-b", 2), Err(IndexedMapError::DuplicateKey));
        assert_eq!(
            map.insert("h2", "pair-a", 2),
            Err(IndexedMapError::DuplicateSecondary)
        );
        assert_eq!(map.len(), 1);
        assert!(map.key_for(&"pair-b").is_none());
    }

    #[test]
    fn test_remove_frees_secondary() {
        let mut map = IndexedMap::new();
        map.insert("h1", "pair-a", 1).unwrap();
        map.insert("h2", "pair-b", 2).unwrap();

        assert_eq!(map.remove(&"h1"), Some(1));
        assert!(!map.contains_key(&"h1"));
        assert!(map.get_by_secondary(&"pair-a").is_none());
        assert_eq!(map.key_for(&"pair-b"), Some(&"h2"));
        assert!(map.remove(&"h1").is_none());

        map.insert("h3", "pair-a", 3).unwrap();
        assert_eq!(map.get_by_secondary(&"pair-a"), Some(&3));
    }

    #[test]
    fn test_get_mut_keeps_index() {
        let mut map = IndexedMap::new();
        map.insert(1, "a", 10).unwrap();
        if let Some(v) = map.get_mut(&1) {
            *v = 20;
        }
        assert_eq!(map.get_by_secondary(&"a"), Some(&20));
        assert_eq!(map.values().copied().collect::<Vec<_>>(), vec![20]);
    }
}
