//! Bounded LRU cache of topological-sort outcomes, keyed by sorted kind list.
//!
//! No crate in the example pack offers an `lru` type, so this is hand-rolled using
//! `indexmap::IndexMap`'s move-to-back-on-touch trick (the same technique the
//! crate's own documentation suggests for building an LRU on top of it).

use indexmap::IndexMap;

use crate::error::WeaveError;

/// The cached outcome of a topological sort over a fixed set of kinds.
#[derive(Clone)]
pub enum CachedSort {
    Valid(Vec<String>),
    Invalid(String),
}

const DEFAULT_CAPACITY: usize = 100;

/// A bounded, least-recently-used cache from cache key to [`CachedSort`].
pub struct GraphCache {
    capacity: usize,
    entries: IndexMap<String, CachedSort>,
}

impl GraphCache {
    pub fn new(capacity: usize) -> Self {
        GraphCache {
            capacity: capacity.max(1),
            entries: IndexMap::new(),
        }
    }

    /// Build the cache key for a set of kinds: comma-joined, lexicographically sorted.
    pub fn key(kinds: impl IntoIterator<Item = impl AsRef<str>>) -> String {
        let mut sorted: Vec<String> = kinds.into_iter().map(|k| k.as_ref().to_string()).collect();
        sorted.sort();
        sorted.join(",")
    }

    /// Look up `key`, promoting it to most-recently-used on a hit.
    pub fn get(&mut self, key: &str) -> Option<CachedSort> {
        let value = self.entries.shift_remove(key)?;
        self.entries.insert(key.to_string(), value.clone());
        Some(value)
    }

    /// Insert or update `key`, evicting the least-recently-used entry if the
    /// cache is at capacity.
    pub fn set(&mut self, key: String, value: CachedSort) {
        self.entries.shift_remove(&key);
        self.entries.insert(key, value);
        while self.entries.len() > self.capacity {
            self.entries.shift_remove_index(0);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for GraphCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Look up or compute-and-store a topological sort for `kinds`, using `sort_fn`
/// on a cache miss. Shared helper so the planner doesn't duplicate the
/// lookup/compute/store dance.
pub fn sort_with_cache<F>(
    cache: &mut GraphCache,
    kinds: &[String],
    sort_fn: F,
) -> Result<Vec<String>, WeaveError>
where
    F: FnOnce() -> Result<Vec<String>, WeaveError>,
{
    let key = GraphCache::key(kinds);
    if let Some(cached) = cache.get(&key) {
        return match cached {
            CachedSort::Valid(order) => Ok(order),
            CachedSort::Invalid(reason) => Err(WeaveError::BadFacet { reason }),
        };
    }

    match sort_fn() {
        Ok(order) => {
            cache.set(key, CachedSort::Valid(order.clone()));
            Ok(order)
        }
        Err(err) => {
            cache.set(key, CachedSort::Invalid(err.to_string()));
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_order_independent() {
        assert_eq!(
            GraphCache::key(["b", "a"]),
            GraphCache::key(["a", "b"]),
        );
    }

    #[test]
    fn get_promotes_to_most_recently_used() {
        let mut cache = GraphCache::new(2);
        cache.set("a".into(), CachedSort::Valid(vec!["a".into()]));
        cache.set("b".into(), CachedSort::Valid(vec!["b".into()]));
        cache.get("a"); // promote a
        cache.set("c".into(), CachedSort::Valid(vec!["c".into()])); // should evict b
        assert!(cache.get("b").is_none());
        assert!(cache.get("a").is_some());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn capacity_is_enforced() {
        let mut cache = GraphCache::new(1);
        cache.set("a".into(), CachedSort::Valid(vec![]));
        cache.set("b".into(), CachedSort::Valid(vec![]));
        assert_eq!(cache.len(), 1);
        assert!(cache.get("a").is_none());
    }

    #[test]
    fn sort_with_cache_reuses_hit() {
        let mut cache = GraphCache::default();
        let mut calls = 0;
        let kinds = vec!["a".to_string()];
        sort_with_cache(&mut cache, &kinds, || {
            calls += 1;
            Ok(vec!["a".into()])
        })
        .unwrap();
        sort_with_cache(&mut cache, &kinds, || {
            calls += 1;
            Ok(vec!["a".into()])
        })
        .unwrap();
        assert_eq!(calls, 1);
    }
}
