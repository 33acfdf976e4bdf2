//! An in-memory cache of decoded book-keeping, keyed by fragment name, so a
//! coordinator can avoid re-reading and re-inflating the same fragment's
//! book-keeping on every request.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::bookkeeping::Bookkeeping;

/// Result of a cache lookup.
pub enum CacheResult {
    /// The fragment's book-keeping was not in the cache.
    NotCached,
    /// The fragment's book-keeping was found.
    Found(Arc<Bookkeeping>),
}

/// A cache of fragment book-keeping, keyed by fragment name.
pub trait BookkeepingCache: Send + Sync {
    /// Looks up cached book-keeping for `fragment_name`.
    fn get(&self, fragment_name: &str) -> CacheResult;

    /// Inserts book-keeping for `fragment_name`, replacing any prior entry.
    fn insert(&self, fragment_name: &str, bookkeeping: Arc<Bookkeeping>);

    /// Drops a cached entry, e.g. after the fragment is consolidated away.
    fn invalidate(&self, fragment_name: &str);
}

/// A cache that never stores anything; every lookup is a miss.
pub struct NoCache;

impl BookkeepingCache for NoCache {
    fn get(&self, _fragment_name: &str) -> CacheResult {
        CacheResult::NotCached
    }

    fn insert(&self, _fragment_name: &str, _bookkeeping: Arc<Bookkeeping>) {}

    fn invalidate(&self, _fragment_name: &str) {}
}

/// A simple unbounded `HashMap`-based book-keeping cache.
#[derive(Default)]
pub struct HashMapCache {
    cache: RwLock<HashMap<String, Arc<Bookkeeping>>>,
}

impl BookkeepingCache for HashMapCache {
    fn get(&self, fragment_name: &str) -> CacheResult {
        match self.cache.read().get(fragment_name) {
            Some(bk) => CacheResult::Found(Arc::clone(bk)),
            None => CacheResult::NotCached,
        }
    }

    fn insert(&self, fragment_name: &str, bookkeeping: Arc<Bookkeeping>) {
        self.cache
            .write()
            .insert(fragment_name.to_string(), bookkeeping);
    }

    fn invalidate(&self, fragment_name: &str) {
        self.cache.write().remove(fragment_name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_cache_always_misses() {
        let cache = NoCache;
        cache.insert("frag_0", Arc::new(Bookkeeping::default()));
        assert!(matches!(cache.get("frag_0"), CacheResult::NotCached));
    }

    #[test]
    fn hash_map_cache_hits_after_insert() {
        let cache = HashMapCache::default();
        assert!(matches!(cache.get("frag_0"), CacheResult::NotCached));
        cache.insert("frag_0", Arc::new(Bookkeeping::default()));
        assert!(matches!(cache.get("frag_0"), CacheResult::Found(_)));
    }

    #[test]
    fn invalidate_removes_entry() {
        let cache = HashMapCache::default();
        cache.insert("frag_0", Arc::new(Bookkeeping::default()));
        cache.invalidate("frag_0");
        assert!(matches!(cache.get("frag_0"), CacheResult::NotCached));
    }
}
