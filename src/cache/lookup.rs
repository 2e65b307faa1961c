use super::CacheKey;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{Level, event};

/// Cached outcome of a resolution query
#[derive(Debug, Clone, PartialEq)]
pub enum CacheEntry<V> {
    Resolved(V),
    /// Negative result; only stored when negative caching is enabled
    Unresolved(String),
}

/// Bounded least-recently-used map from lookup keys to resolution results
///
/// Every `get` mutates the recency order, so the whole map sits behind one
/// mutex. The lock is never held while a resolver runs; instead every
/// invalidation bumps a generation under the lock, and `put_if_unchanged`
/// drops a result that was resolved before the bump.
pub struct LookupCache<V> {
    /// `None` when capacity is zero and caching is disabled
    entries: Option<Mutex<LruCache<CacheKey, CacheEntry<V>>>>,
    /// Only written with the entries lock held
    generation: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    invalidations: AtomicU64,
}

impl<V: Clone> LookupCache<V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: NonZeroUsize::new(capacity).map(|cap| Mutex::new(LruCache::new(cap))),
            generation: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
        }
    }

    /// A cache that never stores anything
    pub fn disabled() -> Self {
        Self::new(0)
    }

    pub fn is_enabled(&self) -> bool {
        self.entries.is_some()
    }

    pub fn capacity(&self) -> usize {
        self.lock().map(|entries| entries.cap().get()).unwrap_or(0)
    }

    /// Look up `key`, marking its entry most recently used
    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry<V>> {
        let Some(mut entries) = self.lock() else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };
        match entries.get(key) {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                event!(Level::DEBUG, key = %key, "lookup cache hit");
                Some(entry.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                event!(Level::DEBUG, key = %key, "lookup cache miss");
                None
            }
        }
    }

    /// Insert or replace the entry for `key`, evicting the least recently
    /// used entry when over capacity
    pub fn put(&self, key: CacheKey, entry: CacheEntry<V>) {
        if let Some(mut entries) = self.lock() {
            self.insert(&mut entries, key, entry);
        }
    }

    /// Invalidation counter; read it before resolving a value that will be
    /// handed to `put_if_unchanged`
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Insert `entry` only if no invalidation ran since `generation` was
    /// read. Returns whether the entry was stored.
    pub fn put_if_unchanged(&self, key: CacheKey, entry: CacheEntry<V>, generation: u64) -> bool {
        let Some(mut entries) = self.lock() else {
            return false;
        };
        if self.generation.load(Ordering::Acquire) != generation {
            event!(Level::DEBUG, key = %key, "stale lookup result discarded");
            return false;
        }
        self.insert(&mut entries, key, entry);
        true
    }

    fn insert(
        &self,
        entries: &mut LruCache<CacheKey, CacheEntry<V>>,
        key: CacheKey,
        entry: CacheEntry<V>,
    ) {
        let replacing = entries.contains(&key);
        if let Some((evicted, _)) = entries.push(key, entry) {
            if !replacing {
                self.evictions.fetch_add(1, Ordering::Relaxed);
                event!(Level::DEBUG, key = %evicted, "lookup cache eviction");
            }
        }
    }

    /// Drop every entry whose key was built for the contract `name`
    ///
    /// Linear in the cache size; invalidation is rare next to lookups.
    pub fn remove_by_contract_name(&self, name: &str) -> usize {
        let Some(mut entries) = self.lock() else {
            return 0;
        };
        // Bumped even when nothing matches: a resolution in flight may be
        // about to cache an answer for this contract
        self.generation.fetch_add(1, Ordering::AcqRel);

        let doomed: Vec<CacheKey> = entries
            .iter()
            .filter(|(key, _)| key.matches_removal_name(name))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &doomed {
            entries.pop(key);
        }

        if !doomed.is_empty() {
            self.invalidations
                .fetch_add(doomed.len() as u64, Ordering::Relaxed);
            event!(Level::DEBUG, contract = %name, removed = doomed.len(), "lookup cache invalidated");
        }

        doomed.len()
    }

    pub fn clear(&self) {
        if let Some(mut entries) = self.lock() {
            self.generation.fetch_add(1, Ordering::AcqRel);
            let dropped = entries.len();
            entries.clear();
            self.invalidations.fetch_add(dropped as u64, Ordering::Relaxed);
        }
    }

    pub fn len(&self) -> usize {
        self.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            entries: self.len(),
            capacity: self.capacity(),
        }
    }

    fn lock(&self) -> Option<MutexGuard<'_, LruCache<CacheKey, CacheEntry<V>>>> {
        // The map is consistent after every statement, so a poisoned lock is still usable
        self.entries
            .as_ref()
            .map(|entries| entries.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

/// Lookup cache statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub invalidations: u64,
    pub entries: usize,
    pub capacity: usize,
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Cache Stats: {}/{} entries, {} hits, {} misses, {} evictions, {} invalidations",
            self.entries, self.capacity, self.hits, self.misses, self.evictions, self.invalidations
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Qualifier, TypeDescriptor};

    fn key(contract: &str) -> CacheKey {
        CacheKey::of_type(TypeDescriptor::class(contract))
    }

    #[test]
    fn test_put_then_get() {
        let cache = LookupCache::new(4);
        cache.put(key("Database"), CacheEntry::Resolved(1));

        assert_eq!(cache.get(&key("Database")), Some(CacheEntry::Resolved(1)));
        assert_eq!(cache.get(&key("Logger")), None);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_put_replaces_existing_entry() {
        let cache = LookupCache::new(2);
        cache.put(key("Database"), CacheEntry::Resolved(1));
        cache.put(key("Database"), CacheEntry::Resolved(2));

        assert_eq!(cache.get(&key("Database")), Some(CacheEntry::Resolved(2)));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().evictions, 0);
    }

    #[test]
    fn test_least_recently_used_is_evicted() {
        let cache = LookupCache::new(2);
        cache.put(key("A"), CacheEntry::Resolved(1));
        cache.put(key("B"), CacheEntry::Resolved(2));
        cache.put(key("C"), CacheEntry::Resolved(3));

        assert_eq!(cache.get(&key("A")), None);
        assert!(cache.get(&key("B")).is_some());
        assert!(cache.get(&key("C")).is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_get_resets_recency() {
        let cache = LookupCache::new(2);
        cache.put(key("A"), CacheEntry::Resolved(1));
        cache.put(key("B"), CacheEntry::Resolved(2));

        // A becomes most recently used, so B is the eviction victim
        assert!(cache.get(&key("A")).is_some());
        cache.put(key("C"), CacheEntry::Resolved(3));

        assert!(cache.get(&key("A")).is_some());
        assert_eq!(cache.get(&key("B")), None);
        assert!(cache.get(&key("C")).is_some());
    }

    #[test]
    fn test_zero_capacity_disables_caching() {
        let cache = LookupCache::disabled();
        cache.put(key("A"), CacheEntry::Resolved(1));

        assert!(!cache.is_enabled());
        assert_eq!(cache.get(&key("A")), None);
        assert_eq!(cache.get(&key("A")), None);
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.capacity(), 0);
        assert_eq!(cache.remove_by_contract_name("A"), 0);
        assert_eq!(cache.stats().misses, 2);
        assert_eq!(cache.stats().hits, 0);
    }

    #[test]
    fn test_put_if_unchanged_rejects_after_invalidation() {
        let cache = LookupCache::new(4);
        let before = cache.generation();

        // Nothing cached for the contract yet, the bump still happens
        assert_eq!(cache.remove_by_contract_name("Database"), 0);
        assert!(!cache.put_if_unchanged(key("Database"), CacheEntry::Resolved(1), before));
        assert_eq!(cache.get(&key("Database")), None);

        let current = cache.generation();
        assert!(cache.put_if_unchanged(key("Database"), CacheEntry::Resolved(2), current));
        assert_eq!(cache.get(&key("Database")), Some(CacheEntry::Resolved(2)));

        cache.clear();
        assert!(!cache.put_if_unchanged(key("Logger"), CacheEntry::Resolved(3), current));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_remove_by_contract_name() {
        let cache = LookupCache::new(16);
        cache.put(key("Database"), CacheEntry::Resolved(1));
        cache.put(CacheKey::named(TypeDescriptor::class("Database"), "primary"), CacheEntry::Resolved(2));
        cache.put(
            CacheKey::new(TypeDescriptor::class("Database"), None, None, vec![Qualifier::new("Fast")]),
            CacheEntry::Resolved(3),
        );
        cache.put(key("Logger"), CacheEntry::Resolved(4));
        cache.put(CacheKey::of_type(TypeDescriptor::variable("Database")), CacheEntry::Resolved(5));

        assert_eq!(cache.remove_by_contract_name("Database"), 3);
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&key("Logger")).is_some());
        // Type variables have no removal name and survive
        assert!(cache.get(&CacheKey::of_type(TypeDescriptor::variable("Database"))).is_some());
    }

    #[test]
    fn test_remove_unknown_contract_is_noop() {
        let cache = LookupCache::new(4);
        cache.put(key("Database"), CacheEntry::Resolved(1));

        assert_eq!(cache.remove_by_contract_name("Nothing"), 0);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().invalidations, 0);
    }

    #[test]
    fn test_clear() {
        let cache = LookupCache::new(4);
        cache.put(key("A"), CacheEntry::Resolved(1));
        cache.put(key("B"), CacheEntry::Unresolved("no match".into()));
        cache.clear();

        assert!(cache.is_empty());
        assert_eq!(cache.stats().invalidations, 2);
    }

    #[test]
    fn test_stats_count_hits_and_misses() {
        let cache = LookupCache::new(4);
        cache.put(key("A"), CacheEntry::Resolved(1));
        cache.get(&key("A"));
        cache.get(&key("A"));
        cache.get(&key("B"));

        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.capacity, 4);
    }
}
