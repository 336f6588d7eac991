//! Staleness tracking for store reads, shared by every view. Mutations bump
//! an epoch per key; a reader that remembers the epoch it loaded at can tell
//! whether its data still reflects the store.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

use crate::models::Field;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKey {
    /// The paginated record list.
    Records,
    /// One of the three taxonomy value lists.
    Taxonomy(Field),
}

#[derive(Debug, Default)]
pub struct QueryCache {
    records: AtomicU64,
    categories: AtomicU64,
    banks: AtomicU64,
    types: AtomicU64,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: CacheKey) -> &AtomicU64 {
        match key {
            CacheKey::Records => &self.records,
            CacheKey::Taxonomy(Field::Category) => &self.categories,
            CacheKey::Taxonomy(Field::Bank) => &self.banks,
            CacheKey::Taxonomy(Field::TransactionType) => &self.types,
        }
    }

    /// Mark everything loaded under `key` stale.
    pub fn invalidate(&self, key: CacheKey) {
        self.slot(key).fetch_add(1, Ordering::SeqCst);
        debug!(?key, "cache invalidated");
    }

    /// Current epoch for `key`. Data loaded at epoch `e` is fresh while
    /// `epoch(key) == e`.
    pub fn epoch(&self, key: CacheKey) -> u64 {
        self.slot(key).load(Ordering::SeqCst)
    }

    pub fn is_stale(&self, key: CacheKey, loaded_epoch: u64) -> bool {
        self.epoch(key) != loaded_epoch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalidate_bumps_only_its_key() {
        let cache = QueryCache::new();
        let before = cache.epoch(CacheKey::Taxonomy(Field::Bank));

        cache.invalidate(CacheKey::Records);

        assert_eq!(cache.epoch(CacheKey::Records), 1);
        assert_eq!(cache.epoch(CacheKey::Taxonomy(Field::Bank)), before);
        assert_eq!(cache.epoch(CacheKey::Taxonomy(Field::Category)), 0);
    }

    #[test]
    fn test_is_stale_after_invalidate() {
        let cache = QueryCache::new();
        let loaded = cache.epoch(CacheKey::Taxonomy(Field::Category));
        assert!(!cache.is_stale(CacheKey::Taxonomy(Field::Category), loaded));

        cache.invalidate(CacheKey::Taxonomy(Field::Category));

        assert!(cache.is_stale(CacheKey::Taxonomy(Field::Category), loaded));
        assert!(!cache.is_stale(CacheKey::Records, 0));
    }
}
