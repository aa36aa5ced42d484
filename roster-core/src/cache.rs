//! In-process cache of the role table, custom data and whitelist.
//!
//! The cache is a plain object owned by the [`PlayerStore`](crate::PlayerStore)
//! and shared by handle, not process-global state. Slots hold `Arc`s so a
//! read is a pointer clone under a short read lock and never waits on I/O.
//!
//! There is no expiry. A slot is valid only while every write to its backing
//! document goes through this crate; an external edit to `roles.json` or
//! `custom.json` stays invisible until the process restarts.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexSet;
use parking_lot::RwLock;

use crate::custom::CustomData;
use crate::role::RoleTable;
use crate::types::AccountId;

/// Hit/miss counters for the cached documents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Reads answered from the cache.
    pub hits: u64,
    /// Reads that had to load the backing document.
    pub misses: u64,
}

/// Process-lifetime materialized copies of the cached documents.
#[derive(Debug, Default)]
pub struct Cache {
    roles: RwLock<Option<Arc<RoleTable>>>,
    custom: RwLock<Option<Arc<CustomData>>>,
    whitelist: RwLock<IndexSet<AccountId>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Cache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Roles
    // ------------------------------------------------------------------

    /// Cached role table, if populated. Counts a hit or a miss.
    #[must_use]
    pub fn roles(&self) -> Option<Arc<RoleTable>> {
        self.count(self.roles.read().clone())
    }

    /// Replace the cached role table.
    pub fn set_roles(&self, roles: Arc<RoleTable>) {
        *self.roles.write() = Some(roles);
    }

    // ------------------------------------------------------------------
    // Custom
    // ------------------------------------------------------------------

    /// Cached custom data, if populated. Counts a hit or a miss.
    #[must_use]
    pub fn custom(&self) -> Option<Arc<CustomData>> {
        self.count(self.custom.read().clone())
    }

    /// Replace the cached custom data.
    pub fn set_custom(&self, custom: Arc<CustomData>) {
        *self.custom.write() = Some(custom);
    }

    // ------------------------------------------------------------------
    // Whitelist
    // ------------------------------------------------------------------

    /// Union `ids` into the whitelist. Returns how many were new.
    pub fn extend_whitelist<I: IntoIterator<Item = AccountId>>(&self, ids: I) -> usize {
        let mut whitelist = self.whitelist.write();
        ids.into_iter().filter(|id| whitelist.insert(id.clone())).count()
    }

    /// Whether `id` is on the whitelist.
    #[must_use]
    pub fn is_whitelisted(&self, id: &str) -> bool {
        self.whitelist.read().contains(id)
    }

    /// Snapshot of the whitelist in load order.
    #[must_use]
    pub fn whitelist(&self) -> Vec<AccountId> {
        self.whitelist.read().iter().cloned().collect()
    }

    // ------------------------------------------------------------------
    // Stats
    // ------------------------------------------------------------------

    /// Current hit/miss counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    fn count<T>(&self, slot: Option<T>) -> Option<T> {
        let counter = if slot.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        slot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_slots_count_as_misses() {
        let cache = Cache::new();
        assert!(cache.roles().is_none());
        assert!(cache.custom().is_none());
        assert_eq!(cache.stats(), CacheStats { hits: 0, misses: 2 });
    }

    #[test]
    fn populated_slots_are_shared_not_copied() {
        let cache = Cache::new();
        let table = Arc::new(RoleTable::default());
        cache.set_roles(Arc::clone(&table));

        let read = cache.roles().expect("populated");
        assert!(Arc::ptr_eq(&read, &table));
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn whitelist_union_is_idempotent() {
        let cache = Cache::new();
        let ids = || vec![AccountId::from("a"), AccountId::from("b"), AccountId::from("a")];

        assert_eq!(cache.extend_whitelist(ids()), 2);
        assert_eq!(cache.extend_whitelist(ids()), 0);
        assert_eq!(cache.whitelist(), vec![AccountId::from("a"), AccountId::from("b")]);
        assert!(cache.is_whitelisted("b"));
        assert!(!cache.is_whitelisted("c"));
    }
}
