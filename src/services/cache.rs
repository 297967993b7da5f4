//! Read-through view cache.
//!
//! Readers take a [`Ticket`] before loading and hand it back on insert. Any
//! invalidation in between bumps a version the ticket covers, so the stale
//! view is dropped instead of stored. Versions live in a fixed set of
//! stripes; the map only ever holds live views.

use dashmap::DashMap;
use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hash};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use super::cart::CartView;
use super::catalog::ProductView;
use super::wishlist::WishlistView;

const STRIPES: usize = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ticket { epoch: u64, stripe: usize, version: u64 }

pub struct ViewCache<K, V> {
    values: DashMap<K, V>,
    versions: [AtomicU64; STRIPES],
    epoch: AtomicU64,
    hasher: RandomState,
}

impl<K: Eq + Hash + Clone, V: Clone> Default for ViewCache<K, V> {
    fn default() -> Self {
        Self {
            values: DashMap::new(),
            versions: std::array::from_fn(|_| AtomicU64::new(0)),
            epoch: AtomicU64::new(0),
            hasher: RandomState::new(),
        }
    }
}

impl<K: Eq + Hash + Clone, V: Clone> ViewCache<K, V> {
    fn stripe(&self, key: &K) -> usize {
        (self.hasher.hash_one(key) % STRIPES as u64) as usize
    }

    fn is_current(&self, ticket: Ticket) -> bool {
        self.epoch.load(Ordering::Acquire) == ticket.epoch
            && self.versions[ticket.stripe].load(Ordering::Acquire) == ticket.version
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.values.get(key).map(|v| v.value().clone())
    }

    pub fn ticket(&self, key: &K) -> Ticket {
        let stripe = self.stripe(key);
        Ticket {
            epoch: self.epoch.load(Ordering::Acquire),
            stripe,
            version: self.versions[stripe].load(Ordering::Acquire),
        }
    }

    /// Stores `value` unless the key was invalidated after `ticket` was taken.
    pub fn insert(&self, key: K, ticket: Ticket, value: V) -> bool {
        if ticket.stripe != self.stripe(&key) {
            return false;
        }
        // the check runs under the shard lock, so a concurrent invalidate
        // either sees the value and removes it or bumps the version first
        let entry = self.values.entry(key);
        if !self.is_current(ticket) {
            return false;
        }
        entry.insert(value);
        true
    }

    pub fn invalidate(&self, key: &K) {
        self.versions[self.stripe(key)].fetch_add(1, Ordering::AcqRel);
        self.values.remove(key);
    }

    pub fn invalidate_all(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        self.values.clear();
    }

    pub fn len(&self) -> usize { self.values.len() }

    pub fn is_empty(&self) -> bool { self.values.is_empty() }
}

/// All cached views of the service.
#[derive(Default)]
pub struct Caches {
    pub products: ViewCache<String, Arc<ProductView>>,
    pub carts: ViewCache<Uuid, Arc<CartView>>,
    pub wishlists: ViewCache<Uuid, Arc<WishlistView>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_insert_is_dropped() {
        let cache: ViewCache<u32, &str> = ViewCache::default();
        let ticket = cache.ticket(&1);
        cache.invalidate(&1);
        assert!(!cache.insert(1, ticket, "stale"));
        assert_eq!(cache.get(&1), None);

        let ticket = cache.ticket(&1);
        assert!(cache.insert(1, ticket, "fresh"));
        assert_eq!(cache.get(&1), Some("fresh"));
    }

    #[test]
    fn test_invalidating_unseen_keys_keeps_the_map_small() {
        let cache: ViewCache<u32, &str> = ViewCache::default();
        for k in 0..10_000 { cache.invalidate(&k); }
        assert!(cache.is_empty());

        let ticket = cache.ticket(&7);
        assert!(cache.insert(7, ticket, "seven"));
        cache.invalidate(&7);
        assert_eq!(cache.len(), 0);
        let ticket = cache.ticket(&8);
        assert!(cache.insert(8, ticket, "eight"));
        cache.invalidate_all();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_invalidate_all_covers_unseen_keys() {
        let cache: ViewCache<u32, &str> = ViewCache::default();
        let a = cache.ticket(&1);
        let b = cache.ticket(&2);
        assert!(cache.insert(1, a, "one"));
        cache.invalidate_all();
        assert_eq!(cache.get(&1), None);
        assert!(!cache.insert(2, b, "two"));
    }
}
