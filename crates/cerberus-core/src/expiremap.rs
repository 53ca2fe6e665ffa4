//! Sharded TTL-bound map.
//!
//! Backs every cache in the instance state: a fixed set of shards, each a
//! mutex-guarded `HashMap` of `(value, expire_at)` entries routed by a
//! caller-supplied 32-bit hash. Expired entries are dropped lazily on access
//! and in bulk by a background sweeper.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::broadcast;

struct Entry<V> {
    value: V,
    expire_at: Instant,
}

struct Shard<K, V> {
    store: Mutex<HashMap<K, Entry<V>>>,
}

/// A sharded map whose entries expire after a per-map lifetime
pub struct ExpireMap<K, V> {
    shards: Vec<Shard<K, V>>,
    hash: fn(&K) -> u32,
    ttl: Duration,
    capacity: usize,
}

/// Reduce `x` into `[0, n)` without the modulo operator.
/// Reference: https://lemire.me/blog/2016/06/27/a-fast-alternative-to-the-modulo-reduction/
fn fast_modulo(x: u32, n: u32) -> u32 {
    ((u64::from(x) * u64::from(n)) >> 32) as u32
}

impl<K, V> ExpireMap<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    /// Create a map with the given key hash and entry lifetime, sized from a
    /// byte budget and an approximate per-entry cost.
    pub fn new(hash: fn(&K) -> u32, ttl: Duration, budget: u64, item_cost: usize) -> Self {
        let num_shards = num_cpus::get() * 16;
        let mut shards = Vec::with_capacity(num_shards);
        for _ in 0..num_shards {
            shards.push(Shard {
                store: Mutex::new(HashMap::new()),
            });
        }

        Self {
            shards,
            hash,
            ttl,
            capacity: (budget / item_cost as u64) as usize,
        }
    }

    fn shard(&self, key: &K) -> &Shard<K, V> {
        let idx = fast_modulo((self.hash)(key), self.shards.len() as u32);
        &self.shards[idx as usize]
    }

    /// Look up a live entry. An entry found past its expiry is removed.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut store = self.shard(key).store.lock();

        match store.get(key) {
            Some(entry) if entry.expire_at > Instant::now() => Some(entry.value.clone()),
            Some(_) => {
                store.remove(key);
                None
            }
            None => None,
        }
    }

    /// Insert or replace an entry with the map's lifetime.
    pub fn add(&self, key: K, value: V) {
        let mut store = self.shard(&key).store.lock();
        store.insert(
            key,
            Entry {
                value,
                expire_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Return the live entry for `key`, inserting one built by `init` if the
    /// key is absent or expired. The shard lock is held across the check and
    /// the insert, so two racing first-insertions cannot both run `init` and
    /// then observe each other's value.
    pub fn get_or_insert_with(&self, key: K, init: impl FnOnce() -> V) -> V {
        let mut store = self.shard(&key).store.lock();
        let now = Instant::now();

        if let Some(entry) = store.get(&key) {
            if entry.expire_at > now {
                return entry.value.clone();
            }
        }

        let value = init();
        store.insert(
            key,
            Entry {
                value: value.clone(),
                expire_at: now + self.ttl,
            },
        );
        value
    }

    /// Delete unconditionally. Returns whether a (possibly expired) entry
    /// was present.
    pub fn remove(&self, key: &K) -> bool {
        self.shard(key).store.lock().remove(key).is_some()
    }

    /// Insert only if no live entry exists. Returns true iff the value was
    /// inserted; at most one concurrent caller observes true per key.
    pub fn set_if_absent(&self, key: K, value: V, ttl: Duration) -> bool {
        let mut store = self.shard(&key).store.lock();
        let now = Instant::now();

        if let Some(entry) = store.get(&key) {
            if entry.expire_at > now {
                return false;
            }
        }

        store.insert(
            key,
            Entry {
                value,
                expire_at: now + ttl,
            },
        );
        true
    }

    /// Sweep all shards, dropping expired entries. Each shard's lock is held
    /// only for that shard's sweep.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        for shard in &self.shards {
            let mut store = shard.store.lock();
            store.retain(|_, entry| entry.expire_at > now);
        }
    }

    /// Number of entries currently stored, expired or not.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.store.lock().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entry count the byte budget allows for. TTL expiry is the only
    /// enforced bound; this is reported at provision time for sizing checks.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Run `purge_expired` on a fixed interval until the shutdown signal fires.
pub fn spawn_sweeper<K, V>(
    map: Arc<ExpireMap<K, V>>,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) where
    K: Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // First tick fires immediately; harmless on an empty map.
        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = ticker.tick() => map.purge_expired(),
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(x: &u32) -> u32 {
        *x
    }

    fn test_map(ttl: Duration) -> ExpireMap<u32, u32> {
        ExpireMap::new(ident, ttl, 1 << 20, 64)
    }

    #[test]
    fn add_get_remove() {
        let map = test_map(Duration::from_secs(60));

        assert_eq!(map.get(&1), None);
        map.add(1, 10);
        assert_eq!(map.get(&1), Some(10));

        map.add(1, 20);
        assert_eq!(map.get(&1), Some(20));

        assert!(map.remove(&1));
        assert!(!map.remove(&1));
        assert_eq!(map.get(&1), None);
    }

    #[test]
    fn expired_entry_removed_on_access() {
        let map = test_map(Duration::from_millis(0));
        map.add(7, 7);
        assert_eq!(map.get(&7), None);
        assert_eq!(map.len(), 0);
    }

    #[test]
    fn set_if_absent_once() {
        let map = test_map(Duration::from_secs(60));
        assert!(map.set_if_absent(3, 1, Duration::from_secs(60)));
        assert!(!map.set_if_absent(3, 2, Duration::from_secs(60)));
        assert_eq!(map.get(&3), Some(1));
    }

    #[test]
    fn set_if_absent_after_expiry() {
        let map = test_map(Duration::from_secs(60));
        assert!(map.set_if_absent(4, 1, Duration::from_millis(0)));
        assert!(map.set_if_absent(4, 2, Duration::from_secs(60)));
        assert_eq!(map.get(&4), Some(2));
    }

    #[test]
    fn purge_drops_only_expired() {
        let map = test_map(Duration::from_secs(60));
        map.add(1, 1);
        assert!(map.set_if_absent(2, 2, Duration::from_millis(0)));

        map.purge_expired();
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(&1), Some(1));
    }

    #[test]
    fn get_or_insert_with_keeps_live_value() {
        let map = test_map(Duration::from_secs(60));
        let first = map.get_or_insert_with(9, || 1);
        let second = map.get_or_insert_with(9, || 2);
        assert_eq!(first, 1);
        assert_eq!(second, 1);
    }

    #[test]
    fn capacity_from_budget() {
        let map = test_map(Duration::from_secs(60));
        assert_eq!(map.capacity(), (1 << 20) / 64);
    }

    #[test]
    fn fast_modulo_in_range() {
        for x in [0u32, 1, 1 << 16, u32::MAX] {
            assert!(fast_modulo(x, 48) < 48);
        }
    }
}
