//! Bounded in-process cache with TTL expiry and LRU eviction.
//!
//! Recency is tracked with a monotonically increasing tick per access: the
//! entry map stores each key's current tick and an ordered map from tick to
//! key gives the least-recently-used key at its head. Every access is
//! O(log n) and never scans.
//!
//! All operations run inside one mutex per cache instance, so no caller can
//! observe a half-updated recency order.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use parking_lot::Mutex;
use rampart_core::{system_clock, SharedClock};

use crate::config::CacheConfig;
use crate::entry::{CacheEntry, Ttl};

#[derive(Debug)]
struct Slot<V> {
    entry: CacheEntry<V>,
    tick: u64,
}

#[derive(Debug)]
struct LruState<V> {
    entries: HashMap<String, Slot<V>>,
    /// tick -> key, oldest first.
    recency: BTreeMap<u64, String>,
    next_tick: u64,
    evictions: u64,
    expirations: u64,
}

impl<V> LruState<V> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            recency: BTreeMap::new(),
            next_tick: 0,
            evictions: 0,
            expirations: 0,
        }
    }

    fn bump(&mut self) -> u64 {
        self.next_tick += 1;
        self.next_tick
    }

    /// Move `key` to the most-recently-used position.
    fn promote(&mut self, key: &str) {
        let tick = self.bump();
        if let Some(slot) = self.entries.get_mut(key) {
            let owned = self
                .recency
                .remove(&slot.tick)
                .unwrap_or_else(|| key.to_string());
            slot.tick = tick;
            self.recency.insert(tick, owned);
        }
    }

    fn remove(&mut self, key: &str) -> Option<CacheEntry<V>> {
        let slot = self.entries.remove(key)?;
        self.recency.remove(&slot.tick);
        Some(slot.entry)
    }

    fn evict_lru(&mut self) -> Option<String> {
        let (_, key) = self.recency.pop_first()?;
        self.entries.remove(&key);
        self.evictions += 1;
        Some(key)
    }

    fn insert(&mut self, key: String, entry: CacheEntry<V>, max_size: usize) {
        if let Some(slot) = self.entries.get_mut(&key) {
            // Overwrite: refresh recency, never evict.
            slot.entry = entry;
            self.promote(&key);
            return;
        }

        while self.entries.len() >= max_size {
            match self.evict_lru() {
                Some(evicted) => tracing::debug!(key = %evicted, "L1 evicted least-recently-used entry"),
                None => break,
            }
        }

        let tick = self.bump();
        self.recency.insert(tick, key.clone());
        self.entries.insert(key, Slot { entry, tick });
    }
}

/// Bounded, TTL-aware, LRU-evicted in-process cache (the L1 tier).
///
/// # Example
///
/// ```
/// use rampart_cache::{LocalCache, Ttl};
///
/// let cache = LocalCache::new(2, None);
/// cache.set("a", 1, Ttl::Default);
/// cache.set("b", 2, Ttl::Default);
/// cache.get("a");
/// cache.set("c", 3, Ttl::Default);
///
/// assert_eq!(cache.get("b"), None);
/// assert_eq!(cache.get("a"), Some(1));
/// ```
#[derive(Debug)]
pub struct LocalCache<V> {
    state: Mutex<LruState<V>>,
    max_size: usize,
    default_ttl: Option<Duration>,
    clock: SharedClock,
}

impl<V: Clone> LocalCache<V> {
    /// Create a cache holding at most `max_size` entries (minimum 1).
    pub fn new(max_size: usize, default_ttl: Option<Duration>) -> Self {
        Self::with_clock(max_size, default_ttl, system_clock())
    }

    /// Create a cache reading time from `clock`.
    pub fn with_clock(max_size: usize, default_ttl: Option<Duration>, clock: SharedClock) -> Self {
        Self {
            state: Mutex::new(LruState::new()),
            max_size: max_size.max(1),
            default_ttl,
            clock,
        }
    }

    /// Create a cache from the L1 portion of a [`CacheConfig`].
    pub fn from_config(config: &CacheConfig, clock: SharedClock) -> Self {
        Self::with_clock(config.max_size, config.default_ttl, clock)
    }

    /// Look up a live entry and mark it most recently used.
    ///
    /// An expired entry is removed by the read that discovers it.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        let mut state = self.state.lock();

        let expired = state.entries.get(key)?.entry.is_expired_at(now);
        if expired {
            state.remove(key);
            state.expirations += 1;
            tracing::debug!(key = %key, "L1 entry expired");
            return None;
        }

        state.promote(key);
        let slot = state.entries.get_mut(key)?;
        slot.entry.touch(now);
        Some(slot.entry.value().clone())
    }

    /// Insert or overwrite an entry.
    ///
    /// A brand-new key on a full cache evicts the least-recently-used key
    /// first. Overwriting an existing key never evicts.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: impl Into<Ttl>) {
        let ttl = ttl.into().resolve(self.default_ttl);
        let entry = CacheEntry::new(value, ttl, self.clock.now());
        self.state.lock().insert(key.into(), entry, self.max_size);
    }

    /// Return the live value for `key`, or insert the one produced by `make`.
    ///
    /// The lookup and the insert happen under one lock acquisition, so
    /// concurrent callers racing on a missing key all observe the same value.
    pub fn get_or_insert_with<F>(&self, key: &str, ttl: impl Into<Ttl>, make: F) -> V
    where
        F: FnOnce() -> V,
    {
        let now = self.clock.now();
        let mut state = self.state.lock();

        match state.entries.get(key).map(|slot| slot.entry.is_expired_at(now)) {
            Some(false) => {
                state.promote(key);
                if let Some(slot) = state.entries.get_mut(key) {
                    slot.entry.touch(now);
                    return slot.entry.value().clone();
                }
            }
            Some(true) => {
                state.remove(key);
                state.expirations += 1;
            }
            None => {}
        }

        let value = make();
        let ttl = ttl.into().resolve(self.default_ttl);
        state.insert(key.to_string(), CacheEntry::new(value.clone(), ttl, now), self.max_size);
        value
    }

    /// Remove an entry. Returns whether anything was removed.
    pub fn delete(&self, key: &str) -> bool {
        self.state.lock().remove(key).is_some()
    }

    /// Remove every entry.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.recency.clear();
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let expired: Vec<String> = state
            .entries
            .iter()
            .filter(|(_, slot)| slot.entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            state.remove(key);
        }
        state.expirations += expired.len() as u64;
        expired.len()
    }

    /// Whether a live entry exists. Does not change recency.
    pub fn contains_key(&self, key: &str) -> bool {
        let now = self.clock.now();
        self.state
            .lock()
            .entries
            .get(key)
            .is_some_and(|slot| !slot.entry.is_expired_at(now))
    }

    /// Number of stored entries, including expired ones not yet discovered.
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl
    }

    /// Entries evicted to make room since construction.
    pub fn evictions(&self) -> u64 {
        self.state.lock().evictions
    }

    /// Entries dropped on expiry since construction.
    pub fn expirations(&self) -> u64 {
        self.state.lock().expirations
    }

    /// Keys from least to most recently used.
    pub fn keys_by_recency(&self) -> Vec<String> {
        self.state.lock().recency.values().cloned().collect()
    }

    /// Access count of an entry, if present. Does not change recency.
    pub fn access_count(&self, key: &str) -> Option<u64> {
        self.state
            .lock()
            .entries
            .get(key)
            .map(|slot| slot.entry.access_count())
    }

    /// Verify the structural invariants: the bound holds and the recency
    /// order holds exactly the stored keys, each once, at its current tick.
    pub fn check_invariants(&self) -> Result<(), String> {
        let state = self.state.lock();
        if state.entries.len() > self.max_size {
            return Err(format!(
                "{} entries exceed max_size {}",
                state.entries.len(),
                self.max_size
            ));
        }
        if state.recency.len() != state.entries.len() {
            return Err(format!(
                "recency holds {} keys but {} entries are stored",
                state.recency.len(),
                state.entries.len()
            ));
        }
        for (tick, key) in &state.recency {
            match state.entries.get(key) {
                Some(slot) if slot.tick == *tick => {}
                Some(slot) => {
                    return Err(format!(
                        "key {key} recorded at tick {tick} but entry is at tick {}",
                        slot.tick
                    ))
                }
                None => return Err(format!("recency references missing key {key}")),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rampart_core::ManualClock;
    use std::sync::Arc;

    fn manual_cache(max_size: usize, default_ttl: Option<Duration>) -> (LocalCache<i32>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let cache = LocalCache::with_clock(max_size, default_ttl, clock.clone());
        (cache, clock)
    }

    #[test]
    fn test_lru_evicts_oldest_insert() {
        let cache = LocalCache::new(2, None);
        cache.set("a", 1, Ttl::Default);
        cache.set("b", 2, Ttl::Default);
        cache.set("c", 3, Ttl::Default);

        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), Some(2));
        assert_eq!(cache.get("c"), Some(3));
        assert_eq!(cache.evictions(), 1);
        assert!(cache.check_invariants().is_ok());
    }

    #[test]
    fn test_read_refreshes_recency() {
        let cache = LocalCache::new(2, None);
        cache.set("a", 1, Ttl::Default);
        cache.set("b", 2, Ttl::Default);
        assert_eq!(cache.get("a"), Some(1));
        cache.set("c", 3, Ttl::Default);

        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.get("c"), Some(3));
    }

    #[test]
    fn test_overwrite_does_not_evict() {
        let cache = LocalCache::new(2, None);
        cache.set("a", 1, Ttl::Default);
        cache.set("b", 2, Ttl::Default);
        cache.set("a", 10, Ttl::Default);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.evictions(), 0);
        assert_eq!(cache.keys_by_recency(), vec!["b".to_string(), "a".to_string()]);
        assert_eq!(cache.get("a"), Some(10));
    }

    #[test]
    fn test_expired_entry_is_removed_on_read() {
        let (cache, clock) = manual_cache(10, None);
        cache.set("a", 1, Duration::from_secs(1));
        assert_eq!(cache.get("a"), Some(1));

        clock.advance(Duration::from_millis(1100));
        assert!(!cache.contains_key("a"));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.expirations(), 1);
        assert!(cache.check_invariants().is_ok());
    }

    #[test]
    fn test_default_ttl_applies() {
        let (cache, clock) = manual_cache(10, Some(Duration::from_secs(5)));
        cache.set("a", 1, Ttl::Default);
        cache.set("b", 2, Ttl::Never);

        clock.advance(Duration::from_secs(6));
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), Some(2));
    }

    #[test]
    fn test_delete_and_clear() {
        let cache = LocalCache::new(4, None);
        cache.set("a", 1, Ttl::Default);
        cache.set("b", 2, Ttl::Default);

        assert!(cache.delete("a"));
        assert!(!cache.delete("a"));
        assert_eq!(cache.keys_by_recency(), vec!["b".to_string()]);

        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.keys_by_recency().is_empty());
        assert!(cache.check_invariants().is_ok());
    }

    #[test]
    fn test_get_tracks_access_count() {
        let cache = LocalCache::new(4, None);
        cache.set("a", 1, Ttl::Default);
        cache.get("a");
        cache.get("a");
        assert_eq!(cache.access_count("a"), Some(2));
        assert_eq!(cache.access_count("missing"), None);
    }

    #[test]
    fn test_purge_expired() {
        let (cache, clock) = manual_cache(10, None);
        cache.set("short", 1, Duration::from_secs(1));
        cache.set("long", 2, Duration::from_secs(100));
        cache.set("forever", 3, Ttl::Never);

        clock.advance(Duration::from_secs(2));
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 2);
        assert!(cache.check_invariants().is_ok());
    }

    #[test]
    fn test_get_or_insert_with_only_builds_once() {
        let cache = LocalCache::new(4, None);
        let mut builds = 0;
        let first = cache.get_or_insert_with("k", Ttl::Default, || {
            builds += 1;
            7
        });
        let second = cache.get_or_insert_with("k", Ttl::Default, || {
            builds += 1;
            8
        });
        assert_eq!((first, second), (7, 7));
        assert_eq!(builds, 1);
    }

    #[test]
    fn test_get_or_insert_with_replaces_expired() {
        let (cache, clock) = manual_cache(4, None);
        cache.get_or_insert_with("k", Duration::from_secs(1), || 1);
        clock.advance(Duration::from_secs(2));
        assert_eq!(cache.get_or_insert_with("k", Ttl::Default, || 2), 2);
        assert_eq!(cache.expirations(), 1);
    }

    #[test]
    fn test_zero_max_size_is_clamped() {
        let cache = LocalCache::new(0, None);
        cache.set("a", 1, Ttl::Default);
        cache.set("b", 2, Ttl::Default);
        assert_eq!(cache.max_size(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("b"), Some(2));
    }

    #[test]
    fn test_concurrent_access_keeps_invariants() {
        let cache = Arc::new(LocalCache::new(16, None));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for i in 0..2_000 {
                        let key = format!("k{}", (i * 7 + t) % 40);
                        if i % 3 == 0 {
                            cache.get(&key);
                        } else if i % 17 == 0 {
                            cache.delete(&key);
                        } else {
                            cache.set(key, i, Ttl::Default);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("worker panicked");
        }

        assert!(cache.len() <= 16);
        assert_eq!(cache.check_invariants(), Ok(()));
    }
}
