//! Multi-tier cache front end.
//!
//! Reads go L1 → L2 → miss, promoting L2 hits into L1 with the TTL they were
//! written with. Writes go to both tiers. Neither tier is authoritative, so
//! there is no cross-tier linearizability: a reader racing a writer may see
//! a stale L2 value while L1 is already updated, or the reverse.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rampart_core::{system_clock, ConfigError, SharedClock};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::CacheConfig;
use crate::entry::Ttl;
use crate::local::LocalCache;
use crate::memoize::{CallArgs, Memoizer};
use crate::remote::{RemoteBackend, RemoteCacheAdapter};
use crate::stats::{CacheStats, StatsRecorder};

/// Marker for values storable in a [`MultiTierCache`].
///
/// Values must be cloneable (L1 hands out copies) and serializable (L2
/// stores bytes).
pub trait CacheValue: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> CacheValue for T where T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

/// The cache the rest of the application talks to.
///
/// One instance holds one value type; use separate instances for separate
/// value types.
#[derive(Debug)]
pub struct MultiTierCache<V> {
    l1: LocalCache<V>,
    l2: Option<RemoteCacheAdapter<V>>,
    default_ttl: Option<Duration>,
    stats: StatsRecorder,
}

impl<V: CacheValue> MultiTierCache<V> {
    /// Local-only cache.
    pub fn new(config: &CacheConfig) -> Result<Self, ConfigError> {
        Self::build(config, None, system_clock())
    }

    /// Cache with a remote tier. Call [`connect`](Self::connect) before use;
    /// until then the remote tier is skipped.
    pub fn with_remote(config: &CacheConfig, backend: Arc<dyn RemoteBackend>) -> Result<Self, ConfigError> {
        Self::build(config, Some(backend), system_clock())
    }

    /// Fully explicit constructor.
    pub fn build(
        config: &CacheConfig,
        backend: Option<Arc<dyn RemoteBackend>>,
        clock: SharedClock,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            l1: LocalCache::from_config(config, clock),
            l2: backend.map(|backend| {
                RemoteCacheAdapter::new(backend, config.namespace.clone(), config.remote_timeout)
            }),
            default_ttl: config.default_ttl,
            stats: StatsRecorder::default(),
        })
    }

    /// Connect the remote tier, if any. Returns whether it is available.
    /// Failure leaves the cache running on L1 alone.
    pub async fn connect(&self) -> bool {
        match &self.l2 {
            Some(l2) => l2.connect().await,
            None => false,
        }
    }

    /// Release the remote tier. Local entries are left in place.
    pub async fn shutdown(&self) {
        if let Some(l2) = &self.l2 {
            l2.disconnect().await;
        }
    }

    pub async fn get(&self, key: &str) -> Option<V> {
        if let Some(value) = self.l1.get(key) {
            self.stats.record_l1_hit();
            tracing::debug!(key = %key, "cache hit (L1)");
            return Some(value);
        }

        if let Some(l2) = &self.l2 {
            if let Some((value, ttl)) = l2.get(key).await {
                self.stats.record_l2_hit();
                tracing::debug!(key = %key, "cache hit (L2), promoting");
                self.l1.set(key, value.clone(), Ttl::from(ttl));
                return Some(value);
            }
        }

        self.stats.record_miss();
        tracing::debug!(key = %key, "cache miss");
        None
    }

    /// Write to both tiers. Counts as a set even if L2 rejects it.
    pub async fn set(&self, key: impl Into<String>, value: V, ttl: impl Into<Ttl>) {
        let key = key.into();
        let ttl = ttl.into().resolve(self.default_ttl);

        match &self.l2 {
            Some(l2) => {
                self.l1.set(key.clone(), value.clone(), Ttl::from(ttl));
                l2.set(&key, &value, ttl).await;
            }
            None => self.l1.set(key, value, Ttl::from(ttl)),
        }
        self.stats.record_set();
    }

    /// Remove from both tiers. Returns whether either tier held the key.
    pub async fn delete(&self, key: &str) -> bool {
        let local = self.l1.delete(key);
        let remote = match &self.l2 {
            Some(l2) => l2.delete(key).await,
            None => false,
        };
        local || remote
    }

    /// Empty both tiers.
    pub async fn clear(&self) {
        self.l1.clear();
        if let Some(l2) = &self.l2 {
            l2.clear().await;
        }
    }

    pub fn get_stats(&self) -> CacheStats {
        let mut stats = self.stats.snapshot();
        stats.l1_entries = self.l1.len() as u64;
        stats.l1_evictions = self.l1.evictions();
        stats.l1_expirations = self.l1.expirations();
        if let Some(l2) = &self.l2 {
            stats.l2_errors = l2.errors();
            stats.l2_available = l2.is_available();
        }
        stats
    }

    /// The local tier, for introspection.
    pub fn local(&self) -> &LocalCache<V> {
        &self.l1
    }

    pub fn has_remote(&self) -> bool {
        self.l2.is_some()
    }

    pub fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl
    }

    /// Read-through helper: return the cached value or compute, store and
    /// return it.
    pub async fn get_or_insert_with<F, Fut>(&self, key: &str, ttl: impl Into<Ttl>, compute: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        if let Some(value) = self.get(key).await {
            return value;
        }
        let value = compute().await;
        self.set(key, value.clone(), ttl).await;
        value
    }

    /// Build a memoizer over this cache.
    ///
    /// ```ignore
    /// let fib = cache.cached(Duration::from_secs(60), "math");
    /// let args = CallArgs::new().arg(&30u64)?;
    /// let value = fib.call("fib", &args, || async { slow_fib(30) }).await;
    /// ```
    pub fn cached(self: &Arc<Self>, ttl: impl Into<Ttl>, key_prefix: impl Into<String>) -> Memoizer<V> {
        Memoizer::new(Arc::clone(self), ttl.into(), key_prefix.into())
    }

    /// Cache key a memoizer with `key_prefix` would use for this call.
    pub fn memo_key(key_prefix: &str, function: &str, args: &CallArgs) -> String {
        crate::memoize::cache_key(key_prefix, function, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::InMemoryBackend;
    use rampart_core::ManualClock;

    fn config() -> CacheConfig {
        CacheConfig::new()
            .with_max_size(2)
            .with_default_ttl(Duration::from_secs(60))
            .with_namespace("test")
    }

    #[tokio::test]
    async fn test_local_only_round_trip() {
        let cache: MultiTierCache<String> = MultiTierCache::new(&config()).expect("cache");
        assert!(!cache.connect().await);

        cache.set("a", "x".to_string(), Ttl::Default).await;
        assert_eq!(cache.get("a").await, Some("x".to_string()));
        assert_eq!(cache.get("b").await, None);

        let stats = cache.get_stats();
        assert_eq!((stats.l1_hits, stats.l2_hits, stats.misses, stats.sets), (1, 0, 1, 1));
        assert!(!stats.l2_available);
    }

    #[tokio::test]
    async fn test_promotion_keeps_original_ttl() {
        let clock = Arc::new(ManualClock::new());
        let backend = Arc::new(InMemoryBackend::with_clock(clock.clone()));
        let cache: MultiTierCache<u32> =
            MultiTierCache::build(&config(), Some(backend.clone()), clock.clone()).expect("cache");
        assert!(cache.connect().await);

        cache.set("k", 7, Duration::from_secs(10)).await;
        cache.local().clear();

        assert_eq!(cache.get("k").await, Some(7));
        assert_eq!(cache.get_stats().l2_hits, 1);
        assert!(cache.local().contains_key("k"));

        clock.advance(Duration::from_secs(11));
        assert!(!cache.local().contains_key("k"));
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let err = MultiTierCache::<u32>::new(&CacheConfig::new().with_max_size(0));
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn test_delete_reports_either_tier() {
        let backend = Arc::new(InMemoryBackend::new());
        let cache: MultiTierCache<u32> =
            MultiTierCache::with_remote(&config(), backend.clone()).expect("cache");
        cache.connect().await;

        cache.set("k", 1, Ttl::Default).await;
        cache.local().delete("k");
        assert!(cache.delete("k").await);
        assert!(!cache.delete("k").await);
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn test_get_or_insert_with_computes_once() {
        let cache: MultiTierCache<u64> = MultiTierCache::new(&config()).expect("cache");
        let first = cache.get_or_insert_with("sq", Ttl::Default, || async { 9 }).await;
        let second = cache.get_or_insert_with("sq", Ttl::Default, || async { 10 }).await;
        assert_eq!((first, second), (9, 9));
    }
}
