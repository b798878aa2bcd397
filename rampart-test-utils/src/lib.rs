//! rampart Test Utilities
//!
//! Shared test infrastructure for the rampart workspace:
//! - Remote backends that fail, stall, or refuse to connect
//! - Proptest generators for cache operations and bucket parameters
//! - Test fixtures for common scenarios
//! - Assertions over cache invariants

pub use rampart_cache::{
    CacheConfig, CacheStats, InMemoryBackend, LocalCache, MultiTierCache, RemoteBackend, Ttl,
};
pub use rampart_core::{CacheError, ManualClock, SharedClock};

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// MOCK BACKENDS
// ============================================================================

/// Remote backend that fails every call.
#[derive(Debug, Default)]
pub struct FailingBackend {
    calls: AtomicU64,
}

impl FailingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of calls made against this backend, `connect` included.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn fail<T>(&self, op: &str) -> Result<T, CacheError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(CacheError::backend("failing", format!("{op} refused")))
    }
}

#[async_trait]
impl RemoteBackend for FailingBackend {
    fn name(&self) -> &str {
        "failing"
    }

    async fn connect(&self) -> Result<(), CacheError> {
        self.fail("connect")
    }

    async fn disconnect(&self) -> Result<(), CacheError> {
        Ok(())
    }

    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        self.fail("get")
    }

    async fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Option<Duration>) -> Result<(), CacheError> {
        self.fail("set")
    }

    async fn delete(&self, _key: &str) -> Result<bool, CacheError> {
        self.fail("delete")
    }

    async fn clear(&self, _prefix: &str) -> Result<(), CacheError> {
        self.fail("clear")
    }
}

/// Remote backend that accepts connections but then fails every data call.
///
/// Exercises the path where the remote tier is marked available yet every
/// read and write still has to degrade.
#[derive(Debug, Default)]
pub struct BrokenAfterConnectBackend {
    inner: FailingBackend,
}

impl BrokenAfterConnectBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> u64 {
        self.inner.calls()
    }
}

#[async_trait]
impl RemoteBackend for BrokenAfterConnectBackend {
    fn name(&self) -> &str {
        "broken"
    }

    async fn connect(&self) -> Result<(), CacheError> {
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), CacheError> {
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<(), CacheError> {
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        self.inner.delete(key).await
    }

    async fn clear(&self, prefix: &str) -> Result<(), CacheError> {
        self.inner.clear(prefix).await
    }
}

/// Remote backend that sleeps before every data call, then delegates to an
/// [`InMemoryBackend`].
#[derive(Debug)]
pub struct SlowBackend {
    inner: InMemoryBackend,
    delay: Duration,
}

impl SlowBackend {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: InMemoryBackend::new(),
            delay,
        }
    }

    pub fn inner(&self) -> &InMemoryBackend {
        &self.inner
    }
}

#[async_trait]
impl RemoteBackend for SlowBackend {
    fn name(&self) -> &str {
        "slow"
    }

    async fn connect(&self) -> Result<(), CacheError> {
        self.inner.connect().await
    }

    async fn disconnect(&self) -> Result<(), CacheError> {
        self.inner.disconnect().await
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        tokio::time::sleep(self.delay).await;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<(), CacheError> {
        tokio::time::sleep(self.delay).await;
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        tokio::time::sleep(self.delay).await;
        self.inner.delete(key).await
    }

    async fn clear(&self, prefix: &str) -> Result<(), CacheError> {
        tokio::time::sleep(self.delay).await;
        self.inner.clear(prefix).await
    }
}

/// Remote backend whose first `failures` connection attempts fail.
#[derive(Debug)]
pub struct FlakyConnectBackend {
    inner: InMemoryBackend,
    failures_left: AtomicUsize,
    attempts: AtomicUsize,
}

impl FlakyConnectBackend {
    pub fn new(failures: usize) -> Self {
        Self {
            inner: InMemoryBackend::new(),
            failures_left: AtomicUsize::new(failures),
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &InMemoryBackend {
        &self.inner
    }
}

#[async_trait]
impl RemoteBackend for FlakyConnectBackend {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn connect(&self) -> Result<(), CacheError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let refused = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if refused {
            return Err(CacheError::Unavailable {
                backend: "flaky".to_string(),
            });
        }
        self.inner.connect().await
    }

    async fn disconnect(&self) -> Result<(), CacheError> {
        self.inner.disconnect().await
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<(), CacheError> {
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        self.inner.delete(key).await
    }

    async fn clear(&self, prefix: &str) -> Result<(), CacheError> {
        self.inner.clear(prefix).await
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for cache operations and bucket parameters.

    use super::*;
    use proptest::prelude::*;

    /// One operation against a cache.
    #[derive(Debug, Clone, PartialEq)]
    pub enum CacheOp {
        Get(String),
        Set(String, u32),
        Delete(String),
    }

    /// Keys drawn from a small space so operations collide often.
    pub fn arb_key() -> impl Strategy<Value = String> {
        (0u8..12).prop_map(|i| format!("k{i}"))
    }

    pub fn arb_cache_op() -> impl Strategy<Value = CacheOp> {
        prop_oneof![
            3 => arb_key().prop_map(CacheOp::Get),
            4 => (arb_key(), any::<u32>()).prop_map(|(k, v)| CacheOp::Set(k, v)),
            1 => arb_key().prop_map(CacheOp::Delete),
        ]
    }

    pub fn arb_cache_ops(max_len: usize) -> impl Strategy<Value = Vec<CacheOp>> {
        prop::collection::vec(arb_cache_op(), 0..max_len)
    }

    /// A TTL variant with durations between 1ms and 1h.
    pub fn arb_ttl() -> impl Strategy<Value = Ttl> {
        prop_oneof![
            Just(Ttl::Default),
            Just(Ttl::Never),
            (1u64..3_600_000).prop_map(|ms| Ttl::After(Duration::from_millis(ms))),
        ]
    }

    /// Valid `(capacity, refill_rate)` pairs.
    pub fn arb_bucket_params() -> impl Strategy<Value = (f64, f64)> {
        (1u32..500, 0u32..1_000).prop_map(|(cap, per_min)| (f64::from(cap), f64::from(per_min) / 60.0))
    }

    /// A step in a bucket scenario: wait, then ask for tokens.
    pub fn arb_bucket_steps(max_len: usize) -> impl Strategy<Value = Vec<(Duration, f64)>> {
        prop::collection::vec(
            ((0u64..120_000).prop_map(Duration::from_millis), (0u32..20).prop_map(f64::from)),
            1..max_len,
        )
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built test fixtures for common testing scenarios.

    use super::*;
    use serde::{Deserialize, Serialize};

    /// A structured value for exercising the remote codec.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Profile {
        pub id: u64,
        pub name: String,
        pub scores: Vec<i32>,
        pub active: bool,
    }

    pub fn profile(id: u64) -> Profile {
        Profile {
            id,
            name: format!("user-{id}"),
            scores: vec![id as i32, -(id as i32)],
            active: id % 2 == 0,
        }
    }

    /// A small cache config with a one-minute default TTL.
    pub fn small_config(max_size: usize) -> CacheConfig {
        CacheConfig::new()
            .with_max_size(max_size)
            .with_default_ttl(Duration::from_secs(60))
            .with_namespace("test")
            .with_remote_timeout(Duration::from_millis(50))
    }

    /// A cache over `backend` driven by a manual clock.
    pub fn manual_cache<V: rampart_cache::CacheValue>(
        max_size: usize,
        backend: Option<Arc<dyn RemoteBackend>>,
    ) -> (MultiTierCache<V>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let cache = MultiTierCache::build(&small_config(max_size), backend, clock.clone())
            .unwrap_or_else(|e| panic!("fixture config must be valid: {e}"));
        (cache, clock)
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over cache state.

    use super::*;

    /// Assert that the local tier's bound and recency order are intact.
    #[track_caller]
    pub fn assert_cache_invariants<V: Clone>(cache: &LocalCache<V>) {
        if let Err(violation) = cache.check_invariants() {
            panic!("cache invariant violated: {violation}");
        }
    }

    /// Assert that the local tier holds exactly `expected`, in any order.
    #[track_caller]
    pub fn assert_keys<V: Clone>(cache: &LocalCache<V>, expected: &[&str]) {
        let mut actual = cache.keys_by_recency();
        actual.sort();
        let mut expected: Vec<String> = expected.iter().map(|k| k.to_string()).collect();
        expected.sort();
        assert_eq!(actual, expected, "unexpected local keys");
    }

    /// Assert that hits and misses add up to `reads`.
    #[track_caller]
    pub fn assert_reads_accounted(stats: &CacheStats, reads: u64) {
        assert_eq!(
            stats.l1_hits + stats.l2_hits + stats.misses,
            reads,
            "reads not accounted for: {stats:?}"
        );
    }
}

// ============================================================================
// TESTS
// ============================================================================
