//! Per-client bucket storage.
//!
//! Buckets live in this process only. Several instances behind a load
//! balancer each enforce their own limit; [`RateLimitStore`] is the point
//! where a shared counter store would be substituted.

use std::fmt;
use std::sync::Arc;

use rampart_cache::{LocalCache, Ttl};
use rampart_core::{system_clock, ConfigError, SharedClock};

use crate::bucket::{validate_rates, Decision, TokenBucket};
use crate::config::LimiterConfig;

/// Source of admission decisions keyed by client.
pub trait RateLimitStore: Send + Sync + fmt::Debug {
    /// Take `amount` tokens from the bucket for `key`, creating it if needed.
    fn check(&self, key: &str, amount: f64) -> Decision;

    /// Burst size of every bucket, reported in response headers.
    fn capacity(&self) -> f64;

    /// Number of clients currently tracked.
    fn tracked_clients(&self) -> usize;
}

/// In-process store: one [`TokenBucket`] per key, at most `max_buckets` of
/// them.
///
/// When full, the least recently used bucket is dropped. A client whose
/// bucket was dropped starts again with a full one.
pub struct BucketRegistry {
    buckets: LocalCache<Arc<TokenBucket>>,
    capacity: f64,
    refill_rate: f64,
    clock: SharedClock,
}

impl BucketRegistry {
    pub fn new(capacity: f64, refill_rate: f64, max_buckets: usize) -> Result<Self, ConfigError> {
        Self::with_clock(capacity, refill_rate, max_buckets, system_clock())
    }

    pub fn with_clock(
        capacity: f64,
        refill_rate: f64,
        max_buckets: usize,
        clock: SharedClock,
    ) -> Result<Self, ConfigError> {
        validate_rates(capacity, refill_rate)?;
        if max_buckets == 0 {
            return Err(ConfigError::invalid("max_buckets", max_buckets, "must be at least 1"));
        }
        Ok(Self {
            buckets: LocalCache::with_clock(max_buckets, None, Arc::clone(&clock)),
            capacity,
            refill_rate,
            clock,
        })
    }

    pub fn from_config(config: &LimiterConfig) -> Result<Self, ConfigError> {
        Self::from_config_with_clock(config, system_clock())
    }

    pub fn from_config_with_clock(config: &LimiterConfig, clock: SharedClock) -> Result<Self, ConfigError> {
        config.validate()?;
        Self::with_clock(
            f64::from(config.capacity),
            config.refill_rate(),
            config.max_buckets,
            clock,
        )
    }

    /// The bucket for `key`, created full on first use.
    ///
    /// Lookup and creation are one atomic step, so concurrent first requests
    /// from the same client share a single bucket.
    pub fn bucket(&self, key: &str) -> Arc<TokenBucket> {
        self.buckets.get_or_insert_with(key, Ttl::Never, || {
            tracing::debug!(key = %key, "creating rate limit bucket");
            Arc::new(TokenBucket::from_parts(
                self.capacity,
                self.refill_rate,
                Arc::clone(&self.clock),
            ))
        })
    }

    /// Number of buckets currently held.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn max_buckets(&self) -> usize {
        self.buckets.max_size()
    }

    /// Buckets dropped to stay within the bound.
    pub fn evictions(&self) -> u64 {
        self.buckets.evictions()
    }

    pub fn refill_rate(&self) -> f64 {
        self.refill_rate
    }
}

impl RateLimitStore for BucketRegistry {
    fn check(&self, key: &str, amount: f64) -> Decision {
        self.bucket(key).check(amount)
    }

    fn capacity(&self) -> f64 {
        self.capacity
    }

    fn tracked_clients(&self) -> usize {
        self.buckets.len()
    }
}

impl fmt::Debug for BucketRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BucketRegistry")
            .field("capacity", &self.capacity)
            .field("refill_rate", &self.refill_rate)
            .field("buckets", &self.buckets.len())
            .field("max_buckets", &self.buckets.max_size())
            .finish()
    }
}
