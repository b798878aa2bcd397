//! Cached entry records and TTL selection.

use std::time::{Duration, Instant};

/// Time-to-live requested for a single write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Ttl {
    /// Use the cache's configured default TTL.
    #[default]
    Default,
    /// Never expires.
    Never,
    /// Expires once this much time has passed since the write.
    After(Duration),
}

impl Ttl {
    /// Resolve against a cache's default, yielding the concrete TTL to store.
    pub fn resolve(self, default: Option<Duration>) -> Option<Duration> {
        match self {
            Ttl::Default => default,
            Ttl::Never => None,
            Ttl::After(ttl) => Some(ttl),
        }
    }
}

impl From<Duration> for Ttl {
    fn from(ttl: Duration) -> Self {
        Ttl::After(ttl)
    }
}

/// `None` maps to [`Ttl::Never`], not to the default.
impl From<Option<Duration>> for Ttl {
    fn from(ttl: Option<Duration>) -> Self {
        ttl.map_or(Ttl::Never, Ttl::After)
    }
}

/// A value held by a cache tier together with its access metadata.
///
/// The entry owns its value; reads hand out clones.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    value: V,
    created_at: Instant,
    ttl: Option<Duration>,
    access_count: u64,
    last_accessed: Instant,
}

impl<V> CacheEntry<V> {
    pub fn new(value: V, ttl: Option<Duration>, now: Instant) -> Self {
        Self {
            value,
            created_at: now,
            ttl,
            access_count: 0,
            last_accessed: now,
        }
    }

    /// An entry is expired iff it has a TTL and strictly more than that TTL
    /// has elapsed since creation.
    pub fn is_expired_at(&self, now: Instant) -> bool {
        match self.ttl {
            Some(ttl) => now.saturating_duration_since(self.created_at) > ttl,
            None => false,
        }
    }

    /// Time left before expiry, `None` for entries without a TTL.
    pub fn remaining_ttl(&self, now: Instant) -> Option<Duration> {
        self.ttl
            .map(|ttl| ttl.saturating_sub(now.saturating_duration_since(self.created_at)))
    }

    /// Record a successful read.
    pub fn touch(&mut self, now: Instant) {
        self.access_count += 1;
        self.last_accessed = now;
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    pub fn into_value(self) -> V {
        self.value
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn access_count(&self) -> u64 {
        self.access_count
    }

    pub fn last_accessed(&self) -> Instant {
        self.last_accessed
    }
}
