//! rampart cache - two-tier caching
//!
//! A bounded, TTL-aware in-process tier ([`LocalCache`]) in front of an
//! optional shared tier reached through a [`RemoteBackend`]. The
//! [`MultiTierCache`] front end hides remote failures behind misses, and
//! [`Memoizer`] builds function-result caching on top of it.

pub mod codec;
pub mod config;
pub mod entry;
pub mod local;
pub mod memoize;
pub mod multi_tier;
pub mod remote;
pub mod stats;

pub use config::{CacheConfig, RedisConfig};
pub use entry::{CacheEntry, Ttl};
pub use local::LocalCache;
pub use memoize::{cache_key, CallArgs, Memoizer};
pub use multi_tier::{CacheValue, MultiTierCache};
pub use remote::{InMemoryBackend, RemoteBackend, RemoteCacheAdapter, RemoteState};
pub use stats::CacheStats;

// Re-export the Redis tier when built with it
#[cfg(feature = "redis")]
pub use remote::{RedisBackend, RedisBackendError};
