//! rampart limiter - token-bucket admission control
//!
//! A continuous [`TokenBucket`] per client, held in a bounded
//! [`BucketRegistry`] and reached through the [`RateLimitStore`] trait.
//! Clients are identified by [`ClientIdentity`]. Limits are per process.

pub mod bucket;
pub mod config;
pub mod identity;
pub mod registry;

pub use bucket::{validate_rates, Decision, TokenBucket};
pub use config::LimiterConfig;
pub use identity::{first_hop, ClientIdentity};
pub use registry::{BucketRegistry, RateLimitStore};
