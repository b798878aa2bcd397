//! Shared application state for Axum routers.
//!
//! Built once at startup and handed to the router; nothing is initialised
//! at import time. [`AppState::shutdown`] releases the remote cache tier.

use std::sync::Arc;
use std::time::Instant;

use rampart_cache::{MultiTierCache, RedisBackend, RemoteBackend};
use serde_json::Value;

use crate::config::ApiConfig;
use crate::error::ApiResult;
use crate::middleware::RateLimitState;

/// Cache used by route handlers. Responses are stored as JSON values.
pub type ApiCache = MultiTierCache<Value>;

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<ApiCache>,
    pub rate_limit: RateLimitState,
    pub config: Arc<ApiConfig>,
    pub start_time: Instant,
}

crate::impl_from_ref!(Arc<ApiCache>, cache);
crate::impl_from_ref!(RateLimitState, rate_limit);
crate::impl_from_ref!(Arc<ApiConfig>, config);
crate::impl_from_ref!(Instant, start_time);

impl AppState {
    /// Validate `config`, build the cache and limiter, and connect the
    /// remote tier if one is configured.
    ///
    /// An unreachable remote tier is not an error: the cache runs on the
    /// local tier and the failure is logged.
    pub async fn new(config: ApiConfig) -> ApiResult<Self> {
        config.validate()?;

        let cache = match &config.redis {
            Some(redis) => {
                let backend: Arc<dyn RemoteBackend> = Arc::new(RedisBackend::new(redis.clone()));
                MultiTierCache::with_remote(&config.cache, backend)?
            }
            None => MultiTierCache::new(&config.cache)?,
        };
        let state = Self::from_parts(cache, RateLimitState::new(config.limiter.clone())?, config);

        if state.cache.has_remote() {
            let available = state.cache.connect().await;
            tracing::info!(available, "remote cache tier connected");
        }
        tracing::info!(
            rate_limit_enabled = state.rate_limit.is_enabled(),
            "application state ready"
        );
        Ok(state)
    }

    /// Assemble state from already-built parts, without connecting anything.
    pub fn from_parts(cache: ApiCache, rate_limit: RateLimitState, config: ApiConfig) -> Self {
        Self {
            cache: Arc::new(cache),
            rate_limit,
            config: Arc::new(config),
            start_time: Instant::now(),
        }
    }

    /// Release the remote tier. Safe to call more than once.
    pub async fn shutdown(&self) {
        self.cache.shutdown().await;
        tracing::info!("application state shut down");
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("cache", &self.cache)
            .field("rate_limit", &self.rate_limit)
            .field("start_time", &self.start_time)
            .finish()
    }
}
