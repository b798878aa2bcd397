//! API Configuration
//!
//! Composes the cache, Redis and limiter settings with the server's own.

use std::net::SocketAddr;

use rampart_cache::{CacheConfig, RedisConfig};
use rampart_core::{env, ConfigError};
use rampart_limiter::LimiterConfig;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

/// Everything the server needs to start.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiConfig {
    /// Address the demo server listens on.
    pub bind_addr: SocketAddr,
    pub cache: CacheConfig,
    /// Remote tier; `None` runs the cache on the local tier alone.
    pub redis: Option<RedisConfig>,
    pub limiter: LimiterConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            cache: CacheConfig::default(),
            redis: None,
            limiter: LimiterConfig::default(),
        }
    }
}

impl ApiConfig {
    /// Load from environment variables.
    ///
    /// - `RAMPART_BIND_ADDR`: listen address (default: 0.0.0.0:8080)
    ///
    /// plus the variables read by [`CacheConfig::from_env`],
    /// [`RedisConfig::from_env`] and [`LimiterConfig::from_env`].
    pub fn from_env() -> Result<Self, ConfigError> {
        let bind_raw =
            env::string_opt("RAMPART_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_raw
            .parse()
            .map_err(|_| ConfigError::invalid("bind_addr", &bind_raw, "expected host:port"))?;

        let config = Self {
            bind_addr,
            cache: CacheConfig::from_env(),
            redis: RedisConfig::from_env(),
            limiter: LimiterConfig::from_env(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_limiter(mut self, limiter: LimiterConfig) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn with_redis(mut self, redis: RedisConfig) -> Self {
        self.redis = Some(redis);
        self
    }

    /// Check semantic constraints of every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.cache.validate()?;
        self.limiter.validate()?;
        if let Some(redis) = &self.redis {
            if !redis.url.starts_with("redis://") && !redis.url.starts_with("rediss://") {
                return Err(ConfigError::invalid(
                    "redis.url",
                    &redis.url,
                    "must start with redis:// or rediss://",
                ));
            }
        }
        Ok(())
    }
}
