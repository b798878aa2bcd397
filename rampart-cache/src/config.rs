//! Cache configuration.

use std::time::Duration;

use rampart_core::env;
use rampart_core::ConfigError;

/// Configuration for the multi-tier cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum number of entries held by the local tier.
    pub max_size: usize,
    /// TTL applied when a write does not specify one. `None` means entries
    /// never expire unless a write asks for it.
    pub default_ttl: Option<Duration>,
    /// Prefix applied to every key written to the remote tier.
    pub namespace: String,
    /// Upper bound on every remote call.
    pub remote_timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: 1000,
            default_ttl: Some(Duration::from_secs(300)),
            namespace: "rampart".to_string(),
            remote_timeout: Duration::from_millis(250),
        }
    }
}

impl CacheConfig {
    /// Create a new cache config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the local tier bound.
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    /// Set the default TTL.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    /// Entries written with the default TTL never expire.
    pub fn without_default_ttl(mut self) -> Self {
        self.default_ttl = None;
        self
    }

    /// Set the remote key namespace.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Set the remote call timeout.
    pub fn with_remote_timeout(mut self, timeout: Duration) -> Self {
        self.remote_timeout = timeout;
        self
    }

    /// Load from environment variables.
    ///
    /// - `RAMPART_CACHE_MAX_SIZE`: local tier bound (default: 1000)
    /// - `RAMPART_CACHE_DEFAULT_TTL_SECS`: default TTL, `0` disables expiry (default: 300)
    /// - `RAMPART_CACHE_NAMESPACE`: remote key prefix (default: "rampart")
    /// - `RAMPART_REDIS_TIMEOUT_MS`: remote call timeout (default: 250)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let ttl_secs = env::parse_or(
            "RAMPART_CACHE_DEFAULT_TTL_SECS",
            defaults.default_ttl.map_or(0, |ttl| ttl.as_secs()),
        );

        Self {
            max_size: env::parse_or("RAMPART_CACHE_MAX_SIZE", defaults.max_size),
            default_ttl: (ttl_secs > 0).then(|| Duration::from_secs(ttl_secs)),
            namespace: env::string_opt("RAMPART_CACHE_NAMESPACE").unwrap_or(defaults.namespace),
            remote_timeout: Duration::from_millis(env::parse_or(
                "RAMPART_REDIS_TIMEOUT_MS",
                defaults.remote_timeout.as_millis() as u64,
            )),
        }
    }

    /// Check semantic constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_size == 0 {
            return Err(ConfigError::invalid(
                "cache.max_size",
                self.max_size,
                "must be at least 1",
            ));
        }
        if self.remote_timeout.is_zero() {
            return Err(ConfigError::invalid(
                "cache.remote_timeout",
                format!("{:?}", self.remote_timeout),
                "must be positive",
            ));
        }
        if !self
            .namespace
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
        {
            return Err(ConfigError::invalid(
                "cache.namespace",
                &self.namespace,
                "only ASCII alphanumerics and - _ . : are allowed",
            ));
        }
        Ok(())
    }
}

/// Connection settings for the Redis remote tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisConfig {
    /// Connection URL, e.g. `redis://127.0.0.1:6379`.
    pub url: String,
    /// Maximum pooled connections.
    pub pool_size: usize,
    /// Timeout for acquiring and creating pooled connections.
    pub timeout: Duration,
}

impl RedisConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            pool_size: 16,
            timeout: Duration::from_millis(250),
        }
    }

    /// Load from environment variables. Returns `None` when
    /// `RAMPART_REDIS_URL` is unset, which disables the remote tier.
    ///
    /// - `RAMPART_REDIS_URL`: connection URL
    /// - `RAMPART_REDIS_POOL_SIZE`: pool size (default: 16)
    /// - `RAMPART_REDIS_TIMEOUT_MS`: pool timeouts (default: 250)
    pub fn from_env() -> Option<Self> {
        let url = env::string_opt("RAMPART_REDIS_URL")?;
        let defaults = Self::new(url);
        Some(Self {
            pool_size: env::parse_or("RAMPART_REDIS_POOL_SIZE", defaults.pool_size),
            timeout: Duration::from_millis(env::parse_or(
                "RAMPART_REDIS_TIMEOUT_MS",
                defaults.timeout.as_millis() as u64,
            )),
            ..defaults
        })
    }
}
