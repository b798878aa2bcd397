//! Limiter configuration.

use rampart_core::env;
use rampart_core::ConfigError;

/// Process-wide token-bucket settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimiterConfig {
    /// Whether requests are checked at all. Off by default.
    pub enabled: bool,
    /// Burst size of every bucket.
    pub capacity: u32,
    /// Sustained rate per client.
    pub requests_per_minute: u32,
    /// Most buckets kept at once; the least recently used go first.
    pub max_buckets: usize,
    /// Mix a hash of the user agent into the client key.
    pub hash_user_agent: bool,
    /// Header carrying the client address when behind a trusted proxy,
    /// e.g. `x-forwarded-for`. Only its first hop is used.
    pub trusted_proxy_header: Option<String>,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            capacity: 60,
            requests_per_minute: 120,
            max_buckets: 10_000,
            hash_user_agent: false,
            trusted_proxy_header: None,
        }
    }
}

impl LimiterConfig {
    /// An enabled limiter allowing `requests_per_minute` with a burst of the
    /// same size.
    pub fn per_minute(requests_per_minute: u32) -> Self {
        Self {
            enabled: true,
            capacity: requests_per_minute,
            requests_per_minute,
            ..Self::default()
        }
    }

    pub fn with_capacity(mut self, capacity: u32) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_max_buckets(mut self, max_buckets: usize) -> Self {
        self.max_buckets = max_buckets;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_user_agent_hashing(mut self, hash_user_agent: bool) -> Self {
        self.hash_user_agent = hash_user_agent;
        self
    }

    pub fn with_trusted_proxy_header(mut self, header: impl Into<String>) -> Self {
        self.trusted_proxy_header = Some(header.into().to_ascii_lowercase());
        self
    }

    /// Tokens added per second.
    pub fn refill_rate(&self) -> f64 {
        f64::from(self.requests_per_minute) / 60.0
    }

    /// Load from environment variables.
    ///
    /// - `RAMPART_RATE_LIMIT_ENABLED`: gate the limiter (default: false)
    /// - `RAMPART_RATE_LIMIT_CAPACITY`: burst size (default: 60)
    /// - `RAMPART_RATE_LIMIT_PER_MINUTE`: sustained rate (default: 120)
    /// - `RAMPART_RATE_LIMIT_MAX_BUCKETS`: registry bound (default: 10000)
    /// - `RAMPART_RATE_LIMIT_HASH_USER_AGENT`: key on user agent too (default: false)
    /// - `RAMPART_TRUSTED_PROXY_HEADER`: proxy header to trust (default: unset)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            enabled: env::flag_or("RAMPART_RATE_LIMIT_ENABLED", defaults.enabled),
            capacity: env::parse_or("RAMPART_RATE_LIMIT_CAPACITY", defaults.capacity),
            requests_per_minute: env::parse_or(
                "RAMPART_RATE_LIMIT_PER_MINUTE",
                defaults.requests_per_minute,
            ),
            max_buckets: env::parse_or("RAMPART_RATE_LIMIT_MAX_BUCKETS", defaults.max_buckets),
            hash_user_agent: env::flag_or(
                "RAMPART_RATE_LIMIT_HASH_USER_AGENT",
                defaults.hash_user_agent,
            ),
            trusted_proxy_header: env::string_opt("RAMPART_TRUSTED_PROXY_HEADER")
                .map(|h| h.to_ascii_lowercase()),
        }
    }

    /// Check semantic constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::invalid(
                "rate_limit.capacity",
                self.capacity,
                "must be at least 1",
            ));
        }
        if self.requests_per_minute == 0 {
            return Err(ConfigError::invalid(
                "rate_limit.requests_per_minute",
                self.requests_per_minute,
                "must be at least 1",
            ));
        }
        if self.max_buckets == 0 {
            return Err(ConfigError::invalid(
                "rate_limit.max_buckets",
                self.max_buckets,
                "must be at least 1",
            ));
        }
        if let Some(header) = &self.trusted_proxy_header {
            let valid = !header.is_empty()
                && header
                    .bytes()
                    .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'_');
            if !valid {
                return Err(ConfigError::invalid(
                    "rate_limit.trusted_proxy_header",
                    header,
                    "must be a lowercase HTTP header name",
                ));
            }
        }
        Ok(())
    }
}
