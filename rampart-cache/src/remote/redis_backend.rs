//! Redis-backed remote tier using a `deadpool-redis` connection pool.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Pool, PoolConfig, Runtime};
use parking_lot::RwLock;
use rampart_core::{CacheError, RampartError};
use redis::AsyncCommands;

use super::RemoteBackend;
use crate::config::RedisConfig;

/// Keys deleted per SCAN page during `clear`.
const SCAN_BATCH: usize = 500;

/// Error type for Redis backend operations.
#[derive(Debug, thiserror::Error)]
pub enum RedisBackendError {
    /// Pool could not be built from the configuration.
    #[error("Failed to create Redis pool: {0}")]
    PoolCreate(String),

    /// No connection could be checked out.
    #[error("Failed to get Redis connection: {0}")]
    Connection(String),

    /// A command failed.
    #[error("Redis command failed: {0}")]
    Command(#[from] redis::RedisError),

    /// `connect` has not succeeded yet.
    #[error("Redis pool not initialised")]
    NotConnected,
}

impl From<RedisBackendError> for CacheError {
    fn from(e: RedisBackendError) -> Self {
        match e {
            RedisBackendError::NotConnected => CacheError::Unavailable {
                backend: "redis".to_string(),
            },
            other => CacheError::backend("redis", other),
        }
    }
}

impl From<RedisBackendError> for RampartError {
    fn from(e: RedisBackendError) -> Self {
        RampartError::Cache(e.into())
    }
}

/// Remote tier backed by Redis.
///
/// The pool is created lazily by [`RemoteBackend::connect`]. Until then (or
/// after `disconnect`) every call fails with `Unavailable`.
pub struct RedisBackend {
    config: RedisConfig,
    pool: RwLock<Option<Pool>>,
}

impl RedisBackend {
    pub fn new(config: RedisConfig) -> Self {
        Self {
            config,
            pool: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &RedisConfig {
        &self.config
    }

    fn build_pool(&self) -> Result<Pool, RedisBackendError> {
        let mut redis_config = deadpool_redis::Config::from_url(&self.config.url);
        let mut pool_config = PoolConfig::new(self.config.pool_size.max(1));
        pool_config.timeouts.wait = Some(self.config.timeout);
        pool_config.timeouts.create = Some(self.config.timeout);
        pool_config.timeouts.recycle = Some(self.config.timeout);
        redis_config.pool = Some(pool_config);

        redis_config
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| RedisBackendError::PoolCreate(e.to_string()))
    }

    async fn connection(&self) -> Result<deadpool_redis::Connection, RedisBackendError> {
        let pool = self
            .pool
            .read()
            .clone()
            .ok_or(RedisBackendError::NotConnected)?;
        pool.get()
            .await
            .map_err(|e| RedisBackendError::Connection(e.to_string()))
    }
}

impl std::fmt::Debug for RedisBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBackend")
            .field("pool_size", &self.config.pool_size)
            .field("connected", &self.pool.read().is_some())
            .finish()
    }
}

/// Escape Redis glob metacharacters so a prefix matches literally.
fn glob_escape(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('*');
    escaped
}

/// Redis `PX` needs a positive millisecond count. Rounds up.
fn ttl_millis(ttl: Duration) -> u64 {
    (ttl.as_nanos().div_ceil(1_000_000).min(u128::from(u64::MAX)) as u64).max(1)
}

#[async_trait]
impl RemoteBackend for RedisBackend {
    fn name(&self) -> &str {
        "redis"
    }

    async fn connect(&self) -> Result<(), CacheError> {
        if self.pool.read().is_some() {
            return Ok(());
        }

        let pool = self.build_pool()?;
        // Fail fast if the server is unreachable.
        pool.get()
            .await
            .map_err(|e| RedisBackendError::Connection(e.to_string()))?;

        *self.pool.write() = Some(pool);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), CacheError> {
        if let Some(pool) = self.pool.write().take() {
            pool.close();
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut conn = self.connection().await?;
        let value: Option<Vec<u8>> = conn.get(key).await.map_err(RedisBackendError::from)?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        match ttl {
            Some(ttl) => conn
                .pset_ex::<_, _, ()>(key, value, ttl_millis(ttl))
                .await
                .map_err(RedisBackendError::from)?,
            None => conn
                .set::<_, _, ()>(key, value)
                .await
                .map_err(RedisBackendError::from)?,
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.connection().await?;
        let removed: i64 = conn.del(key).await.map_err(RedisBackendError::from)?;
        Ok(removed > 0)
    }

    async fn clear(&self, prefix: &str) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let pattern = glob_escape(prefix);
        let mut cursor: u64 = 0;
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .map_err(RedisBackendError::from)?;

            if !keys.is_empty() {
                conn.del::<_, ()>(keys)
                    .await
                    .map_err(RedisBackendError::from)?;
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_escape() {
        assert_eq!(glob_escape("rampart:"), "rampart:*");
        assert_eq!(glob_escape("a*b?[c]"), "a\\*b\\?\\[c\\]*");
    }

    #[test]
    fn test_ttl_millis_is_positive() {
        assert_eq!(ttl_millis(Duration::ZERO), 1);
        assert_eq!(ttl_millis(Duration::from_secs(2)), 2000);
        assert_eq!(ttl_millis(Duration::from_micros(1_500)), 2);
    }

    #[tokio::test]
    async fn test_calls_before_connect_are_unavailable() {
        let backend = RedisBackend::new(RedisConfig::new("redis://127.0.0.1:1"));
        assert!(matches!(
            backend.get("k").await,
            Err(CacheError::Unavailable { .. })
        ));
        assert!(backend.disconnect().await.is_ok());
    }

    #[test]
    fn test_error_conversion() {
        let err: CacheError = RedisBackendError::PoolCreate("bad url".to_string()).into();
        assert!(matches!(err, CacheError::Backend { .. }));
    }
}
