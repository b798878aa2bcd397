//! Remote (L2) cache tier.
//!
//! [`RemoteBackend`] is the byte-level interface to an external key-value
//! store. [`RemoteCacheAdapter`] wraps a backend with the value codec, key
//! namespacing, a per-call timeout and graceful degradation: every backend
//! failure is logged at warn level and reported to the caller as a miss or a
//! no-op. The remote tier may vanish at any time without affecting
//! correctness, only latency.

mod memory;
#[cfg(feature = "redis")]
mod redis_backend;

pub use memory::InMemoryBackend;
#[cfg(feature = "redis")]
pub use redis_backend::{RedisBackend, RedisBackendError};

use std::future::Future;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rampart_core::CacheError;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec;

/// Byte-level interface to an external key-value store.
///
/// Implementations must be safe to share across tasks. Keys arrive already
/// namespaced by the adapter.
#[async_trait]
pub trait RemoteBackend: Send + Sync {
    /// Short name used in logs and errors.
    fn name(&self) -> &str;

    /// Establish connectivity. Called again after a failure to retry.
    async fn connect(&self) -> Result<(), CacheError>;

    /// Release connections.
    async fn disconnect(&self) -> Result<(), CacheError>;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<(), CacheError>;

    /// Returns whether a key was removed.
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;

    /// Remove every key starting with `prefix`.
    async fn clear(&self, prefix: &str) -> Result<(), CacheError>;
}

/// Connection state of the remote tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RemoteState {
    /// `connect` has not been called, or `disconnect` has.
    Disconnected = 0,
    /// Calls are forwarded to the backend.
    Connected = 1,
    /// The last `connect` failed; calls are skipped until a retry succeeds.
    Unavailable = 2,
}

impl RemoteState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => RemoteState::Connected,
            2 => RemoteState::Unavailable,
            _ => RemoteState::Disconnected,
        }
    }
}

/// Typed, fail-soft view of a [`RemoteBackend`].
pub struct RemoteCacheAdapter<V> {
    backend: Arc<dyn RemoteBackend>,
    namespace: String,
    timeout: Duration,
    state: AtomicU8,
    errors: AtomicU64,
    _value: PhantomData<fn() -> V>,
}

impl<V> RemoteCacheAdapter<V>
where
    V: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn new(backend: Arc<dyn RemoteBackend>, namespace: impl Into<String>, timeout: Duration) -> Self {
        Self {
            backend,
            namespace: namespace.into(),
            timeout,
            state: AtomicU8::new(RemoteState::Disconnected as u8),
            errors: AtomicU64::new(0),
            _value: PhantomData,
        }
    }

    pub fn state(&self) -> RemoteState {
        RemoteState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_available(&self) -> bool {
        self.state() == RemoteState::Connected
    }

    /// Number of failed, timed-out or undecodable remote calls.
    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Connect the backend. Idempotent; a failure is recorded as
    /// [`RemoteState::Unavailable`] instead of being returned.
    pub async fn connect(&self) -> bool {
        if self.is_available() {
            return true;
        }

        match tokio::time::timeout(self.timeout, self.backend.connect()).await {
            Ok(Ok(())) => {
                self.set_state(RemoteState::Connected);
                tracing::info!(backend = %self.backend.name(), "remote cache tier connected");
                true
            }
            Ok(Err(e)) => {
                self.set_state(RemoteState::Unavailable);
                tracing::warn!(
                    backend = %self.backend.name(),
                    error = %e,
                    "remote cache tier unavailable, continuing with local tier only"
                );
                false
            }
            Err(_) => {
                self.set_state(RemoteState::Unavailable);
                tracing::warn!(
                    backend = %self.backend.name(),
                    timeout = ?self.timeout,
                    "remote cache connect timed out, continuing with local tier only"
                );
                false
            }
        }
    }

    /// Disconnect the backend. Idempotent.
    pub async fn disconnect(&self) {
        if self.state() != RemoteState::Connected {
            self.set_state(RemoteState::Disconnected);
            return;
        }
        self.set_state(RemoteState::Disconnected);
        if let Some(Err(e)) = self.bounded(self.backend.disconnect()).await {
            tracing::warn!(backend = %self.backend.name(), error = %e, "remote cache disconnect failed");
        }
        tracing::info!(backend = %self.backend.name(), "remote cache tier disconnected");
    }

    /// Fetch a value and the TTL it was written with. Failures read as a miss.
    pub async fn get(&self, key: &str) -> Option<(V, Option<Duration>)> {
        if !self.is_available() {
            return None;
        }
        let full_key = self.full_key(key);
        let bytes = self.guarded("get", key, self.backend.get(&full_key)).await??;
        match codec::decode(&bytes) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                self.record_failure("get", key, &e);
                None
            }
        }
    }

    /// Store a value. Returns whether the backend accepted it.
    pub async fn set(&self, key: &str, value: &V, ttl: Option<Duration>) -> bool {
        if !self.is_available() {
            return false;
        }
        let bytes = match codec::encode(value, ttl) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.record_failure("set", key, &e);
                return false;
            }
        };
        let full_key = self.full_key(key);
        self.guarded("set", key, self.backend.set(&full_key, bytes, ttl))
            .await
            .is_some()
    }

    /// Remove a value. Returns whether the backend reported a removal.
    pub async fn delete(&self, key: &str) -> bool {
        if !self.is_available() {
            return false;
        }
        let full_key = self.full_key(key);
        self.guarded("delete", key, self.backend.delete(&full_key))
            .await
            .unwrap_or(false)
    }

    /// Remove every value under this adapter's namespace.
    pub async fn clear(&self) -> bool {
        if !self.is_available() {
            return false;
        }
        let prefix = self.full_key("");
        self.guarded("clear", "*", self.backend.clear(&prefix))
            .await
            .is_some()
    }

    fn full_key(&self, key: &str) -> String {
        if self.namespace.is_empty() {
            key.to_string()
        } else {
            format!("{}:{}", self.namespace, key)
        }
    }

    fn set_state(&self, state: RemoteState) {
        self.state.store(state as u8, Ordering::Release);
    }

    async fn bounded<T>(&self, fut: impl Future<Output = T>) -> Option<T> {
        tokio::time::timeout(self.timeout, fut).await.ok()
    }

    /// Run a backend call under the timeout, converting every failure into `None`.
    async fn guarded<T>(
        &self,
        op: &'static str,
        key: &str,
        fut: impl Future<Output = Result<T, CacheError>>,
    ) -> Option<T> {
        match self.bounded(fut).await {
            Some(Ok(value)) => Some(value),
            Some(Err(e)) => {
                self.record_failure(op, key, &e);
                None
            }
            None => {
                let e = CacheError::Timeout {
                    backend: self.backend.name().to_string(),
                    after: self.timeout,
                };
                self.record_failure(op, key, &e);
                None
            }
        }
    }

    fn record_failure(&self, op: &'static str, key: &str, error: &CacheError) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(
            backend = %self.backend.name(),
            op,
            key = %key,
            error = %error,
            "remote cache call failed, treating as miss"
        );
    }
}

impl<V> std::fmt::Debug for RemoteCacheAdapter<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteCacheAdapter")
            .field("backend", &self.backend.name())
            .field("namespace", &self.namespace)
            .field("timeout", &self.timeout)
            .field("state", &RemoteState::from_u8(self.state.load(Ordering::Relaxed)))
            .finish()
    }
}
