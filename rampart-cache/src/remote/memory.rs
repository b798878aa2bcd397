//! In-process remote backend.
//!
//! Stands in for a shared store in development and tests. It honours TTLs
//! and can be switched offline to exercise the degraded paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use rampart_core::{system_clock, CacheError, SharedClock};

use super::RemoteBackend;

#[derive(Debug)]
struct StoredBytes {
    bytes: Vec<u8>,
    expires_at: Option<Instant>,
}

/// A [`RemoteBackend`] that keeps everything in a local map.
#[derive(Debug)]
pub struct InMemoryBackend {
    data: Mutex<HashMap<String, StoredBytes>>,
    online: AtomicBool,
    clock: SharedClock,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::with_clock(system_clock())
    }

    pub fn with_clock(clock: SharedClock) -> Self {
        Self {
            data: Mutex::new(HashMap::new()),
            online: AtomicBool::new(true),
            clock,
        }
    }

    /// While offline every call fails with [`CacheError::Unavailable`].
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::Release);
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    /// Number of stored keys, expired or not.
    pub fn len(&self) -> usize {
        self.data.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a live value is stored under the exact (namespaced) key.
    pub fn contains(&self, key: &str) -> bool {
        let now = self.clock.now();
        self.data
            .lock()
            .get(key)
            .is_some_and(|stored| stored.expires_at.map_or(true, |at| at > now))
    }

    fn ensure_online(&self) -> Result<(), CacheError> {
        if self.is_online() {
            Ok(())
        } else {
            Err(CacheError::Unavailable {
                backend: self.name().to_string(),
            })
        }
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteBackend for InMemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    async fn connect(&self) -> Result<(), CacheError> {
        self.ensure_online()
    }

    async fn disconnect(&self) -> Result<(), CacheError> {
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        self.ensure_online()?;
        let now = self.clock.now();
        let mut data = self.data.lock();
        let expired = match data.get(key) {
            None => return Ok(None),
            Some(stored) => stored.expires_at.is_some_and(|at| at <= now),
        };
        if expired {
            data.remove(key);
            return Ok(None);
        }
        Ok(data.get(key).map(|stored| stored.bytes.clone()))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<(), CacheError> {
        self.ensure_online()?;
        let expires_at = ttl.map(|ttl| self.clock.now() + ttl);
        self.data.lock().insert(
            key.to_string(),
            StoredBytes {
                bytes: value,
                expires_at,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        self.ensure_online()?;
        Ok(self.data.lock().remove(key).is_some())
    }

    async fn clear(&self, prefix: &str) -> Result<(), CacheError> {
        self.ensure_online()?;
        self.data.lock().retain(|key, _| !key.starts_with(prefix));
        Ok(())
    }
}
