//! In-process cache backend with real TTL expiry
//!
//! `MemoryBackend` implements [`CacheBackend`](super::CacheBackend) over a
//! mutex-guarded map. It serves two purposes: a standalone backend for
//! deployments without an external key-value service, and a drop-in double
//! for exercising the store and pipeline in tests.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;

use super::store::{CacheBackend, StoreError};

/// A single stored value with its expiry timestamp
#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: DateTime<Utc>,
}

/// In-memory key-value backend with per-entry expiry
///
/// Expired entries are dropped lazily on read. The `fail_connects`
/// constructor produces a backend that refuses to connect, for exercising
/// the store's connect-failure path.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, Entry>>,
    refuse_connections: bool,
}

impl MemoryBackend {
    /// Creates an empty backend that accepts connections
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend whose `connect` always fails
    pub fn fail_connects() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            refuse_connections: true,
        }
    }

    /// Returns the expiry timestamp recorded for `key`, if the entry exists
    ///
    /// Exposed so callers (and tests) can verify which TTL a write ended up
    /// with, without widening the `CacheBackend` contract.
    pub async fn expires_at(&self, key: &str) -> Option<DateTime<Utc>> {
        self.entries.lock().await.get(key).map(|e| e.expires_at)
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn connect(&self, _instances: &[String]) -> Result<(), StoreError> {
        if self.refuse_connections {
            return Err(StoreError::Connect(
                "memory backend configured to refuse connections".to_string(),
            ));
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if Utc::now() > entry.expires_at => {
                entries.remove(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.value.clone())),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StoreError> {
        // A TTL too large to represent saturates to "never expires"
        let expires_at = i64::try_from(ttl_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .and_then(|ttl| Utc::now().checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let entry = Entry {
            value: value.to_string(),
            expires_at,
        };
        self.entries.lock().await.insert(key.to_string(), entry);
        Ok(())
    }
}
