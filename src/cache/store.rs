//! Cache store: TTL and key-length policy over a pluggable async backend
//!
//! `CacheStore` wraps an external key-value service (memcached-style) behind
//! the `CacheBackend` trait. The store owns the policy decisions (default
//! TTL, maximum key length, one-shot connection at construction) while the
//! backend owns the wire protocol.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::error;

use super::key::KeyError;

/// Default time-to-live in seconds for entries set without an explicit TTL
pub const DEFAULT_TTL: u64 = 3600;

/// Maximum length accepted for a cache key
pub const MAX_KEY_LENGTH: usize = 250;

/// Errors surfaced by the cache store and its backends
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend connection could not be established
    #[error("failed to connect to the cache backend: {0}")]
    Connect(String),

    /// A get/set round-trip failed (timeout, disconnect, protocol error)
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),

    /// The key was rejected before the backend was contacted
    #[error("invalid cache key: {0}")]
    InvalidKey(#[from] KeyError),
}

/// Asynchronous key-value contract implemented by cache backends
///
/// A backend adapts one concrete client (an external service, or the
/// in-process [`MemoryBackend`](super::MemoryBackend)) to the get/set shape
/// the pipeline depends on. Values are opaque strings; expiry is the
/// backend's responsibility.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Establishes the connection to the given server instances
    async fn connect(&self, instances: &[String]) -> Result<(), StoreError>;

    /// Returns the stored value, or `None` when absent or expired
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Stores a value under `key` with the given TTL in seconds
    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StoreError>;
}

/// Configuration for a cache store
///
/// Matches the configuration surface consumed by the cache layer:
/// server instances, default TTL and maximum key length. Deserializable so
/// it can be read straight from an application config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// `host:port` addresses of the backing key-value service
    pub instances: Vec<String>,
    /// TTL in seconds applied when `set` is called without one
    pub default_ttl: u64,
    /// Longest key the store will pass through to the backend
    pub max_key_length: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            instances: Vec::new(),
            default_ttl: DEFAULT_TTL,
            max_key_length: MAX_KEY_LENGTH,
        }
    }
}

/// TTL-aware key-value store shared by all fetch pipelines in a process
///
/// Constructed once via [`CacheStore::connect`]; the connection outcome is
/// observed exactly there, and the store is then passed by reference (an
/// `Arc`) into every pipeline that needs it. There is no reconnection loop:
/// a store that failed to connect is never handed out.
pub struct CacheStore {
    backend: Arc<dyn CacheBackend>,
    config: CacheConfig,
}

impl CacheStore {
    /// Connects the backend and returns the ready store
    ///
    /// This is the single point where connection readiness or failure is
    /// observed. A failed connect is logged and returned once; the caller
    /// decides whether to run without a cache.
    pub async fn connect(
        backend: Arc<dyn CacheBackend>,
        config: CacheConfig,
    ) -> Result<Self, StoreError> {
        if let Err(e) = backend.connect(&config.instances).await {
            error!(error = %e, "cache backend connection failed");
            return Err(e);
        }
        Ok(Self { backend, config })
    }

    /// Reads a value from the cache
    ///
    /// `Ok(None)` means the key is absent or expired. Callers in the fetch
    /// pipeline treat `Err` and `Ok(None)` uniformly as a cache miss.
    pub async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.backend.get(key).await
    }

    /// Writes a value to the cache
    ///
    /// The key length is validated first: an over-long key fails with
    /// `StoreError::InvalidKey` without contacting the backend. Truncating
    /// instead would hide application bugs behind silently colliding keys.
    /// When `ttl_secs` is `None` the configured default applies.
    pub async fn set(
        &self,
        key: &str,
        value: &str,
        ttl_secs: Option<u64>,
    ) -> Result<(), StoreError> {
        if key.len() > self.config.max_key_length {
            return Err(StoreError::InvalidKey(KeyError::TooLong {
                length: key.len(),
            }));
        }

        let ttl = ttl_secs.unwrap_or(self.config.default_ttl);
        self.backend.set(key, value, ttl).await
    }

    /// Returns the store-level default TTL in seconds
    pub fn default_ttl(&self) -> u64 {
        self.config.default_ttl
    }
}
