//! Cache layer: key derivation and a TTL-aware store over a pluggable backend
//!
//! This module provides the key codec used to derive sanitized cache keys,
//! the `CacheStore` policy layer (TTL defaulting, key-length enforcement,
//! explicit one-shot connection) and an in-process `MemoryBackend` that
//! stands in for an external key-value service.

mod key;
mod memory;
mod store;

pub use key::{build_key, KeyError};
pub use memory::MemoryBackend;
pub use store::{CacheBackend, CacheConfig, CacheStore, StoreError, DEFAULT_TTL, MAX_KEY_LENGTH};
