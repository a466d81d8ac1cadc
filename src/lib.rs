//! fetchcache - a caching proxy layer for outbound JSON API calls
//!
//! The crate wraps third-party HTTP APIs behind a request-cache-filter
//! pipeline: each logical call first checks a shared key-value cache, falls
//! back to the network on a miss, reduces the raw JSON response through a
//! pluggable filter schema, and writes the filtered result back to the cache
//! with a TTL. Cache hits return the stored, already-filtered value without
//! touching the network.
//!
//! The three layers are independent:
//! - [`cache`] - key derivation plus a TTL-aware store over a pluggable
//!   async backend
//! - [`filter`] - schema-driven reduction of raw responses
//! - [`client`] - the fetch pipeline orchestrating cache, network and filter

pub mod cache;
pub mod client;
pub mod filter;

pub use cache::{build_key, CacheBackend, CacheConfig, CacheStore, KeyError, MemoryBackend, StoreError};
pub use client::{
    ClientConfig, FetchError, FetchPipeline, HttpTransport, ReqwestTransport, TransportError,
};
pub use filter::{FilterError, FilterSchema, FilteredResult, ResponseFilter};
