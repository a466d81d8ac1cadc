//! Client layer: HTTP transport and the fetch pipeline
//!
//! One [`FetchPipeline`] is constructed per upstream API from a
//! [`ClientConfig`] value object, a shared cache store, a response filter
//! and an HTTP transport. The transport is a trait seam so tests can swap
//! the network out entirely.

mod pipeline;
mod transport;

pub use pipeline::{ClientConfig, FetchError, FetchPipeline};
pub use transport::{HttpTransport, ReqwestTransport, TransportError};
