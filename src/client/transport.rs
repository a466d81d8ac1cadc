//! HTTP transport seam for the fetch pipeline
//!
//! The pipeline only needs two operations, GET and POST returning the
//! fully accumulated response body, so that is the whole contract.
//! `ReqwestTransport` is the production implementation.

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;

/// Errors that can occur issuing an outbound request
#[derive(Debug, Error)]
pub enum TransportError {
    /// The request could not be sent or the body could not be read
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status
    #[error("HTTP request returned status {0}")]
    Status(u16),
}

/// Outbound HTTP contract consumed by the fetch pipeline
///
/// Both operations resolve once with the complete response body; there is
/// no streaming or partial processing. Retries, timeouts and backoff are
/// the implementation's (or its underlying client's) concern, never the
/// pipeline's.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Issues a GET request to `url` with the given headers
    async fn get(&self, url: &str, headers: &[(String, String)]) -> Result<String, TransportError>;

    /// Issues a POST request to `url` with the given headers and body
    async fn post(
        &self,
        url: &str,
        headers: &[(String, String)],
        body: &str,
    ) -> Result<String, TransportError>;
}

/// reqwest-backed transport
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Creates a transport with a default reqwest client
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a transport from a preconfigured reqwest client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    async fn read_body(response: reqwest::Response) -> Result<String, TransportError> {
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }
        Ok(response.text().await?)
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &str, headers: &[(String, String)]) -> Result<String, TransportError> {
        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }
        Self::read_body(request.send().await?).await
    }

    async fn post(
        &self,
        url: &str,
        headers: &[(String, String)],
        body: &str,
    ) -> Result<String, TransportError> {
        let mut request = self.client.post(url).body(body.to_string());
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }
        Self::read_body(request.send().await?).await
    }
}
