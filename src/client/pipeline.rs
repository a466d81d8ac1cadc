//! The request-cache-filter pipeline
//!
//! `FetchPipeline` orchestrates one logical call: check the cache, fall
//! back to the network on a miss, reduce the raw body through the response
//! filter and write the filtered result back to the cache. Cache hits
//! return the stored value directly: it is already filtered, so nothing
//! is re-filtered on the hit path.
//!
//! One pipeline is built per upstream API from a [`ClientConfig`] value
//! object; there is no per-API subclassing. The shared [`CacheStore`] is
//! passed in by reference at construction.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};
use url::form_urlencoded;

use crate::cache::CacheStore;
use crate::client::transport::{HttpTransport, TransportError};
use crate::filter::ResponseFilter;

/// Errors terminating a fetch call
#[derive(Debug, Error)]
pub enum FetchError {
    /// No response filter is available for this client; the pipeline cannot
    /// process fresh responses (cache hits are still served)
    #[error("no response filter is available for this client")]
    FilterUnavailable,

    /// The response body could not be parsed or filtered
    #[error("the response could not be filtered")]
    Filter,

    /// The outbound request failed; not retried by the pipeline
    #[error("network request failed: {0}")]
    Network(#[from] TransportError),
}

/// Per-upstream-API configuration for a fetch pipeline
///
/// Replaces per-API client subclassing: everything one upstream API needs
/// to customize (host, base path, default parameters, headers, TTL) is a
/// plain value here, built with `with_*` methods.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    host: String,
    base_path: String,
    client_id: String,
    default_parameters: Vec<(String, String)>,
    headers: Vec<(String, String)>,
    default_ttl: Option<u64>,
    secure: bool,
}

impl ClientConfig {
    /// Creates a configuration for the given host (no scheme, e.g.
    /// `"maps.googleapis.com"`)
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            base_path: String::new(),
            client_id: "default".to_string(),
            default_parameters: Vec::new(),
            headers: Vec::new(),
            default_ttl: None,
            secure: false,
        }
    }

    /// Sets the path prefix prepended to every request (e.g.
    /// `"/maps/api/directions/json"`)
    pub fn with_base_path(mut self, base_path: impl Into<String>) -> Self {
        self.base_path = base_path.into();
        self
    }

    /// Sets the client identifier used in log messages
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    /// Adds a parameter attached to every request (e.g. a credential key or
    /// a language), applied before per-call parameters
    pub fn with_default_parameter(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.default_parameters.push((name.into(), value.into()));
        self
    }

    /// Adds a header attached to every request
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Attaches an HTTP Basic Authentication header
    ///
    /// The credential is encoded once here and reused on every request from
    /// this client; it is never recomputed per call.
    pub fn with_basic_auth(self, username: &str, password: &str) -> Self {
        let credentials = BASE64.encode(format!("{username}:{password}"));
        self.with_header("Authorization", format!("Basic {credentials}"))
    }

    /// Overrides the store-level default TTL for this client's writes
    /// (e.g. 300s for a fast-moving API against a 3600s store default)
    pub fn with_default_ttl(mut self, ttl_secs: u64) -> Self {
        self.default_ttl = Some(ttl_secs);
        self
    }

    /// Sends requests over HTTPS instead of plain HTTP
    pub fn with_https(mut self) -> Self {
        self.secure = true;
        self
    }
}

/// Orchestrates cache lookup, network fetch, filtering and cache write-back
///
/// Calls with distinct keys proceed independently; the pipeline holds no
/// global lock and does not deduplicate concurrent identical-key calls:
/// two simultaneous misses on the same key both fetch and the last cache
/// write wins. Single-flight behavior, retries and timeouts belong to the
/// caller or the transport.
pub struct FetchPipeline {
    config: ClientConfig,
    store: Arc<CacheStore>,
    filter: Option<ResponseFilter>,
    transport: Arc<dyn HttpTransport>,
}

impl FetchPipeline {
    /// Creates a pipeline for one upstream API
    ///
    /// `filter` is `None` when no schema could be resolved for this client;
    /// such a pipeline still serves cache hits but fails fresh fetches with
    /// [`FetchError::FilterUnavailable`].
    pub fn new(
        config: ClientConfig,
        store: Arc<CacheStore>,
        filter: Option<ResponseFilter>,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            config,
            store,
            filter,
            transport,
        }
    }

    /// Performs a GET request with caching of the filtered result
    ///
    /// Per-call `parameters` are appended after the configured defaults,
    /// so on a name collision the per-call value is the later (and
    /// effective) one, deterministically.
    ///
    /// # Errors
    /// Fails with [`FetchError::Network`] when the request cannot be
    /// issued, and with [`FetchError::Filter`] when the response cannot be
    /// filtered. Neither case writes to the cache.
    pub async fn fetch_get(
        &self,
        parameters: &[(String, String)],
        cache_key: &str,
    ) -> Result<Vec<Value>, FetchError> {
        if let Some(hit) = self.cache_lookup(cache_key).await {
            return Ok(hit);
        }

        let url = self.build_url(parameters);
        let body = self.transport.get(&url, &self.config.headers).await?;
        self.filter_and_store(cache_key, &body).await
    }

    /// Performs a POST request with caching of the filtered result
    ///
    /// The message body is sent as-is; the URL carries only the configured
    /// default parameters. The cache and filter path is identical to
    /// [`fetch_get`](FetchPipeline::fetch_get).
    pub async fn fetch_post(&self, body: &str, cache_key: &str) -> Result<Vec<Value>, FetchError> {
        if let Some(hit) = self.cache_lookup(cache_key).await {
            return Ok(hit);
        }

        let url = self.build_url(&[]);
        let raw = self
            .transport
            .post(&url, &self.config.headers, body)
            .await?;
        self.filter_and_store(cache_key, &raw).await
    }

    /// Builds the request URL from defaults plus per-call parameters
    ///
    /// An empty combined parameter set yields a URL without a `?`.
    fn build_url(&self, parameters: &[(String, String)]) -> String {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (name, value) in &self.config.default_parameters {
            serializer.append_pair(name, value);
        }
        for (name, value) in parameters {
            serializer.append_pair(name, value);
        }
        let query = serializer.finish();

        let scheme = if self.config.secure { "https" } else { "http" };
        let mut request_url = format!("{}://{}{}", scheme, self.config.host, self.config.base_path);
        if !query.is_empty() {
            request_url.push('?');
            request_url.push_str(&query);
        }
        request_url
    }

    /// Returns the cached entries for `key`, or `None` on any miss
    ///
    /// Every lookup failure (absent key, backend error, a stored value
    /// that no longer parses) is treated uniformly as a miss.
    async fn cache_lookup(&self, key: &str) -> Option<Vec<Value>> {
        let stored = match self.store.get(key).await {
            Ok(Some(value)) => value,
            Ok(None) => return None,
            Err(e) => {
                debug!(client = %self.config.client_id, key, error = %e, "cache lookup failed, treating as miss");
                return None;
            }
        };

        match serde_json::from_str(&stored) {
            Ok(entries) => Some(entries),
            Err(e) => {
                warn!(client = %self.config.client_id, key, error = %e, "cached value did not parse, treating as miss");
                None
            }
        }
    }

    /// Filters a raw body and writes the result back to the cache
    ///
    /// The filtered JSON is stored, not the raw body, so cache hits skip
    /// re-filtering entirely. A failed cache write is logged and swallowed:
    /// the result was already computed from the network, so the call still
    /// succeeds.
    async fn filter_and_store(&self, key: &str, raw: &str) -> Result<Vec<Value>, FetchError> {
        let filter = self.filter.as_ref().ok_or(FetchError::FilterUnavailable)?;
        let filtered = filter.apply(raw).ok_or(FetchError::Filter)?;

        if let Err(e) = self
            .store
            .set(key, &filtered.as_json(), self.config.default_ttl)
            .await
        {
            warn!(client = %self.config.client_id, key, error = %e, "cache write failed, returning fresh result anyway");
        }

        Ok(filtered.into_object())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheBackend, CacheConfig, MemoryBackend, StoreError};
    use crate::filter::FilterSchema;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Transport double returning a canned body and recording each request
    struct MockTransport {
        body: String,
        calls: AtomicUsize,
        last_url: Mutex<Option<String>>,
        last_headers: Mutex<Vec<(String, String)>>,
        last_body: Mutex<Option<String>>,
    }

    impl MockTransport {
        fn returning(body: &str) -> Arc<Self> {
            Arc::new(Self {
                body: body.to_string(),
                calls: AtomicUsize::new(0),
                last_url: Mutex::new(None),
                last_headers: Mutex::new(Vec::new()),
                last_body: Mutex::new(None),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn last_url(&self) -> Option<String> {
            self.last_url.lock().unwrap().clone()
        }

        fn record(&self, url: &str, headers: &[(String, String)]) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_url.lock().unwrap() = Some(url.to_string());
            *self.last_headers.lock().unwrap() = headers.to_vec();
        }
    }

    #[async_trait]
    impl HttpTransport for MockTransport {
        async fn get(
            &self,
            url: &str,
            headers: &[(String, String)],
        ) -> Result<String, TransportError> {
            self.record(url, headers);
            Ok(self.body.clone())
        }

        async fn post(
            &self,
            url: &str,
            headers: &[(String, String)],
            body: &str,
        ) -> Result<String, TransportError> {
            self.record(url, headers);
            *self.last_body.lock().unwrap() = Some(body.to_string());
            Ok(self.body.clone())
        }
    }

    /// Backend whose every get and set fails, for the degradation paths
    struct BrokenBackend;

    #[async_trait]
    impl CacheBackend for BrokenBackend {
        async fn connect(&self, _instances: &[String]) -> Result<(), StoreError> {
            Ok(())
        }

        async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Unavailable("backend down".to_string()))
        }

        async fn set(&self, _key: &str, _value: &str, _ttl: u64) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("backend down".to_string()))
        }
    }

    /// Schema matching the mock payload `{"items":[{"raw":...}]}`
    struct ItemsSchema;

    impl FilterSchema for ItemsSchema {
        fn entries(&self, response: &Value) -> Option<Vec<Value>> {
            response.get("items")?.as_array().cloned()
        }

        fn filter_entry(&self, entry: &Value) -> Value {
            json!({ "n": entry.get("raw").cloned().unwrap_or(Value::Null) })
        }
    }

    fn items_filter() -> Option<ResponseFilter> {
        Some(ResponseFilter::new(Arc::new(ItemsSchema)))
    }

    async fn connected_store(backend: Arc<dyn CacheBackend>) -> Arc<CacheStore> {
        Arc::new(
            CacheStore::connect(backend, CacheConfig::default())
                .await
                .expect("connect should succeed"),
        )
    }

    async fn pipeline_with(
        config: ClientConfig,
        transport: Arc<MockTransport>,
    ) -> (FetchPipeline, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new());
        let store = connected_store(backend.clone()).await;
        let pipeline = FetchPipeline::new(config, store, items_filter(), transport);
        (pipeline, backend)
    }

    #[tokio::test]
    async fn test_cache_hit_skips_network_and_filter() {
        let transport = MockTransport::returning("ignored");
        let (pipeline, backend) =
            pipeline_with(ClientConfig::new("api.example.com"), transport.clone()).await;

        backend
            .set("routes_5", r#"[{"name":"x"}]"#, 60)
            .await
            .unwrap();

        let data = pipeline.fetch_get(&[], "routes_5").await.unwrap();

        assert_eq!(data, [json!({"name":"x"})]);
        assert_eq!(transport.calls(), 0, "a cache hit must not hit the network");
    }

    #[tokio::test]
    async fn test_cache_miss_fetches_filters_and_stores() {
        let transport = MockTransport::returning(r#"{"items":[{"raw":"a"}]}"#);
        let (pipeline, backend) =
            pipeline_with(ClientConfig::new("api.example.com"), transport.clone()).await;

        let data = pipeline.fetch_get(&[], "routes_5").await.unwrap();

        assert_eq!(data, [json!({"n":"a"})]);
        assert_eq!(transport.calls(), 1);
        // The filtered JSON, not the raw body, ends up in the cache
        let stored = backend.get("routes_5").await.unwrap().unwrap();
        assert_eq!(stored, r#"[{"n":"a"}]"#);
    }

    #[tokio::test]
    async fn test_second_call_is_served_from_cache() {
        let transport = MockTransport::returning(r#"{"items":[{"raw":"a"}]}"#);
        let (pipeline, _backend) =
            pipeline_with(ClientConfig::new("api.example.com"), transport.clone()).await;

        let first = pipeline.fetch_get(&[], "routes_5").await.unwrap();
        let second = pipeline.fetch_get(&[], "routes_5").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(transport.calls(), 1, "second call must be a cache hit");
    }

    #[tokio::test]
    async fn test_malformed_payload_fails_without_cache_write() {
        let transport = MockTransport::returning("<html>not json</html>");
        let (pipeline, backend) =
            pipeline_with(ClientConfig::new("api.example.com"), transport.clone()).await;

        let result = pipeline.fetch_get(&[], "routes_5").await;

        assert!(matches!(result, Err(FetchError::Filter)));
        assert!(
            backend.get("routes_5").await.unwrap().is_none(),
            "a failed filter pass must not write to the cache"
        );
    }

    #[tokio::test]
    async fn test_missing_filter_fails_fresh_fetch_but_serves_hits() {
        let transport = MockTransport::returning(r#"{"items":[]}"#);
        let backend = Arc::new(MemoryBackend::new());
        let store = connected_store(backend.clone()).await;
        let pipeline = FetchPipeline::new(
            ClientConfig::new("api.example.com"),
            store,
            None,
            transport.clone(),
        );

        let miss = pipeline.fetch_get(&[], "routes_5").await;
        assert!(matches!(miss, Err(FetchError::FilterUnavailable)));

        backend.set("routes_5", r#"[{"n":"a"}]"#, 60).await.unwrap();
        let hit = pipeline.fetch_get(&[], "routes_5").await.unwrap();
        assert_eq!(hit, [json!({"n":"a"})]);
    }

    #[tokio::test]
    async fn test_backend_errors_degrade_to_miss_and_swallowed_write() {
        let transport = MockTransport::returning(r#"{"items":[{"raw":"a"}]}"#);
        let store = connected_store(Arc::new(BrokenBackend)).await;
        let pipeline = FetchPipeline::new(
            ClientConfig::new("api.example.com"),
            store,
            items_filter(),
            transport.clone(),
        );

        // get fails -> miss -> network; set fails -> logged, call succeeds
        let data = pipeline.fetch_get(&[], "routes_5").await.unwrap();

        assert_eq!(data, [json!({"n":"a"})]);
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_cached_value_falls_through_to_network() {
        let transport = MockTransport::returning(r#"{"items":[{"raw":"a"}]}"#);
        let (pipeline, backend) =
            pipeline_with(ClientConfig::new("api.example.com"), transport.clone()).await;

        backend.set("routes_5", "{{{garbage", 60).await.unwrap();

        let data = pipeline.fetch_get(&[], "routes_5").await.unwrap();

        assert_eq!(data, [json!({"n":"a"})]);
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_default_parameters_precede_call_parameters() {
        let config = ClientConfig::new("api.example.com")
            .with_base_path("/v1/search")
            .with_default_parameter("key", "abc")
            .with_default_parameter("lang", "en");
        let transport = MockTransport::returning(r#"{"items":[]}"#);
        let (pipeline, _backend) = pipeline_with(config, transport.clone()).await;

        let parameters = [("q".to_string(), "bus stop".to_string())];
        pipeline.fetch_get(&parameters, "search_1").await.unwrap();

        assert_eq!(
            transport.last_url().unwrap(),
            "http://api.example.com/v1/search?key=abc&lang=en&q=bus+stop"
        );
    }

    #[tokio::test]
    async fn test_empty_parameter_set_builds_url_without_separator() {
        let config = ClientConfig::new("api.example.com").with_base_path("/v1/status");
        let transport = MockTransport::returning(r#"{"items":[]}"#);
        let (pipeline, _backend) = pipeline_with(config, transport.clone()).await;

        pipeline.fetch_get(&[], "status_1").await.unwrap();

        assert_eq!(
            transport.last_url().unwrap(),
            "http://api.example.com/v1/status"
        );
    }

    #[tokio::test]
    async fn test_https_selects_encrypted_scheme() {
        let config = ClientConfig::new("maps.example.com").with_https();
        let transport = MockTransport::returning(r#"{"items":[]}"#);
        let (pipeline, _backend) = pipeline_with(config, transport.clone()).await;

        pipeline.fetch_get(&[], "maps_1").await.unwrap();

        assert!(transport.last_url().unwrap().starts_with("https://"));
    }

    #[tokio::test]
    async fn test_basic_auth_header_is_attached() {
        let config = ClientConfig::new("api.example.com").with_basic_auth("user", "pass");
        let transport = MockTransport::returning(r#"{"items":[]}"#);
        let (pipeline, _backend) = pipeline_with(config, transport.clone()).await;

        pipeline.fetch_get(&[], "auth_1").await.unwrap();

        let headers = transport.last_headers.lock().unwrap().clone();
        assert!(headers.contains(&(
            "Authorization".to_string(),
            // base64("user:pass")
            "Basic dXNlcjpwYXNz".to_string()
        )));
    }

    #[tokio::test]
    async fn test_post_shares_the_cache_and_filter_path() {
        let transport = MockTransport::returning(r#"{"items":[{"raw":"b"}]}"#);
        let (pipeline, backend) =
            pipeline_with(ClientConfig::new("api.example.com"), transport.clone()).await;

        let data = pipeline
            .fetch_post(r#"{"query":"directions"}"#, "post_5")
            .await
            .unwrap();

        assert_eq!(data, [json!({"n":"b"})]);
        assert_eq!(
            transport.last_body.lock().unwrap().as_deref(),
            Some(r#"{"query":"directions"}"#)
        );
        let stored = backend.get("post_5").await.unwrap().unwrap();
        assert_eq!(stored, r#"[{"n":"b"}]"#);
    }

    #[tokio::test]
    async fn test_client_ttl_override_applies_to_writes() {
        let config = ClientConfig::new("api.example.com").with_default_ttl(300);
        let transport = MockTransport::returning(r#"{"items":[{"raw":"a"}]}"#);
        let (pipeline, backend) = pipeline_with(config, transport.clone()).await;

        pipeline.fetch_get(&[], "short_5").await.unwrap();

        let expires = backend.expires_at("short_5").await.unwrap();
        let remaining = (expires - chrono::Utc::now()).num_seconds();
        assert!(
            (295..=300).contains(&remaining),
            "expected the 300s client override, got {remaining}s"
        );
    }

    #[tokio::test]
    async fn test_concurrent_distinct_keys_proceed_independently() {
        let transport = MockTransport::returning(r#"{"items":[{"raw":"a"}]}"#);
        let (pipeline, _backend) =
            pipeline_with(ClientConfig::new("api.example.com"), transport.clone()).await;

        let (left, right) = futures::future::join(
            pipeline.fetch_get(&[], "left_1"),
            pipeline.fetch_get(&[], "right_1"),
        )
        .await;

        assert!(left.is_ok());
        assert!(right.is_ok());
        assert_eq!(transport.calls(), 2);
    }
}
