//! Schema-driven reduction of raw API responses
//!
//! Upstream APIs return large JSON payloads of which only a handful of
//! fields matter. A [`FilterSchema`] knows two things about one upstream
//! API: where the entry array lives inside the response (some APIs bury it
//! under nested containers, e.g. `Result.Response.Values`) and how to
//! normalize a single entry. Splitting those steps lets schema authors reuse
//! entry normalization across different container shapes.
//!
//! [`ResponseFilter::apply`] is the single fail-safe boundary of the crate:
//! malformed upstream payloads are logged and degrade to `None`, they never
//! propagate an error to the caller.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::error;

/// Errors raised when constructing a response filter
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FilterError {
    /// No schema registered under the requested identifier
    #[error("no filter schema registered for '{0}'")]
    NotFound(String),
}

/// Per-upstream-API capability for locating and normalizing entries
///
/// Implemented once per third-party API and handed to the
/// [`ResponseFilter`] that serves that API's client.
pub trait FilterSchema: Send + Sync {
    /// Locates the array of raw entries inside the parsed response
    ///
    /// Returns `None` when the response does not have the expected shape.
    fn entries(&self, response: &Value) -> Option<Vec<Value>>;

    /// Reduces one raw entry to its normalized form
    fn filter_entry(&self, entry: &Value) -> Value;
}

/// The normalized sequence of entries produced by one filter pass
///
/// Exposed through two read-only views derived from the same underlying
/// sequence: [`as_object`](FilteredResult::as_object) for returning to the
/// caller and [`as_json`](FilteredResult::as_json) for writing to the cache.
/// Serialization never re-filters.
#[derive(Debug, Clone, PartialEq)]
pub struct FilteredResult {
    entries: Vec<Value>,
}

impl FilteredResult {
    /// Structured view of the filtered entries
    pub fn as_object(&self) -> &[Value] {
        &self.entries
    }

    /// Consumes the result, yielding the filtered entries
    pub fn into_object(self) -> Vec<Value> {
        self.entries
    }

    /// Serialized view of the filtered entries, for cache storage
    pub fn as_json(&self) -> String {
        // Value trees always serialize; substituting anything else here
        // would let the two views diverge from the shared sequence
        serde_json::to_string(&self.entries)
            .expect("a Value tree always serializes to JSON")
    }
}

/// Applies a filter schema to raw response bodies
pub struct ResponseFilter {
    schema: Arc<dyn FilterSchema>,
}

impl ResponseFilter {
    /// Creates a filter from a schema capability
    pub fn new(schema: Arc<dyn FilterSchema>) -> Self {
        Self { schema }
    }

    /// Resolves a schema identifier against an explicit registry
    ///
    /// The mapping is supplied by the caller; an unknown identifier fails
    /// with [`FilterError::NotFound`], which callers log and treat as "no
    /// filter available" for that client.
    pub fn from_registry(
        registry: &HashMap<String, Arc<dyn FilterSchema>>,
        id: &str,
    ) -> Result<Self, FilterError> {
        match registry.get(id) {
            Some(schema) => Ok(Self::new(schema.clone())),
            None => {
                error!(filter = id, "no filter schema registered under this identifier");
                Err(FilterError::NotFound(id.to_string()))
            }
        }
    }

    /// Parses and filters a raw response body
    ///
    /// Every raw body is assumed to be JSON. If parsing fails, or the schema
    /// cannot locate the entry array, the failure is logged and `None` is
    /// returned; nothing propagates past this boundary. Callers must treat
    /// `None` as "no result", not as an empty result.
    pub fn apply(&self, raw_data: &str) -> Option<FilteredResult> {
        let response: Value = match serde_json::from_str(raw_data) {
            Ok(parsed) => parsed,
            Err(e) => {
                error!(error = %e, "response body is not valid JSON, dropping");
                return None;
            }
        };

        let entries = match self.schema.entries(&response) {
            Some(entries) => entries,
            None => {
                error!("filter schema found no entry array in the response");
                return None;
            }
        };

        let filtered = entries
            .iter()
            .map(|entry| self.schema.filter_entry(entry))
            .collect();

        Some(FilteredResult { entries: filtered })
    }
}
