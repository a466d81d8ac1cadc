//! Cache key derivation
//!
//! Keys are composed from a prefix and an optional postfix, then sanitized
//! down to `[A-Za-z0-9_]`. The postfix doubles as the de facto cache
//! invalidation mechanism: callers embed a version number in it so that a
//! schema change naturally stops hitting stale entries.

use thiserror::Error;

/// Errors raised when deriving or validating a cache key
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    /// The key prefix was empty
    #[error("cache key prefix must be a non-empty string")]
    EmptyPrefix,

    /// The key exceeds the store's configured maximum length
    #[error("cache key length {length} exceeds the configured maximum")]
    TooLong { length: usize },
}

/// Derives a cache key from a prefix and an optional postfix
///
/// The two parts are joined as `prefix_postfix` (a missing postfix defaults
/// to the empty string) and every character outside `[A-Za-z0-9_]` is
/// stripped, case preserved. There is no uniqueness guarantee across calls;
/// callers must pick prefixes and postfixes that disambiguate logically
/// distinct requests.
///
/// # Errors
/// Returns `KeyError::EmptyPrefix` when `prefix` is empty.
pub fn build_key(prefix: &str, postfix: Option<&str>) -> Result<String, KeyError> {
    if prefix.is_empty() {
        return Err(KeyError::EmptyPrefix);
    }

    let joined = format!("{}_{}", prefix, postfix.unwrap_or(""));
    Ok(joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect())
}
