//! Secret redaction for credentials that pass through logs and debug output.
//!
//! # Example
//!
//! ```rust
//! use geonarrator::redact::RedactedString;
//!
//! let api_key = RedactedString::new("AIza-1234567890");
//! assert_eq!(format!("{api_key}"), "[REDACTED]");
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// A string wrapper that redacts its value in Display and Debug output.
///
/// The only way to read the inner value is [`as_str`](RedactedString::as_str).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RedactedString {
    inner: String,
}

impl RedactedString {
    /// Create a new redacted string.
    pub fn new<S: Into<String>>(value: S) -> Self {
        Self {
            inner: value.into(),
        }
    }

    /// Access the inner value, e.g. for an HTTP header.
    pub fn as_str(&self) -> &str {
        &self.inner
    }

    /// Whether the wrapped value is empty or whitespace.
    pub fn is_blank(&self) -> bool {
        self.inner.trim().is_empty()
    }
}

impl fmt::Display for RedactedString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl fmt::Debug for RedactedString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RedactedString(\"[REDACTED]\")")
    }
}

/// Replace every occurrence of `secret` in `text` with `***REDACTED***`.
///
/// Used on error messages built from transport errors, which may echo the
/// request URL or headers.
pub fn redact_secret(text: &str, secret: &str) -> String {
    if secret.is_empty() {
        return text.to_string();
    }
    text.replace(secret, "***REDACTED***")
}
