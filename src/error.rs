//! Error types for document fetching and materialization.
//!
//! Every variant carries the URL or path it concerns so a crawl worker can
//! record a failed document with a useful reason without extra bookkeeping.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Boxed source error for failures coming from heterogeneous transports.
pub type BoxedSource = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while fetching or materializing a document.
///
/// A redirect found while opening is a successful outcome and is reported
/// through [`Retrieval::Redirect`](crate::document::Retrieval::Redirect).
/// [`FetchError::Moved`] only covers the rare redirect found by a lazy load
/// after the document was opened; it carries the target untouched.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The target does not exist, is unreadable, or is a directory where a
    /// file was expected. Also covers share and mailbox connection failures.
    #[error("resource unavailable {url}: {reason}")]
    ResourceUnavailable {
        /// The URL that could not be loaded.
        url: String,
        /// Human-readable reason.
        reason: String,
        /// The underlying transport error, when there is one.
        #[source]
        source: Option<BoxedSource>,
    },

    /// The URL does not match the shape expected for its scheme.
    #[error("malformed reference {url}: {reason}")]
    MalformedReference {
        /// The offending URL.
        url: String,
        /// What was wrong with it.
        reason: String,
    },

    /// The HTTP fetch exceeded its deadline.
    #[error("loading {url} timed out after {} seconds", .after.as_secs())]
    Timeout {
        /// The URL that timed out.
        url: String,
        /// The budget that was exceeded.
        after: Duration,
    },

    /// HTTP error response (4xx client errors, 5xx server errors).
    #[error("HTTP {status} loading {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error loading {url}: {source}")]
    Network {
        /// The URL that failed to load.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Creating or writing a materialized file (owned temp file or caller path) failed.
    #[error("temporary file error at {path}: {source}")]
    TemporaryResource {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A lazy load found that the resource moved; `target` must be scheduled.
    #[error("{url} moved to {target}")]
    Moved {
        /// The URL that was opened.
        url: String,
        /// The new location, as reported by the adapter.
        target: String,
    },

    /// No adapter is registered for the URL's scheme.
    #[error("unsupported URL scheme: {url}")]
    UnsupportedScheme {
        /// The URL with the unknown scheme.
        url: String,
    },
}

/// Coarse classification used by the crawler to decide on retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// May succeed on a later attempt.
    Transient,
    /// Will not succeed regardless of retries.
    Permanent,
    /// Exceeded its time budget; a retry with a longer budget may succeed.
    TimedOut,
}

impl FailureKind {
    /// Returns the stable label used in crawl failure records.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::Permanent => "permanent",
            Self::TimedOut => "timeout",
        }
    }
}

impl FetchError {
    /// Creates a resource-unavailable error without an underlying cause.
    pub fn unavailable(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ResourceUnavailable {
            url: url.into(),
            reason: reason.into(),
            source: None,
        }
    }

    /// Creates a resource-unavailable error wrapping a transport error.
    pub fn unavailable_with(
        url: impl Into<String>,
        reason: impl Into<String>,
        source: impl Into<BoxedSource>,
    ) -> Self {
        Self::ResourceUnavailable {
            url: url.into(),
            reason: reason.into(),
            source: Some(source.into()),
        }
    }

    /// Creates a malformed-reference error.
    pub fn malformed(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedReference {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            url: url.into(),
            after,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates a temporary-file error.
    pub fn temporary(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::TemporaryResource {
            path: path.into(),
            source,
        }
    }

    /// Creates a moved error for a redirect found after opening.
    pub fn moved(url: impl Into<String>, target: impl Into<String>) -> Self {
        Self::Moved {
            url: url.into(),
            target: target.into(),
        }
    }

    /// Creates an unsupported-scheme error.
    pub fn unsupported_scheme(url: impl Into<String>) -> Self {
        Self::UnsupportedScheme { url: url.into() }
    }

    /// Returns true for the deadline-exceeded case.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns the redirect target when the resource moved.
    #[must_use]
    pub fn redirect_target(&self) -> Option<&str> {
        match self {
            Self::Moved { target, .. } => Some(target),
            _ => None,
        }
    }

    /// Classifies this error for retry decisions.
    ///
    /// | Error | Kind |
    /// |-------|------|
    /// | Timeout | `TimedOut` |
    /// | Network | `Transient` |
    /// | HTTP 408, 429, 5xx | `Transient` |
    /// | everything else | `Permanent` |
    #[must_use]
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Timeout { .. } => FailureKind::TimedOut,
            Self::Network { .. } => FailureKind::Transient,
            Self::HttpStatus { status, .. } => match status {
                408 | 429 => FailureKind::Transient,
                s if (500..600).contains(s) => FailureKind::Transient,
                _ => FailureKind::Permanent,
            },
            Self::ResourceUnavailable { .. }
            | Self::MalformedReference { .. }
            | Self::TemporaryResource { .. }
            | Self::Moved { .. }
            | Self::UnsupportedScheme { .. } => FailureKind::Permanent,
        }
    }
}

/// Errors building a [`Fetcher`](crate::Fetcher) from its configuration.
#[derive(Debug, Error)]
pub enum SetupError {
    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// The HTTP client could not be constructed (TLS backend, proxy settings).
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

// No From<std::io::Error> / From<reqwest::Error>: every variant needs a URL or
// path the source error does not carry, so callers go through the constructors.

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_display_mentions_url_and_budget() {
        let error = FetchError::timeout("https://example.com/a.html", Duration::from_secs(180));
        let msg = error.to_string();
        assert!(msg.contains("https://example.com/a.html"), "Expected URL in: {msg}");
        assert!(msg.contains("180 seconds"), "Expected budget in: {msg}");
        assert!(error.is_timeout());
    }

    #[test]
    fn test_unavailable_with_source_keeps_chain() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let error = FetchError::unavailable_with("file:///tmp/x", "cannot read", io_error);
        let source = std::error::Error::source(&error).unwrap();
        assert!(source.to_string().contains("no such file"));
    }

    #[test]
    fn test_malformed_display() {
        let error = FetchError::malformed("imap://host/INBOX", "no message UID");
        let msg = error.to_string();
        assert!(msg.contains("malformed reference"), "Expected prefix in: {msg}");
        assert!(msg.contains("no message UID"), "Expected reason in: {msg}");
    }

    #[test]
    fn test_failure_kind_timeout_is_distinct_from_unavailable() {
        let timeout = FetchError::timeout("https://example.com", Duration::from_secs(1));
        let missing = FetchError::unavailable("file:///missing", "not found");
        assert_eq!(timeout.failure_kind(), FailureKind::TimedOut);
        assert_eq!(missing.failure_kind(), FailureKind::Permanent);
    }

    #[test]
    fn test_failure_kind_http_status() {
        assert_eq!(
            FetchError::http_status("u", 503).failure_kind(),
            FailureKind::Transient
        );
        assert_eq!(
            FetchError::http_status("u", 429).failure_kind(),
            FailureKind::Transient
        );
        assert_eq!(
            FetchError::http_status("u", 404).failure_kind(),
            FailureKind::Permanent
        );
    }

    #[test]
    fn test_moved_keeps_target_apart_from_reason() {
        let error = FetchError::moved("smb://host/a", "smb://host/b");
        assert_eq!(error.redirect_target(), Some("smb://host/b"));
        assert_eq!(error.failure_kind(), FailureKind::Permanent);
        assert_eq!(FetchError::unavailable("u", "gone").redirect_target(), None);
    }

    #[test]
    fn test_failure_kind_labels() {
        assert_eq!(FailureKind::TimedOut.as_str(), "timeout");
        assert_eq!(FailureKind::Transient.as_str(), "transient");
        assert_eq!(FailureKind::Permanent.as_str(), "permanent");
    }
}
