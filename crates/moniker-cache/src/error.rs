//! Error types for the cache layers.

use thiserror::Error;

/// Result type alias for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

/// Errors that can occur in the cache layers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    /// The fetch behind a cached query failed.
    #[error("fetch failed for {path}: {message}")]
    FetchFailed {
        /// Cached query path.
        path: String,
        /// Description of the failure.
        message: String,
    },

    /// The fetch behind a cached query exceeded its time bound.
    #[error("fetch for {path} timed out after {timeout_ms}ms")]
    Timeout {
        /// Cached query path.
        path: String,
        /// Configured bound in milliseconds.
        timeout_ms: u64,
    },

    /// No cached query is registered for the path.
    #[error("no cached query registered for {path}")]
    NotRegistered {
        /// Requested path.
        path: String,
    },

    /// The shared cache tier failed.
    #[error("shared cache error: {message}")]
    SharedTier {
        /// Description of the failure.
        message: String,
    },
}

impl CacheError {
    /// Creates a fetch failure.
    #[must_use]
    pub fn fetch_failed(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::FetchFailed {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a not-registered error.
    #[must_use]
    pub fn not_registered(path: impl Into<String>) -> Self {
        Self::NotRegistered { path: path.into() }
    }

    /// Creates a shared-tier error.
    #[must_use]
    pub fn shared_tier(message: impl Into<String>) -> Self {
        Self::SharedTier {
            message: message.into(),
        }
    }
}
