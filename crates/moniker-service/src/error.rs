//! Caller-facing error taxonomy.
//!
//! Every failure a caller can observe maps to one [`ServiceError`] variant
//! with a stable machine code. Lower-level errors convert through `From`.

use moniker_cache::CacheError;
use moniker_catalog::CatalogError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::adapter::AdapterError;

/// Result type alias for service operations.
pub type Result<T> = std::result::Result<T, ServiceError>;

/// Errors surfaced by the resolution service.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    /// Malformed moniker syntax. Never retried.
    #[error("{message}")]
    Parse {
        /// Description of the syntax error.
        message: String,
    },

    /// Path, binding or request does not exist.
    #[error("{message}")]
    NotFound {
        /// What was not found.
        message: String,
    },

    /// Vetoed by an access policy.
    #[error("{message}")]
    AccessDenied {
        /// Denial reason.
        message: String,
        /// Estimated rows the vetoed query would have returned.
        estimated_rows: Option<u64>,
    },

    /// Duplicate path or duplicate pending request.
    #[error("{message}")]
    Conflict {
        /// Description of the conflict.
        message: String,
    },

    /// Invalid state transition or invalid enum value.
    #[error("{message}")]
    BadRequest {
        /// Description of the problem.
        message: String,
    },

    /// Missing or wrong write token.
    #[error("{message}")]
    Unauthorized {
        /// Description of the failure.
        message: String,
    },

    /// A source or cached value cannot be served right now.
    #[error("{message}")]
    Unavailable {
        /// Description of the failure.
        message: String,
    },

    /// Unexpected internal fault.
    #[error("{message}")]
    Internal {
        /// Description of the fault.
        message: String,
    },
}

/// Structured error payload for transports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Stable machine-readable code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Estimated rows, for access denials.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_rows: Option<u64>,
}

impl ServiceError {
    /// Creates a parse error.
    #[must_use]
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Creates an access-denied error.
    #[must_use]
    pub fn access_denied(message: impl Into<String>, estimated_rows: Option<u64>) -> Self {
        Self::AccessDenied {
            message: message.into(),
            estimated_rows,
        }
    }

    /// Creates a conflict error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Creates a bad-request error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    /// Creates an unauthorized error.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    /// Creates an unavailable error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns the stable machine-readable code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Parse { .. } => "PARSE_ERROR",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::AccessDenied { .. } => "ACCESS_DENIED",
            Self::Conflict { .. } => "CONFLICT",
            Self::BadRequest { .. } => "BAD_REQUEST",
            Self::Unauthorized { .. } => "UNAUTHORIZED",
            Self::Unavailable { .. } => "UNAVAILABLE",
            Self::Internal { .. } => "INTERNAL",
        }
    }

    /// Returns the structured payload for this error.
    #[must_use]
    pub fn payload(&self) -> ErrorPayload {
        ErrorPayload {
            code: self.code().to_string(),
            message: self.to_string(),
            estimated_rows: match self {
                Self::AccessDenied { estimated_rows, .. } => *estimated_rows,
                _ => None,
            },
        }
    }
}

impl From<CatalogError> for ServiceError {
    fn from(value: CatalogError) -> Self {
        match value {
            CatalogError::NotFound { entity, name } => {
                Self::not_found(format!("{entity} not found: {name}"))
            }
            CatalogError::Conflict { message } => Self::conflict(message),
            CatalogError::InvalidTransition { message } | CatalogError::Validation { message } => {
                Self::bad_request(message)
            }
            CatalogError::Load { path, message } => {
                Self::internal(format!("failed to load {path}: {message}"))
            }
            CatalogError::Serialization { message } | CatalogError::Internal { message } => {
                Self::internal(message)
            }
            CatalogError::Core(e) => e.into(),
        }
    }
}

impl From<moniker_core::Error> for ServiceError {
    fn from(value: moniker_core::Error) -> Self {
        match value {
            moniker_core::Error::Parse { .. } => Self::parse(value.to_string()),
            moniker_core::Error::InvalidId { message } => Self::bad_request(message),
            moniker_core::Error::InvalidInput(message) => Self::bad_request(message),
            moniker_core::Error::Internal { message } => Self::internal(message),
        }
    }
}

impl From<CacheError> for ServiceError {
    fn from(value: CacheError) -> Self {
        match value {
            CacheError::NotRegistered { .. } => Self::not_found(value.to_string()),
            CacheError::FetchFailed { .. }
            | CacheError::Timeout { .. }
            | CacheError::SharedTier { .. } => Self::unavailable(value.to_string()),
        }
    }
}

impl From<AdapterError> for ServiceError {
    fn from(value: AdapterError) -> Self {
        Self::unavailable(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_denied_payload_carries_estimate() {
        let payload = ServiceError::access_denied("too broad", Some(1_000_000)).payload();
        assert_eq!(payload.code, "ACCESS_DENIED");
        assert_eq!(payload.estimated_rows, Some(1_000_000));
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["estimated_rows"], 1_000_000);
    }

    #[test]
    fn other_payloads_omit_estimate() {
        let json = serde_json::to_value(ServiceError::conflict("dup").payload()).unwrap();
        assert!(json.get("estimated_rows").is_none());
    }

    #[test]
    fn catalog_errors_map_to_taxonomy() {
        assert_eq!(
            ServiceError::from(CatalogError::path_not_found("risk")).code(),
            "NOT_FOUND"
        );
        assert_eq!(
            ServiceError::from(CatalogError::invalid_transition("not pending")).code(),
            "BAD_REQUEST"
        );
        assert_eq!(
            ServiceError::from(CatalogError::conflict("dup")).code(),
            "CONFLICT"
        );
        assert_eq!(
            ServiceError::from(CatalogError::Core(moniker_core::Error::parse("empty"))).code(),
            "PARSE_ERROR"
        );
    }

    #[test]
    fn cache_errors_map_to_unavailable() {
        let err = ServiceError::from(CacheError::fetch_failed("risk", "down"));
        assert_eq!(err.code(), "UNAVAILABLE");
    }
}
