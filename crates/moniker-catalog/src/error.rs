//! Error types for catalog operations.

use std::sync::PoisonError;

use thiserror::Error;

/// Result type alias for catalog operations.
pub type Result<T> = std::result::Result<T, CatalogError>;

/// Errors that can occur during catalog operations.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// A path, domain or request does not exist.
    #[error("{entity} not found: {name}")]
    NotFound {
        /// Kind of entity that was looked up.
        entity: &'static str,
        /// Name or identifier that was looked up.
        name: String,
    },

    /// A duplicate path or duplicate pending request.
    #[error("conflict: {message}")]
    Conflict {
        /// Description of the conflict.
        message: String,
    },

    /// A workflow transition was attempted from the wrong state.
    #[error("invalid transition: {message}")]
    InvalidTransition {
        /// Description of the rejected transition.
        message: String,
    },

    /// Input failed validation (unknown enum value, unanchored sub-path, ...).
    #[error("validation error: {message}")]
    Validation {
        /// Description of the validation failure.
        message: String,
    },

    /// A catalog document could not be loaded.
    #[error("failed to load {path}: {message}")]
    Load {
        /// File or source that failed.
        path: String,
        /// Description of the failure.
        message: String,
    },

    /// Serialization/deserialization failed.
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of the serialization failure.
        message: String,
    },

    /// An internal invariant was broken (including lock poisoning).
    #[error("internal error: {message}")]
    Internal {
        /// Description of the fault.
        message: String,
    },

    /// A shared primitive rejected its input.
    #[error(transparent)]
    Core(#[from] moniker_core::Error),
}

impl CatalogError {
    /// Creates a not-found error for a catalog path.
    #[must_use]
    pub fn path_not_found(path: impl Into<String>) -> Self {
        Self::NotFound {
            entity: "path",
            name: path.into(),
        }
    }

    /// Creates a conflict error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Creates a validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates an invalid-transition error.
    #[must_use]
    pub fn invalid_transition(message: impl Into<String>) -> Self {
        Self::InvalidTransition {
            message: message.into(),
        }
    }

    /// Creates a load error.
    #[must_use]
    pub fn load(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Load {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Maps a poisoned lock into an internal error.
pub(crate) fn poison_err<T>(_: PoisonError<T>) -> CatalogError {
    CatalogError::Internal {
        message: "catalog lock poisoned".to_string(),
    }
}
