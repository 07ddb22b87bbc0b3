//! Error types and result aliases for the moniker crates.
//!
//! `Parse` is the client-facing syntax failure; everything else describes
//! invalid input or internal faults in the shared primitives.

/// The result type used throughout the moniker core.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the shared primitives.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// A moniker string is malformed.
    #[error("invalid moniker: {message}")]
    Parse {
        /// Description of what made the moniker invalid.
        message: String,
    },

    /// An invalid identifier was provided.
    #[error("invalid identifier: {message}")]
    InvalidId {
        /// Description of what made the ID invalid.
        message: String,
    },

    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An internal error occurred that should not happen in normal operation.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl Error {
    /// Creates a new parse error.
    #[must_use]
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Creates a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this error was caused by malformed moniker syntax.
    #[must_use]
    pub const fn is_parse(&self) -> bool {
        matches!(self, Self::Parse { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_display() {
        let err = Error::parse("empty segment");
        assert_eq!(err.to_string(), "invalid moniker: empty segment");
        assert!(err.is_parse());
    }

    #[test]
    fn internal_error_is_not_parse() {
        assert!(!Error::internal("lock poisoned").is_parse());
    }
}
