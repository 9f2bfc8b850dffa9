//! Record Store Errors
//!
//! Maps the substrate taxonomy onto explicit variants: `NotFound` surfaces
//! quietly, `InvalidInput` is a caller mistake, `Integrity` means an invariant
//! would break (operation aborted without partial effect), `Storage` is an
//! I/O-level failure, `ReadOnly` is the degraded mode entered after repeated
//! write failures.

use thiserror::Error;

/// Errors from record store operations.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Record not found
    #[error("record not found: {id}")]
    NotFound {
        /// Record id that was not found
        id: String,
    },

    /// Tier index outside 0..=3
    #[error("invalid tier: {tier}")]
    InvalidTier {
        /// The rejected tier index
        tier: u8,
    },

    /// Caller-supplied value failed validation
    #[error("invalid input: {message}")]
    InvalidInput {
        /// What was invalid
        message: String,
    },

    /// Operation would break a store invariant
    #[error("integrity violation: {message}")]
    Integrity {
        /// The invariant that would break
        message: String,
    },

    /// I/O, permissions, or corruption
    #[error("storage error: {message}")]
    Storage {
        /// Underlying failure
        message: String,
    },

    /// Store is in read-only mode after repeated write failures
    #[error("store is read-only")]
    ReadOnly,
}

impl StoreError {
    /// Create a not-found error.
    #[must_use]
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Create an invalid-input error.
    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an integrity error.
    #[must_use]
    pub fn integrity(message: impl Into<String>) -> Self {
        Self::Integrity {
            message: message.into(),
        }
    }

    /// Create a storage error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Whether the error is recoverable inside a sandbox stage.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. } | Self::InvalidInput { .. } | Self::InvalidTier { .. }
        )
    }
}

impl From<std::io::Error> for StoreError {
    fn from(error: std::io::Error) -> Self {
        Self::storage(error.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(error: serde_json::Error) -> Self {
        Self::storage(format!("serialization: {error}"))
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors() {
        let err = StoreError::not_found("M3_x");
        assert!(matches!(err, StoreError::NotFound { id } if id == "M3_x"));

        let err = StoreError::invalid_input("confidence out of range");
        assert!(matches!(err, StoreError::InvalidInput { .. }));
    }

    #[test]
    fn test_recoverable_classification() {
        assert!(StoreError::not_found("x").is_recoverable());
        assert!(StoreError::invalid_input("bad").is_recoverable());
        assert!(!StoreError::storage("disk gone").is_recoverable());
        assert!(!StoreError::ReadOnly.is_recoverable());
        assert!(!StoreError::integrity("dangling ref").is_recoverable());
    }
}
