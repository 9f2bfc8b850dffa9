//! Concept Graph Errors

use thiserror::Error;

/// Errors from concept graph operations.
#[derive(Debug, Clone, Error)]
pub enum GraphError {
    /// Node not found
    #[error("node not found: {id}")]
    NotFound {
        /// Node id that was not found
        id: String,
    },

    /// Parent missing for a create
    #[error("parent not found: {id}")]
    ParentNotFound {
        /// Parent id that was not found
        id: String,
    },

    /// Depth cap exceeded
    #[error("node too deep: depth {depth}")]
    TooDeep {
        /// The offending depth
        depth: usize,
    },

    /// Delete refused: node still has children or summaries
    #[error("node not empty: {id}")]
    NotEmpty {
        /// The node that still carries content
        id: String,
    },

    /// Malformed node id
    #[error("invalid node id: {message}")]
    InvalidId {
        /// What was malformed
        message: String,
    },

    /// Operation would break a graph invariant
    #[error("integrity violation: {message}")]
    Integrity {
        /// The invariant that would break
        message: String,
    },

    /// I/O or serialization failure
    #[error("graph storage error: {message}")]
    Storage {
        /// Underlying failure
        message: String,
    },
}

impl GraphError {
    /// Create a not-found error.
    #[must_use]
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Create a parent-not-found error.
    #[must_use]
    pub fn parent_not_found(id: impl Into<String>) -> Self {
        Self::ParentNotFound { id: id.into() }
    }

    /// Create an invalid-id error.
    #[must_use]
    pub fn invalid_id(message: impl Into<String>) -> Self {
        Self::InvalidId {
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
            Self::NotFound { .. } | Self::ParentNotFound { .. } | Self::InvalidId { .. }
        )
    }
}

impl From<std::io::Error> for GraphError {
    fn from(error: std::io::Error) -> Self {
        Self::storage(error.to_string())
    }
}

impl From<serde_json::Error> for GraphError {
    fn from(error: serde_json::Error) -> Self {
        Self::storage(format!("serialization: {error}"))
    }
}

/// Result type for graph operations.
pub type GraphResult<T> = Result<T, GraphError>;
