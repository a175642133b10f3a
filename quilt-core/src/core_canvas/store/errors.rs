/*
    errors.rs - Error types for the canvas engine

    Defines all error types that can occur in:
    - Operation validation
    - Wire encoding and decoding
    - Synchronization sessions
    - Spatial index consistency checks

    None of these are ever reported to peers; they stay on the replica that
    hit them.
*/

use crate::core_canvas::model::EntityId;
use thiserror::Error;

/// Errors that can occur in the canvas engine
#[derive(Debug, Error)]
pub enum StoreError {
    /// An OP message failed structural validation; it is dropped, never applied
    #[error("Malformed operation: {0}")]
    MalformedOperation(String),

    /// The transport under a sync session failed
    #[error("Transport failure: {0}")]
    TransportFailure(String),

    /// Entity store and spatial index disagree; rebuild the index to recover
    #[error("Index inconsistency: {missing} missing, {stale} stale, {moved} with wrong bounds")]
    IndexInconsistency { missing: usize, stale: usize, moved: usize },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Operation not valid in the current state
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Entity not found
    #[error("Not found: {0}")]
    NotFound(EntityId),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    /// Whether the sync session that produced this error must return to Idle
    pub fn is_session_fatal(&self) -> bool {
        matches!(self, StoreError::TransportFailure(_) | StoreError::InvalidOperation(_))
    }
}

impl From<bincode::Error> for StoreError {
    fn from(err: bincode::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_display() {
        let err = StoreError::MalformedOperation("empty field name".to_string());
        assert_eq!(err.to_string(), "Malformed operation: empty field name");
    }

    #[test]
    fn test_index_inconsistency_display() {
        let err = StoreError::IndexInconsistency { missing: 2, stale: 1, moved: 0 };
        assert!(err.to_string().contains("2 missing"));
        assert!(err.to_string().contains("1 stale"));
    }

    #[test]
    fn test_session_fatal_classification() {
        assert!(StoreError::TransportFailure("reset".into()).is_session_fatal());
        assert!(!StoreError::MalformedOperation("bad".into()).is_session_fatal());
    }
}
