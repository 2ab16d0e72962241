//! Error types for the event store

use thiserror::Error;

/// Errors surfaced by the event query service
///
/// Backend- and node-store-specific failures are translated into this
/// taxonomy before they reach callers.
#[derive(Debug, Error)]
pub enum EventStoreError {
    /// A point lookup matched no row
    #[error("Event not found: {0}")]
    NotFound(String),

    /// The query backend or node store could not serve the request
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// A requested column is not part of the catalog
    #[error("Invalid column set: {0}")]
    InvalidColumnSet(String),

    /// The backend returned a row that cannot form an event
    #[error("Invalid row: {0}")]
    InvalidRow(String),
}

impl EventStoreError {
    /// Create a new NotFound error
    pub fn not_found(item: impl Into<String>) -> Self {
        Self::NotFound(item.into())
    }

    /// Create a new BackendUnavailable error
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::BackendUnavailable(message.into())
    }

    /// Create a new InvalidColumnSet error
    pub fn invalid_column(column: impl Into<String>) -> Self {
        Self::InvalidColumnSet(column.into())
    }

    /// Create a new InvalidRow error
    pub fn invalid_row(message: impl Into<String>) -> Self {
        Self::InvalidRow(message.into())
    }

    /// Whether this error is the expected "no such event" outcome
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Errors raised by a query backend implementation
#[derive(Debug, Error)]
pub enum BackendError {
    /// The backend cannot be reached or is refusing work
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// I/O error while talking to the backend
    #[error("I/O error: {0}")]
    Io(String),

    /// Database error inside the backend
    #[error("Database error: {0}")]
    Database(String),

    /// Error during serialization
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Error during deserialization
    #[error("Deserialization error: {0}")]
    Deserialization(String),
}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        BackendError::Io(err.to_string())
    }
}

/// Errors raised by a node store implementation
///
/// A missing node is not an error: `get_multi` simply omits it.
#[derive(Debug, Error)]
pub enum NodeStoreError {
    /// I/O error during node store operations
    #[error("I/O error: {0}")]
    Io(String),

    /// The node store cannot be reached
    #[error("Node store unavailable: {0}")]
    Unavailable(String),

    /// Body exceeds the configured maximum size
    #[error("Node body too large: {size} bytes (max {max})")]
    CapacityExceeded { size: u64, max: u64 },

    /// Error during serialization
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Error during deserialization
    #[error("Deserialization error: {0}")]
    Deserialization(String),
}

impl From<std::io::Error> for NodeStoreError {
    fn from(err: std::io::Error) -> Self {
        NodeStoreError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for NodeStoreError {
    fn from(err: serde_json::Error) -> Self {
        NodeStoreError::Deserialization(err.to_string())
    }
}

impl From<BackendError> for EventStoreError {
    fn from(err: BackendError) -> Self {
        EventStoreError::BackendUnavailable(err.to_string())
    }
}

impl From<NodeStoreError> for EventStoreError {
    fn from(err: NodeStoreError) -> Self {
        EventStoreError::BackendUnavailable(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_error() {
        let err = EventStoreError::not_found("42:abc");
        assert!(err.is_not_found());
        assert!(err.to_string().contains("42:abc"));
    }

    #[test]
    fn test_backend_error_translation() {
        let err: EventStoreError = BackendError::Unavailable("connection refused".into()).into();
        assert!(matches!(err, EventStoreError::BackendUnavailable(_)));
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn test_node_store_error_translation() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let node_err: NodeStoreError = io_err.into();
        assert!(matches!(node_err, NodeStoreError::Io(_)));

        let err: EventStoreError = node_err.into();
        assert!(matches!(err, EventStoreError::BackendUnavailable(_)));
    }

    #[test]
    fn test_capacity_exceeded_message() {
        let err = NodeStoreError::CapacityExceeded { size: 10, max: 5 };
        assert!(err.to_string().contains("10 bytes"));
    }
}
