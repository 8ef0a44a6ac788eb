//! Error types for schema synchronization.

/// Boxed error produced by a database driver.
pub type DriverError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while synchronizing a schema.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The driver failed to introspect, execute DDL, or control the
    /// transaction. The driver's own error is the source.
    #[error("Database error: {0}")]
    Driver(#[source] DriverError),

    /// The requested structural change cannot be performed.
    #[error("Unsupported operation on '{table}.{column}': {reason}")]
    UnsupportedOperation {
        /// Table owning the column.
        table: String,
        /// Column the change targets.
        column: String,
        /// Why the change is refused.
        reason: String,
    },

    /// The entity metadata is inconsistent.
    #[error("Invalid metadata: {0}")]
    InvalidMetadata(String),

    /// IO error (reading metadata files).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SyncError {
    /// Wraps a driver-level error.
    pub fn driver<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Driver(Box::new(error))
    }

    /// Returns the driver error if this is a [`SyncError::Driver`].
    #[must_use]
    pub fn as_driver_error(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            Self::Driver(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

/// Result type for synchronization operations.
pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_error_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
        let err = SyncError::driver(io);

        assert_eq!(err.to_string(), "Database error: disk on fire");
        let source = err.as_driver_error().expect("driver error");
        assert!(source.downcast_ref::<std::io::Error>().is_some());
    }

    #[test]
    fn test_unsupported_message() {
        let err = SyncError::UnsupportedOperation {
            table: "post".to_string(),
            column: "id".to_string(),
            reason: "column is part of the primary key".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Unsupported operation on 'post.id': column is part of the primary key"
        );
    }
}
