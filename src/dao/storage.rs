use std::error::Error;
use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by storage backends regardless of the underlying database.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage unavailable: {message}")]
    Unavailable {
        message: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    #[error("stored {entity} `{id}` is malformed: {reason}")]
    Corrupted {
        entity: &'static str,
        id: String,
        reason: String,
    },
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }

    /// Construct an error for a persisted record that cannot be mapped back to an entity.
    pub fn corrupted(entity: &'static str, id: impl ToString, reason: impl Into<String>) -> Self {
        StorageError::Corrupted {
            entity,
            id: id.to_string(),
            reason: reason.into(),
        }
    }
}
