use std::error::Error;
use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by storage backends regardless of the underlying database.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend could not be reached or failed mid-call. Carries no
    /// semantic meaning, so repeating the call is safe for every operation
    /// except participant insertion, which must check for conflicts first.
    #[error("storage unavailable: {message}")]
    Unavailable {
        /// Human-readable description of the failure.
        message: String,
        /// Underlying backend error.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// The referenced row does not exist.
    #[error("{what} not found")]
    NotFound {
        /// Description of the missing row.
        what: String,
    },
    /// An insert collided with an existing row (duplicate participant name
    /// within a session).
    #[error("conflict: {message}")]
    Conflict {
        /// Description of the colliding constraint.
        message: String,
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

    /// Construct a not-found error for the described row.
    pub fn not_found(what: impl Into<String>) -> Self {
        StorageError::NotFound { what: what.into() }
    }

    /// Construct a conflict error for the described constraint.
    pub fn conflict(message: impl Into<String>) -> Self {
        StorageError::Conflict {
            message: message.into(),
        }
    }
}
