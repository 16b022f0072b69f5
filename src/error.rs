use thiserror::Error;

use crate::dao::storage::StorageError;
use crate::engine::AttachError;
use crate::state::phase::InvalidTransition;

/// Classified outcomes surfaced by the session services.
///
/// The core never silently drops a failure that would leave local and remote
/// state diverged; user-facing messaging is the presentation layer's concern.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Referenced session or participant is absent; usually recoverable by
    /// falling back to the entry flow.
    #[error("not found: {0}")]
    NotFound(String),
    /// Duplicate participant name on insert. Surfaced as "name taken", never
    /// retried automatically.
    #[error("conflict: {0}")]
    Conflict(String),
    /// The roster is at its capacity limit; no row was inserted.
    #[error("session is full (limit {limit})")]
    CapacityExceeded {
        /// Configured maximum roster size.
        limit: usize,
    },
    /// A phase-transition guard was not met; no write was attempted.
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),
    /// The remembered session no longer exists; its local history entry has
    /// been purged.
    #[error("session no longer exists")]
    SessionGone,
    /// The remembered session reached its terminal phase. The local history
    /// entry is kept so the user can pick a different session.
    #[error("session has already ended")]
    SessionEnded,
    /// No participant row matches the client's remembered identity; the
    /// rejoin protocol must run before attaching.
    #[error("no participant named `{0}` in the session")]
    SelfNotFound(String),
    /// The storage call failed with no semantic meaning; safe to retry.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { what } => ServiceError::NotFound(what),
            StorageError::Conflict { message } => ServiceError::Conflict(message),
            err @ StorageError::Unavailable { .. } => ServiceError::Unavailable(err),
        }
    }
}

impl From<AttachError> for ServiceError {
    fn from(err: AttachError) -> Self {
        match err {
            AttachError::NotFound(session_id) => {
                ServiceError::NotFound(format!("session `{session_id}`"))
            }
            AttachError::SelfNotFound { name, .. } => ServiceError::SelfNotFound(name),
            AttachError::Storage(source) => source.into(),
        }
    }
}

impl From<InvalidTransition> for ServiceError {
    fn from(err: InvalidTransition) -> Self {
        ServiceError::PreconditionFailed(err.to_string())
    }
}
