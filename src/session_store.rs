//! Local recent-session history.
//!
//! Pure key-value persistence for the `(session id, participant name)` pairs
//! this device has previously joined, most-recent first. Carries no
//! authority: it only feeds the rejoin UX, so read failures degrade to an
//! empty history with a logged warning.

use std::fs;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

/// One remembered session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionEntry {
    /// Session this device once joined.
    pub session_id: Uuid,
    /// Identity used in that session.
    pub participant_name: String,
    /// When the entry was last refreshed.
    pub timestamp: SystemTime,
}

/// Errors while persisting the history file.
#[derive(Debug, Error)]
pub enum SessionStoreError {
    /// The history file could not be written.
    #[error("failed to write session history: {0}")]
    Io(#[from] std::io::Error),
    /// The history could not be serialized.
    #[error("failed to encode session history: {0}")]
    Encode(#[from] serde_json::Error),
}

/// File-backed history of recently joined sessions, capped and de-duplicated
/// by session id.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
    cap: usize,
    ttl: Duration,
}

impl SessionStore {
    /// Open a store persisting to `path`, keeping at most `cap` entries and
    /// pruning entries older than `ttl`. No I/O happens until first use.
    pub fn open(path: impl Into<PathBuf>, cap: usize, ttl: Duration) -> Self {
        Self {
            path: path.into(),
            cap,
            ttl,
        }
    }

    /// Remember a `(session, name)` pair with a fresh timestamp, moving it to
    /// the front and dropping any older entry for the same session.
    pub fn save(&self, session_id: Uuid, participant_name: &str) -> Result<(), SessionStoreError> {
        let mut entries = self.load();
        entries.retain(|entry| entry.session_id != session_id);
        entries.insert(
            0,
            SessionEntry {
                session_id,
                participant_name: participant_name.to_owned(),
                timestamp: SystemTime::now(),
            },
        );
        entries.truncate(self.cap);
        self.persist(&entries)
    }

    /// The most recently used session, if any.
    pub fn most_recent(&self) -> Option<SessionEntry> {
        self.load().into_iter().next()
    }

    /// Every remembered session, most-recent first.
    pub fn all(&self) -> Vec<SessionEntry> {
        self.load()
    }

    /// Forget one session, or the whole history when `session_id` is `None`.
    pub fn clear(&self, session_id: Option<Uuid>) -> Result<(), SessionStoreError> {
        match session_id {
            Some(session_id) => {
                let mut entries = self.load();
                entries.retain(|entry| entry.session_id != session_id);
                self.persist(&entries)
            }
            None => self.persist(&[]),
        }
    }

    /// Drop entries whose timestamp is older than the configured TTL.
    pub fn prune_stale(&self) -> Result<(), SessionStoreError> {
        let now = SystemTime::now();
        let mut entries = self.load();
        entries.retain(|entry| {
            now.duration_since(entry.timestamp)
                .map(|age| age < self.ttl)
                .unwrap_or(true)
        });
        self.persist(&entries)
    }

    fn load(&self) -> Vec<SessionEntry> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(entries) => entries,
                Err(err) => {
                    warn!(
                        path = %self.path.display(),
                        error = %err,
                        "corrupt session history; starting empty"
                    );
                    Vec::new()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(err) => {
                warn!(
                    path = %self.path.display(),
                    error = %err,
                    "failed to read session history; starting empty"
                );
                Vec::new()
            }
        }
    }

    fn persist(&self, entries: &[SessionEntry]) -> Result<(), SessionStoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_vec_pretty(entries)?)?;
        Ok(())
    }
}
