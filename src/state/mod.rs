//! Shared application state owned by whatever constructs the engine: the
//! record store, the change feed, the local session history, and the
//! currently attached session.

/// Session lifecycle phase and transition rules.
pub mod phase;

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::RwLock;
use tracing::warn;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::dao::store::RecordStore;
use crate::engine::SessionHandle;
use crate::feed::FeedHub;
use crate::session_store::{SessionEntry, SessionStore};

/// Cheaply clonable handle to the per-client application state.
pub type SharedState = Arc<AppState>;

/// One client's state: shared-record access plus local-only session history
/// and the attached session handle.
pub struct AppState {
    config: AppConfig,
    store: Arc<dyn RecordStore>,
    feed: Arc<FeedHub>,
    history: Mutex<SessionStore>,
    current: RwLock<Option<SessionHandle>>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned
    /// cheaply into spawned tasks.
    pub fn new(
        config: AppConfig,
        store: Arc<dyn RecordStore>,
        feed: Arc<FeedHub>,
        history: SessionStore,
    ) -> SharedState {
        Arc::new(Self {
            config,
            store,
            feed,
            history: Mutex::new(history),
            current: RwLock::new(None),
        })
    }

    /// Immutable runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Handle to the shared record store.
    pub fn store(&self) -> Arc<dyn RecordStore> {
        self.store.clone()
    }

    /// The change feed hub shared with the record store.
    pub fn feed(&self) -> &FeedHub {
        &self.feed
    }

    /// Owning handle to the feed hub, for wiring another client against the
    /// same backend.
    pub fn feed_arc(&self) -> Arc<FeedHub> {
        self.feed.clone()
    }

    /// Remember a `(session, name)` pair in the local history. Failures are
    /// logged and swallowed: the history is a local UX cache with no
    /// authority, so it must never block the protocol.
    pub fn remember_session(&self, session_id: Uuid, name: &str) {
        if let Err(err) = self.history().save(session_id, name) {
            warn!(session = %session_id, error = %err, "failed to persist session history");
        }
    }

    /// Forget one session from the local history.
    pub fn purge_session(&self, session_id: Uuid) {
        if let Err(err) = self.history().clear(Some(session_id)) {
            warn!(session = %session_id, error = %err, "failed to purge session history");
        }
    }

    /// The most recently remembered session, if any.
    pub fn recall_most_recent(&self) -> Option<SessionEntry> {
        self.history().most_recent()
    }

    /// Every remembered session, most-recent first.
    pub fn recent_sessions(&self) -> Vec<SessionEntry> {
        self.history().all()
    }

    /// Drop local history entries past their TTL.
    pub fn prune_history(&self) {
        if let Err(err) = self.history().prune_stale() {
            warn!(error = %err, "failed to prune session history");
        }
    }

    /// Install the handle of a freshly attached session, detaching any
    /// previous one first so the attach/detach pairing holds.
    pub async fn install_session(&self, handle: SessionHandle) {
        let previous = {
            let mut slot = self.current.write().await;
            slot.replace(handle)
        };
        if let Some(previous) = previous {
            previous.detach().await;
        }
    }

    /// The currently attached session, if any.
    pub async fn current_session(&self) -> Option<SessionHandle> {
        self.current.read().await.clone()
    }

    /// Remove and return the currently attached session without detaching it.
    pub async fn take_session(&self) -> Option<SessionHandle> {
        self.current.write().await.take()
    }

    /// Remove the attached session only if it belongs to `session_id`,
    /// leaving any newer attachment in place.
    pub async fn clear_session(&self, session_id: Uuid) -> Option<SessionHandle> {
        let mut slot = self.current.write().await;
        if slot.as_ref().map(|handle| handle.session_id()) == Some(session_id) {
            slot.take()
        } else {
            None
        }
    }

    fn history(&self) -> MutexGuard<'_, SessionStore> {
        match self.history.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
