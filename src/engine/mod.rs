//! Reconciliation engine: one attached session per client, kept current by a
//! background pump applying change feed events to the local projection.

/// Pure projection logic shared by the pump and the tests.
pub mod reconciler;

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Mutex, RwLock, broadcast};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};
use uuid::Uuid;

use crate::dao::storage::StorageError;
use crate::dao::store::RecordStore;
use crate::feed::FeedHub;

pub use self::reconciler::{Projection, Reconciler, SessionNotice};

/// Failures while attaching a client to a session.
#[derive(Debug, Error)]
pub enum AttachError {
    /// The session row does not exist.
    #[error("session `{0}` not found")]
    NotFound(Uuid),
    /// No participant row matches the client's remembered identity; the
    /// caller must run the rejoin protocol before attaching again.
    #[error("no participant named `{name}` in session `{session_id}`")]
    SelfNotFound {
        /// Session that was attached to.
        session_id: Uuid,
        /// Identity that found no matching row.
        name: String,
    },
    /// The underlying store call failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug)]
struct SessionShared {
    session_id: Uuid,
    reconciler: RwLock<Reconciler>,
    notices: broadcast::Sender<SessionNotice>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

/// Handle to one attached session.
///
/// Cloning is cheap and shares the projection. [`SessionHandle::detach`]
/// pairs with [`attach`] and must be called exactly once; it stops the pump
/// and releases both feed subscriptions, after which no further notices fire.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    inner: Arc<SessionShared>,
}

/// Attach a client to a session: one full read of the game and participant
/// rows plus two feed subscriptions filtered to the session.
///
/// Subscriptions are opened before the full read so no event committed during
/// the read is missed; the duplicate delivery this can cause is absorbed by
/// idempotent application. Cancelling the returned future before it resolves
/// leaves nothing attached.
pub async fn attach(
    store: &Arc<dyn RecordStore>,
    feed: &FeedHub,
    session_id: Uuid,
    self_name: &str,
) -> Result<SessionHandle, AttachError> {
    let mut game_events = feed.subscribe_game(session_id);
    let mut participant_events = feed.subscribe_participants(session_id);

    let game = store
        .find_game(session_id)
        .await?
        .ok_or(AttachError::NotFound(session_id))?;
    let participants = store.list_participants(session_id).await?;

    if !participants.iter().any(|row| row.name == self_name) {
        return Err(AttachError::SelfNotFound {
            session_id,
            name: self_name.to_owned(),
        });
    }

    let (notices, _) = broadcast::channel(8);
    let inner = Arc::new(SessionShared {
        session_id,
        reconciler: RwLock::new(Reconciler::new(game, participants, self_name.to_owned())),
        notices,
        pump: Mutex::new(None),
    });

    let pump_shared = inner.clone();
    let pump = tokio::spawn(async move {
        loop {
            tokio::select! {
                event = game_events.recv() => match event {
                    Ok(event) => {
                        let notice = pump_shared
                            .reconciler
                            .write()
                            .await
                            .apply_game_event(event);
                        if let Some(notice) = notice {
                            let _ = pump_shared.notices.send(notice);
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(session = %pump_shared.session_id, skipped, "game feed lagged");
                    }
                    Err(RecvError::Closed) => break,
                },
                event = participant_events.recv() => match event {
                    Ok(event) => {
                        let notice = pump_shared
                            .reconciler
                            .write()
                            .await
                            .apply_participant_event(event);
                        if let Some(notice) = notice {
                            let _ = pump_shared.notices.send(notice);
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(session = %pump_shared.session_id, skipped, "participant feed lagged");
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
    });
    *inner.pump.lock().await = Some(pump);

    info!(session = %session_id, name = %self_name, "attached to session");
    Ok(SessionHandle { inner })
}

impl SessionHandle {
    /// Identifier of the attached session.
    pub fn session_id(&self) -> Uuid {
        self.inner.session_id
    }

    /// Snapshot the current `(game, participants, current)` projection.
    pub async fn projection(&self) -> Projection {
        self.inner.reconciler.read().await.projection()
    }

    /// Subscribe to forced-invalidation notices for this attachment.
    pub fn notices(&self) -> broadcast::Receiver<SessionNotice> {
        self.inner.notices.subscribe()
    }

    /// The notice subscription as a stream, for presentation layers that
    /// consume it with stream combinators.
    pub fn notice_stream(&self) -> BroadcastStream<SessionNotice> {
        BroadcastStream::new(self.notices())
    }

    /// Stop the pump and release both feed subscriptions.
    pub async fn detach(&self) {
        if let Some(pump) = self.inner.pump.lock().await.take() {
            pump.abort();
            info!(session = %self.inner.session_id, "detached from session");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::sleep;

    use super::*;
    use crate::dao::memory::MemoryStore;
    use crate::dao::models::{NewParticipant, ParticipantPatch};
    use crate::state::phase::GamePhase;

    async fn seeded() -> (Arc<dyn RecordStore>, Arc<FeedHub>, Uuid) {
        let feed = Arc::new(FeedHub::new(32));
        let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new(feed.clone()));
        let game = store.create_game(GamePhase::Lobby).await.unwrap();
        for (name, is_host) in [("MOLLY", true), ("OLIVER", false)] {
            store
                .insert_participant(NewParticipant {
                    session_id: game.id,
                    name: name.into(),
                    is_host,
                })
                .await
                .unwrap();
        }
        (store, feed, game.id)
    }

    #[tokio::test]
    async fn attach_requires_existing_session_and_self() {
        let (store, feed, session_id) = seeded().await;

        let err = attach(&store, &feed, Uuid::new_v4(), "MOLLY")
            .await
            .unwrap_err();
        assert!(matches!(err, AttachError::NotFound(_)));

        let err = attach(&store, &feed, session_id, "NOBODY")
            .await
            .unwrap_err();
        assert!(matches!(err, AttachError::SelfNotFound { .. }));
    }

    #[tokio::test]
    async fn two_attached_clients_observe_the_same_final_state() {
        let (store, feed, session_id) = seeded().await;
        let molly = attach(&store, &feed, session_id, "MOLLY").await.unwrap();
        let oliver = attach(&store, &feed, session_id, "OLIVER").await.unwrap();

        let roster = store.list_participants(session_id).await.unwrap();
        for row in &roster {
            store
                .update_participant(row.id, ParticipantPatch::acknowledged(true))
                .await
                .unwrap();
        }
        sleep(Duration::from_millis(50)).await;

        let first = molly.projection().await;
        let second = oliver.projection().await;
        assert_eq!(first.game, second.game);
        assert_eq!(first.participants, second.participants);
        assert_eq!(first.readiness(), (2, 2));
        assert_eq!(first.current.unwrap().name, "MOLLY");
        assert_eq!(second.current.unwrap().name, "OLIVER");

        molly.detach().await;
        oliver.detach().await;
    }

    #[tokio::test]
    async fn kicked_client_receives_eviction_notice() {
        let (store, feed, session_id) = seeded().await;
        let oliver = attach(&store, &feed, session_id, "OLIVER").await.unwrap();
        let mut notices = oliver.notices();

        let target = store
            .find_participant(session_id, "OLIVER")
            .await
            .unwrap()
            .unwrap();
        store.delete_participant(target.id).await.unwrap();

        assert_eq!(notices.recv().await.unwrap(), SessionNotice::Evicted);
        assert!(oliver.projection().await.current.is_none());
        oliver.detach().await;
    }

    #[tokio::test]
    async fn no_notices_fire_after_detach() {
        let (store, feed, session_id) = seeded().await;
        let molly = attach(&store, &feed, session_id, "MOLLY").await.unwrap();
        let mut notices = molly.notices();
        molly.detach().await;

        let target = store
            .find_participant(session_id, "MOLLY")
            .await
            .unwrap()
            .unwrap();
        store.delete_participant(target.id).await.unwrap();
        sleep(Duration::from_millis(20)).await;

        assert!(matches!(
            notices.try_recv(),
            Err(broadcast::error::TryRecvError::Empty | broadcast::error::TryRecvError::Closed)
        ));
    }
}
