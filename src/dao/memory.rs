//! In-memory record store used by the simulation binary and the test suite.
//!
//! Every committed write publishes a full-row snapshot to the change feed,
//! mirroring how a row store with a logical replication feed behaves. Writes
//! are last-write-wins per row and there is no cross-row transaction, so the
//! multi-write phase transitions stay observable in their intermediate
//! states.

use std::sync::Arc;
use std::time::SystemTime;

use dashmap::DashMap;
use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::models::{
    GamePatch, GameRecord, NewParticipant, ParticipantPatch, ParticipantRecord,
};
use crate::dao::storage::{StorageError, StorageResult};
use crate::dao::store::RecordStore;
use crate::feed::{FeedHub, RowEvent};
use crate::state::phase::GamePhase;

/// Shared-record store keeping every row in process memory.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

struct Inner {
    games: DashMap<Uuid, GameRecord>,
    participants: DashMap<Uuid, ParticipantRecord>,
    feed: Arc<FeedHub>,
}

impl MemoryStore {
    /// Construct an empty store publishing committed writes to `feed`.
    pub fn new(feed: Arc<FeedHub>) -> Self {
        Self {
            inner: Arc::new(Inner {
                games: DashMap::new(),
                participants: DashMap::new(),
                feed,
            }),
        }
    }
}

impl Inner {
    fn session_rows(&self, session_id: Uuid) -> Vec<ParticipantRecord> {
        self.participants
            .iter()
            .filter(|entry| entry.value().session_id == session_id)
            .map(|entry| entry.value().clone())
            .collect()
    }
}

impl RecordStore for MemoryStore {
    fn create_game(
        &self,
        initial_phase: GamePhase,
    ) -> BoxFuture<'static, StorageResult<GameRecord>> {
        let this = self.clone();
        Box::pin(async move {
            let game = GameRecord {
                id: Uuid::new_v4(),
                phase: initial_phase,
                created_at: SystemTime::now(),
            };
            this.inner.games.insert(game.id, game.clone());
            this.inner.feed.publish_game(
                game.id,
                RowEvent::Insert {
                    after: game.clone(),
                },
            );
            Ok(game)
        })
    }

    fn find_game(&self, session_id: Uuid) -> BoxFuture<'static, StorageResult<Option<GameRecord>>> {
        let this = self.clone();
        Box::pin(async move {
            Ok(this
                .inner
                .games
                .get(&session_id)
                .map(|entry| entry.value().clone()))
        })
    }

    fn find_active_game(&self) -> BoxFuture<'static, StorageResult<Option<GameRecord>>> {
        let this = self.clone();
        Box::pin(async move {
            Ok(this
                .inner
                .games
                .iter()
                .filter(|entry| entry.value().phase != GamePhase::Completed)
                .map(|entry| entry.value().clone())
                .max_by_key(|game| game.created_at))
        })
    }

    fn update_game(
        &self,
        session_id: Uuid,
        patch: GamePatch,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let this = self.clone();
        Box::pin(async move {
            let (before, after) = {
                let mut entry = this
                    .inner
                    .games
                    .get_mut(&session_id)
                    .ok_or_else(|| StorageError::not_found(format!("game `{session_id}`")))?;
                let before = entry.value().clone();
                patch.apply_to(entry.value_mut());
                (before, entry.value().clone())
            };
            this.inner.feed.publish_game(
                session_id,
                RowEvent::Update {
                    before: Some(before),
                    after,
                },
            );
            Ok(())
        })
    }

    fn list_participants(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<ParticipantRecord>>> {
        let this = self.clone();
        Box::pin(async move { Ok(this.inner.session_rows(session_id)) })
    }

    fn find_participant(
        &self,
        session_id: Uuid,
        name: &str,
    ) -> BoxFuture<'static, StorageResult<Option<ParticipantRecord>>> {
        let this = self.clone();
        let name = name.to_owned();
        Box::pin(async move {
            Ok(this
                .inner
                .participants
                .iter()
                .find(|entry| {
                    entry.value().session_id == session_id && entry.value().name == name
                })
                .map(|entry| entry.value().clone()))
        })
    }

    fn insert_participant(
        &self,
        participant: NewParticipant,
    ) -> BoxFuture<'static, StorageResult<ParticipantRecord>> {
        let this = self.clone();
        Box::pin(async move {
            let duplicate = this.inner.participants.iter().any(|entry| {
                entry.value().session_id == participant.session_id
                    && entry.value().name == participant.name
            });
            if duplicate {
                return Err(StorageError::conflict(format!(
                    "participant `{}` already exists in session `{}`",
                    participant.name, participant.session_id
                )));
            }

            let row = ParticipantRecord {
                id: Uuid::new_v4(),
                session_id: participant.session_id,
                name: participant.name,
                is_host: participant.is_host,
                is_poisoner: None,
                acknowledged: false,
            };
            this.inner.participants.insert(row.id, row.clone());
            this.inner
                .feed
                .publish_participant(row.session_id, RowEvent::Insert { after: row.clone() });
            Ok(row)
        })
    }

    fn update_participant(
        &self,
        id: Uuid,
        patch: ParticipantPatch,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let this = self.clone();
        Box::pin(async move {
            let (before, after) = {
                let mut entry = this
                    .inner
                    .participants
                    .get_mut(&id)
                    .ok_or_else(|| StorageError::not_found(format!("participant `{id}`")))?;
                let before = entry.value().clone();
                patch.apply_to(entry.value_mut());
                (before, entry.value().clone())
            };
            this.inner.feed.publish_participant(
                after.session_id,
                RowEvent::Update {
                    before: Some(before),
                    after,
                },
            );
            Ok(())
        })
    }

    fn update_participants_where(
        &self,
        session_id: Uuid,
        patch: ParticipantPatch,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let this = self.clone();
        Box::pin(async move {
            let ids: Vec<Uuid> = this
                .inner
                .session_rows(session_id)
                .into_iter()
                .map(|row| row.id)
                .collect();

            // Independent per-row commits, each with its own feed event, the
            // same way a bulk update replicates row by row.
            for id in ids {
                let Some(mut entry) = this.inner.participants.get_mut(&id) else {
                    continue;
                };
                let before = entry.value().clone();
                patch.apply_to(entry.value_mut());
                let after = entry.value().clone();
                drop(entry);
                this.inner.feed.publish_participant(
                    session_id,
                    RowEvent::Update {
                        before: Some(before),
                        after,
                    },
                );
            }
            Ok(())
        })
    }

    fn delete_participant(&self, id: Uuid) -> BoxFuture<'static, StorageResult<()>> {
        let this = self.clone();
        Box::pin(async move {
            if let Some((_, row)) = this.inner.participants.remove(&id) {
                this.inner
                    .feed
                    .publish_participant(row.session_id, RowEvent::Delete { before: row });
            }
            Ok(())
        })
    }
}
