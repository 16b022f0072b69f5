use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::models::{GamePatch, GameRecord, NewParticipant, ParticipantPatch, ParticipantRecord};
use crate::dao::storage::StorageResult;
use crate::state::phase::GamePhase;

/// Abstraction over the shared record store for game sessions and
/// participants.
///
/// Any document or row store with point queries, filtered reads, inserts,
/// updates-by-filter, and deletes-by-filter can implement this. Writes are
/// last-write-wins per row; the trait offers no cross-row transaction, so
/// multi-write sequences (such as a selection-phase reset followed by the
/// poisoner pick) may be observed half-applied by other clients.
pub trait RecordStore: Send + Sync {
    /// Create a new game session row in the given initial phase.
    fn create_game(&self, initial_phase: GamePhase) -> BoxFuture<'static, StorageResult<GameRecord>>;

    /// Fetch a game session by id.
    fn find_game(&self, session_id: Uuid) -> BoxFuture<'static, StorageResult<Option<GameRecord>>>;

    /// Fetch the newest game session whose phase is not terminal, if any.
    fn find_active_game(&self) -> BoxFuture<'static, StorageResult<Option<GameRecord>>>;

    /// Apply a partial update to a game session row.
    fn update_game(
        &self,
        session_id: Uuid,
        patch: GamePatch,
    ) -> BoxFuture<'static, StorageResult<()>>;

    /// List every participant row belonging to a session.
    fn list_participants(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<ParticipantRecord>>>;

    /// Fetch the participant row matching a display name within a session.
    fn find_participant(
        &self,
        session_id: Uuid,
        name: &str,
    ) -> BoxFuture<'static, StorageResult<Option<ParticipantRecord>>>;

    /// Insert a fresh participant row, failing with a conflict when the name
    /// is already taken within the session.
    fn insert_participant(
        &self,
        participant: NewParticipant,
    ) -> BoxFuture<'static, StorageResult<ParticipantRecord>>;

    /// Apply a partial update to a single participant row.
    fn update_participant(
        &self,
        id: Uuid,
        patch: ParticipantPatch,
    ) -> BoxFuture<'static, StorageResult<()>>;

    /// Apply a partial update to every participant row of a session.
    fn update_participants_where(
        &self,
        session_id: Uuid,
        patch: ParticipantPatch,
    ) -> BoxFuture<'static, StorageResult<()>>;

    /// Delete a participant row by id. Deleting an absent row is a no-op.
    fn delete_participant(&self, id: Uuid) -> BoxFuture<'static, StorageResult<()>>;
}
