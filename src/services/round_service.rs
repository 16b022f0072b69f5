//! Guarded phase transitions and acknowledgments.
//!
//! Every transition is a sequence of independent writes with no atomicity
//! across them; other clients may observe intermediate states (reset done,
//! poisoner not yet chosen), so the poisoner flag is only meaningful once the
//! phase has reached the selection stage.

use rand::seq::IndexedRandom;
use tracing::{debug, info};
use uuid::Uuid;

use crate::dao::models::{GamePatch, GameRecord, ParticipantPatch};
use crate::dao::store::RecordStore;
use crate::error::ServiceError;
use crate::state::SharedState;
use crate::state::phase::PhaseAction;

/// Start the selection phase: require the minimum roster, move the phase,
/// reset every participant's round flags, and pick one poisoner uniformly at
/// random.
pub async fn start_selection(state: &SharedState, session_id: Uuid) -> Result<(), ServiceError> {
    let store = state.store();
    let game = require_game(&store, session_id).await?;
    let next = game.phase.transition(PhaseAction::StartSelection)?;

    let roster = store.list_participants(session_id).await?;
    let minimum = state.config().min_players_to_start;
    if roster.len() < minimum {
        return Err(ServiceError::PreconditionFailed(format!(
            "at least {minimum} players are required to start selection, got {}",
            roster.len()
        )));
    }

    store.update_game(session_id, GamePatch::phase(next)).await?;
    store
        .update_participants_where(session_id, ParticipantPatch::round_reset())
        .await?;

    let chosen = roster.choose(&mut rand::rng()).ok_or_else(|| {
        ServiceError::PreconditionFailed("cannot pick a poisoner from an empty roster".into())
    })?;
    store
        .update_participant(chosen.id, ParticipantPatch::poisoner(true))
        .await?;

    info!(session = %session_id, players = roster.len(), "selection started");
    debug!(session = %session_id, participant = %chosen.id, "poisoner assigned");
    Ok(())
}

/// Record that a participant has consumed their role reveal. Repeating the
/// call is harmless.
pub async fn acknowledge(state: &SharedState, participant_id: Uuid) -> Result<(), ServiceError> {
    state
        .store()
        .update_participant(participant_id, ParticipantPatch::acknowledged(true))
        .await?;
    debug!(participant = %participant_id, "role acknowledged");
    Ok(())
}

/// Advance from selection into the active round, permitted only once every
/// current participant has acknowledged.
pub async fn advance(state: &SharedState, session_id: Uuid) -> Result<(), ServiceError> {
    let store = state.store();
    let game = require_game(&store, session_id).await?;
    let next = game.phase.transition(PhaseAction::Advance)?;

    let roster = store.list_participants(session_id).await?;
    let pending = roster.iter().filter(|row| !row.acknowledged).count();
    if pending > 0 {
        return Err(ServiceError::PreconditionFailed(format!(
            "{pending} of {} players have not acknowledged their role",
            roster.len()
        )));
    }

    store.update_game(session_id, GamePatch::phase(next)).await?;
    // The celebratory part is presentation's job; this is the transient
    // success signal.
    info!(session = %session_id, "all aboard, the journey begins");
    Ok(())
}

/// End the session for everyone. Every attached client observes the terminal
/// phase through the feed and invalidates its local session.
pub async fn complete(state: &SharedState, session_id: Uuid) -> Result<(), ServiceError> {
    let store = state.store();
    let game = require_game(&store, session_id).await?;
    let next = game.phase.transition(PhaseAction::Complete)?;
    store.update_game(session_id, GamePatch::phase(next)).await?;
    info!(session = %session_id, "session completed");
    Ok(())
}

async fn require_game(
    store: &std::sync::Arc<dyn RecordStore>,
    session_id: Uuid,
) -> Result<GameRecord, ServiceError> {
    store
        .find_game(session_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("session `{session_id}`")))
}
