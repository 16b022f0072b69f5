//! Operator and test controls: forced phases, flag resets, and simulated
//! players. These bypass the guarded transition rules on purpose and are
//! meant for exercising the flow, not for regular play.

use std::time::Duration;

use futures::future::join_all;
use rand::seq::IndexedRandom;
use rand::Rng;
use tokio::time::sleep;
use tracing::{info, warn};
use uuid::Uuid;

use crate::dao::models::{GamePatch, ParticipantPatch};
use crate::error::ServiceError;
use crate::services::round_service;
use crate::state::SharedState;
use crate::state::phase::GamePhase;

/// Force the session into `phase` directly, skipping transition validation.
pub async fn force_phase(
    state: &SharedState,
    session_id: Uuid,
    phase: GamePhase,
) -> Result<(), ServiceError> {
    warn!(session = %session_id, ?phase, "forcing phase without transition checks");
    state
        .store()
        .update_game(session_id, GamePatch::phase(phase))
        .await?;
    Ok(())
}

/// Clear the acknowledgment flag on every participant of the session.
pub async fn reset_acknowledgments(
    state: &SharedState,
    session_id: Uuid,
) -> Result<(), ServiceError> {
    state
        .store()
        .update_participants_where(session_id, ParticipantPatch::acknowledged(false))
        .await?;
    info!(session = %session_id, "acknowledgments reset");
    Ok(())
}

/// Set or clear the poisoner flag on one participant, ignoring how many
/// poisoners the session ends up with.
pub async fn set_poisoner(
    state: &SharedState,
    participant_id: Uuid,
    is_poisoner: bool,
) -> Result<(), ServiceError> {
    state
        .store()
        .update_participant(participant_id, ParticipantPatch::poisoner(is_poisoner))
        .await?;
    Ok(())
}

/// Acknowledge on behalf of one randomly chosen participant that has not
/// acknowledged yet. Reports how many were still pending before the call.
pub async fn acknowledge_one(
    state: &SharedState,
    session_id: Uuid,
) -> Result<usize, ServiceError> {
    let roster = state.store().list_participants(session_id).await?;
    let pending: Vec<_> = roster.iter().filter(|row| !row.acknowledged).collect();
    let Some(chosen) = pending.choose(&mut rand::rng()).copied() else {
        return Ok(0);
    };
    round_service::acknowledge(state, chosen.id).await?;
    info!(session = %session_id, name = %chosen.name, "simulated one acknowledgment");
    Ok(pending.len())
}

/// Simulate every pending participant acknowledging on their own schedule:
/// each gets a task with a random 1–5 second delay, and the call resolves
/// once all of them have fired. Returns how many acknowledgments were
/// simulated.
pub async fn simulate_acknowledgments(
    state: &SharedState,
    session_id: Uuid,
) -> Result<usize, ServiceError> {
    let roster = state.store().list_participants(session_id).await?;
    let pending: Vec<_> = roster.into_iter().filter(|row| !row.acknowledged).collect();
    if pending.is_empty() {
        return Ok(0);
    }

    info!(session = %session_id, count = pending.len(), "simulating acknowledgments");
    let tasks: Vec<_> = pending
        .into_iter()
        .map(|row| {
            let state = state.clone();
            tokio::spawn(async move {
                let delay = rand::rng().random_range(1000..=5000);
                sleep(Duration::from_millis(delay)).await;
                if let Err(err) = round_service::acknowledge(&state, row.id).await {
                    warn!(participant = %row.id, error = %err, "simulated acknowledgment failed");
                    return 0;
                }
                1
            })
        })
        .collect();

    let mut simulated = 0;
    for joined in join_all(tasks).await {
        simulated += joined.unwrap_or(0);
    }
    Ok(simulated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::lobby_service;
    use crate::services::testing::test_state;

    async fn four_player_lobby(state: &SharedState) -> Uuid {
        let game = lobby_service::create_session(state, "A").await.unwrap();
        for name in ["B", "C", "D"] {
            lobby_service::join_session(state, game.id, name)
                .await
                .unwrap();
        }
        game.id
    }

    #[tokio::test]
    async fn force_phase_skips_transition_rules() {
        let context = test_state();
        let state = &context.state;
        let session_id = four_player_lobby(state).await;

        // Lobby -> Active is not a legal transition; forcing it works anyway.
        force_phase(state, session_id, GamePhase::Active)
            .await
            .unwrap();
        let game = state
            .store()
            .find_game(session_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(game.phase, GamePhase::Active);
    }

    #[tokio::test]
    async fn set_poisoner_allows_any_count() {
        let context = test_state();
        let state = &context.state;
        let session_id = four_player_lobby(state).await;

        let roster = state.store().list_participants(session_id).await.unwrap();
        set_poisoner(state, roster[0].id, true).await.unwrap();
        set_poisoner(state, roster[1].id, true).await.unwrap();

        let roster = state.store().list_participants(session_id).await.unwrap();
        let poisoners = roster
            .iter()
            .filter(|row| row.is_poisoner == Some(true))
            .count();
        assert_eq!(poisoners, 2);
    }

    #[tokio::test]
    async fn acknowledge_one_drains_pending_participants() {
        let context = test_state();
        let state = &context.state;
        let session_id = four_player_lobby(state).await;

        assert_eq!(acknowledge_one(state, session_id).await.unwrap(), 4);
        assert_eq!(acknowledge_one(state, session_id).await.unwrap(), 3);
        assert_eq!(acknowledge_one(state, session_id).await.unwrap(), 2);
        assert_eq!(acknowledge_one(state, session_id).await.unwrap(), 1);
        assert_eq!(acknowledge_one(state, session_id).await.unwrap(), 0);

        let roster = state.store().list_participants(session_id).await.unwrap();
        assert!(roster.iter().all(|row| row.acknowledged));
    }

    #[tokio::test(start_paused = true)]
    async fn simulation_acknowledges_everyone_pending() {
        let context = test_state();
        let state = &context.state;
        let session_id = four_player_lobby(state).await;

        let roster = state.store().list_participants(session_id).await.unwrap();
        round_service::acknowledge(state, roster[0].id)
            .await
            .unwrap();

        let simulated = simulate_acknowledgments(state, session_id).await.unwrap();
        assert_eq!(simulated, 3);
        let roster = state.store().list_participants(session_id).await.unwrap();
        assert!(roster.iter().all(|row| row.acknowledged));

        // Nothing left to simulate.
        assert_eq!(
            simulate_acknowledgments(state, session_id).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn reset_clears_every_acknowledgment() {
        let context = test_state();
        let state = &context.state;
        let session_id = four_player_lobby(state).await;

        for row in state.store().list_participants(session_id).await.unwrap() {
            round_service::acknowledge(state, row.id).await.unwrap();
        }
        reset_acknowledgments(state, session_id).await.unwrap();

        let roster = state.store().list_participants(session_id).await.unwrap();
        assert!(roster.iter().all(|row| !row.acknowledged));
    }
}
