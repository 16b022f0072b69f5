//! Boarding and roster management: session creation, joining, leaving,
//! host-initiated removal, and the out-of-band host maintenance paths.

use tracing::{info, warn};
use uuid::Uuid;

use crate::dao::models::{GameRecord, NewParticipant, ParticipantPatch, ParticipantRecord};
use crate::error::ServiceError;
use crate::state::SharedState;
use crate::state::phase::GamePhase;

/// Create a fresh session in the lobby phase with `host_name` holding the
/// host seat, and remember it locally.
pub async fn create_session(
    state: &SharedState,
    host_name: &str,
) -> Result<GameRecord, ServiceError> {
    let store = state.store();
    let game = store.create_game(GamePhase::Lobby).await?;
    store
        .insert_participant(NewParticipant {
            session_id: game.id,
            name: host_name.to_owned(),
            is_host: true,
        })
        .await?;
    state.remember_session(game.id, host_name);
    info!(session = %game.id, host = host_name, "created session");
    Ok(game)
}

/// Join an existing session under `name`.
///
/// Fails with [`ServiceError::SessionEnded`] when the session is already
/// terminal, [`ServiceError::CapacityExceeded`] when the roster is at the
/// limit, and [`ServiceError::Conflict`] when the name is taken.
pub async fn join_session(
    state: &SharedState,
    session_id: Uuid,
    name: &str,
) -> Result<ParticipantRecord, ServiceError> {
    let store = state.store();
    let game = store
        .find_game(session_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("session `{session_id}`")))?;
    if game.phase.is_terminal() {
        return Err(ServiceError::SessionEnded);
    }

    let roster = store.list_participants(session_id).await?;
    let limit = state.config().max_players;
    if roster.len() >= limit {
        return Err(ServiceError::CapacityExceeded { limit });
    }

    let row = store
        .insert_participant(NewParticipant {
            session_id,
            name: name.to_owned(),
            is_host: false,
        })
        .await?;
    state.remember_session(session_id, name);
    info!(session = %session_id, name, "joined session");
    Ok(row)
}

/// Leave the currently attached session: delete our own row, purge the local
/// history entry, and detach.
pub async fn leave_session(state: &SharedState) -> Result<(), ServiceError> {
    let handle = state
        .current_session()
        .await
        .ok_or_else(|| ServiceError::PreconditionFailed("no attached session".into()))?;
    let projection = handle.projection().await;
    let me = projection
        .current
        .ok_or_else(|| ServiceError::SelfNotFound("own row already gone".into()))?;

    state.store().delete_participant(me.id).await?;
    state.purge_session(handle.session_id());
    if let Some(current) = state.clear_session(handle.session_id()).await {
        current.detach().await;
    }
    info!(session = %handle.session_id(), name = %me.name, "left session");
    Ok(())
}

/// Host action removing another participant from the session, in any phase.
///
/// Only the host may remove, and never against the host's own row: a host
/// leaves through [`leave_session`] instead. The removed client observes the
/// delete through the feed and invalidates itself.
pub async fn remove_participant(state: &SharedState, target_id: Uuid) -> Result<(), ServiceError> {
    let handle = state
        .current_session()
        .await
        .ok_or_else(|| ServiceError::PreconditionFailed("no attached session".into()))?;
    let projection = handle.projection().await;
    let me = projection
        .current
        .as_ref()
        .ok_or_else(|| ServiceError::SelfNotFound("own row already gone".into()))?;

    if !me.is_host {
        return Err(ServiceError::PreconditionFailed(
            "only the host may remove participants".into(),
        ));
    }
    let target = projection
        .participants
        .iter()
        .find(|row| row.id == target_id)
        .ok_or_else(|| ServiceError::NotFound(format!("participant `{target_id}`")))?;
    if target.is_host {
        return Err(ServiceError::PreconditionFailed(
            "the host cannot be removed; the host leaves instead".into(),
        ));
    }

    state.store().delete_participant(target_id).await?;
    info!(session = %handle.session_id(), target = %target.name, "removed participant");
    Ok(())
}

/// Privileged maintenance path handing the host seat to the configured
/// operator identity: demote the current host, then promote or insert the
/// operator's row. Does not go through the rejoin self-healing rule.
pub async fn transfer_host(state: &SharedState) -> Result<ParticipantRecord, ServiceError> {
    let store = state.store();
    let game = store
        .find_active_game()
        .await?
        .ok_or_else(|| ServiceError::NotFound("active session".into()))?;
    let roster = store.list_participants(game.id).await?;
    let current_host = roster
        .iter()
        .find(|row| row.is_host)
        .ok_or_else(|| ServiceError::NotFound("current host".into()))?;

    warn!(
        session = %game.id,
        from = %current_host.name,
        "executing host handover"
    );
    store
        .update_participant(current_host.id, ParticipantPatch::host(false))
        .await?;

    let operator = state.config().operator_name.clone();
    let row = match store.find_participant(game.id, &operator).await? {
        Some(mut existing) => {
            store
                .update_participant(existing.id, ParticipantPatch::host(true))
                .await?;
            existing.is_host = true;
            existing
        }
        None => {
            store
                .insert_participant(NewParticipant {
                    session_id: game.id,
                    name: operator.clone(),
                    is_host: true,
                })
                .await?
        }
    };
    state.remember_session(game.id, &operator);
    Ok(row)
}

/// Bind the local session to the operator identity without touching shared
/// records, provided an active session with a host exists.
pub async fn claim_host(state: &SharedState) -> Result<GameRecord, ServiceError> {
    let store = state.store();
    let game = store
        .find_active_game()
        .await?
        .ok_or_else(|| ServiceError::NotFound("active session".into()))?;
    let roster = store.list_participants(game.id).await?;
    if !roster.iter().any(|row| row.is_host) {
        return Err(ServiceError::NotFound("current host".into()));
    }

    let operator = state.config().operator_name.clone();
    state.remember_session(game.id, &operator);
    info!(session = %game.id, "claimed host locally");
    Ok(game)
}
