//! Rejoin/recovery protocol: given a remembered `(session, name)` pair,
//! restore a consistent participant row without assuming the original row
//! still exists.
//!
//! The protocol is idempotent: running it twice with no intervening state
//! change yields the same observable outcome, never two rows for one name.

use tracing::{info, warn};
use uuid::Uuid;

use crate::dao::models::{NewParticipant, ParticipantPatch, ParticipantRecord};
use crate::error::ServiceError;
use crate::state::SharedState;
use crate::state::phase::GamePhase;

/// How a rejoin resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejoinOutcome {
    /// The participant row survived; flags were preserved (modulo the lobby
    /// acknowledgment reset).
    Reconnected(ParticipantRecord),
    /// No row matched the remembered name; a fresh one was inserted.
    Joined(ParticipantRecord),
}

impl RejoinOutcome {
    /// The participant row the client should operate as.
    pub fn row(&self) -> &ParticipantRecord {
        match self {
            RejoinOutcome::Reconnected(row) | RejoinOutcome::Joined(row) => row,
        }
    }
}

/// Restore the client's participant identity in `session_id` under `name`.
///
/// A vanished session purges the local history entry and reports
/// [`ServiceError::SessionGone`]; a completed one reports
/// [`ServiceError::SessionEnded`] without purging, so the user can retry a
/// different session. A surviving row reconnects with its role flags
/// preserved, except that a lobby has no roles to acknowledge yet, so a stale
/// acknowledgment is forced back to false. A missing row is re-inserted,
/// subject to the capacity limit, claiming the host seat iff no existing row
/// holds it — the self-healing rule that keeps a session from ending up
/// permanently host-less.
pub async fn rejoin(
    state: &SharedState,
    session_id: Uuid,
    name: &str,
) -> Result<RejoinOutcome, ServiceError> {
    let store = state.store();

    let Some(game) = store.find_game(session_id).await? else {
        warn!(session = %session_id, "remembered session is gone; purging local entry");
        state.purge_session(session_id);
        return Err(ServiceError::SessionGone);
    };
    if game.phase.is_terminal() {
        return Err(ServiceError::SessionEnded);
    }

    let outcome = match store.find_participant(session_id, name).await? {
        Some(mut row) => {
            if game.phase == GamePhase::Lobby && row.acknowledged {
                store
                    .update_participant(row.id, ParticipantPatch::acknowledged(false))
                    .await?;
                row.acknowledged = false;
            }
            info!(session = %session_id, name, "reconnected to existing participant row");
            RejoinOutcome::Reconnected(row)
        }
        None => {
            let roster = store.list_participants(session_id).await?;
            let limit = state.config().max_players;
            if roster.len() >= limit {
                return Err(ServiceError::CapacityExceeded { limit });
            }

            let host_needed = !roster.iter().any(|row| row.is_host);
            if host_needed {
                warn!(session = %session_id, name, "session has no host; claiming the seat");
            }
            let row = store
                .insert_participant(NewParticipant {
                    session_id,
                    name: name.to_owned(),
                    is_host: host_needed,
                })
                .await?;
            info!(session = %session_id, name, "joined with a fresh participant row");
            RejoinOutcome::Joined(row)
        }
    };

    state.remember_session(session_id, name);
    Ok(outcome)
}
