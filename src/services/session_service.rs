//! Attach/detach orchestration: wires a freshly attached engine into the
//! application state and reacts to forced-invalidation notices.

use tokio::sync::broadcast::error::RecvError;
use tracing::info;
use uuid::Uuid;

use crate::engine::{self, SessionHandle, SessionNotice};
use crate::error::ServiceError;
use crate::services::rejoin_service;
use crate::state::SharedState;

/// Attach to a session as `name` and install the handle as the client's
/// current session.
///
/// A watcher task follows the handle's notices: an eviction purges the local
/// history entry and detaches; a completion detaches but keeps the entry so
/// the entry flow can report the session as ended.
pub async fn attach_session(
    state: &SharedState,
    session_id: Uuid,
    name: &str,
) -> Result<SessionHandle, ServiceError> {
    let store = state.store();
    let handle = engine::attach(&store, state.feed(), session_id, name).await?;
    spawn_invalidation_watcher(state.clone(), handle.clone());
    state.install_session(handle.clone()).await;
    Ok(handle)
}

/// Resume the most recently remembered session: prune stale history, run the
/// rejoin protocol, then attach under the restored identity.
///
/// Either the whole sequence completes and the client is attached, or it
/// fails with a classified outcome and the client stays on the entry flow;
/// no half-applied local state remains.
pub async fn resume(state: &SharedState) -> Result<SessionHandle, ServiceError> {
    state.prune_history();
    let entry = state
        .recall_most_recent()
        .ok_or_else(|| ServiceError::NotFound("no remembered session".into()))?;

    rejoin_service::rejoin(state, entry.session_id, &entry.participant_name).await?;
    attach_session(state, entry.session_id, &entry.participant_name).await
}

/// Detach the current session, if any.
pub async fn detach_session(state: &SharedState) {
    if let Some(handle) = state.take_session().await {
        handle.detach().await;
    }
}

fn spawn_invalidation_watcher(state: SharedState, handle: SessionHandle) {
    let mut notices = handle.notices();
    tokio::spawn(async move {
        loop {
            match notices.recv().await {
                Ok(SessionNotice::Evicted) => {
                    info!(session = %handle.session_id(), "evicted; invalidating local session");
                    state.purge_session(handle.session_id());
                    break;
                }
                Ok(SessionNotice::Completed) => {
                    info!(session = %handle.session_id(), "session completed; detaching");
                    break;
                }
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => return,
            }
        }

        match state.clear_session(handle.session_id()).await {
            Some(current) => current.detach().await,
            None => handle.detach().await,
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio::time::sleep;

    use crate::dao::models::GamePatch;
    use crate::services::lobby_service;
    use crate::services::testing::test_state;
    use crate::state::phase::GamePhase;

    #[tokio::test]
    async fn resume_restores_the_remembered_identity() {
        let context = test_state();
        let state = &context.state;
        let game = lobby_service::create_session(state, "MOLLY").await.unwrap();

        let handle = resume(state).await.unwrap();
        assert_eq!(handle.session_id(), game.id);
        let projection = handle.projection().await;
        assert_eq!(projection.current.unwrap().name, "MOLLY");
        detach_session(state).await;
    }

    #[tokio::test]
    async fn resume_without_history_reports_not_found() {
        let context = test_state();
        let err = resume(&context.state).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn completion_detaches_but_keeps_history() {
        let context = test_state();
        let state = &context.state;
        let game = lobby_service::create_session(state, "MOLLY").await.unwrap();
        attach_session(state, game.id, "MOLLY").await.unwrap();

        state
            .store()
            .update_game(game.id, GamePatch::phase(GamePhase::Completed))
            .await
            .unwrap();
        sleep(Duration::from_millis(50)).await;

        assert!(state.current_session().await.is_none());
        assert_eq!(state.recall_most_recent().unwrap().session_id, game.id);

        // A later resume now classifies the session as ended.
        let err = resume(state).await.unwrap_err();
        assert!(matches!(err, ServiceError::SessionEnded));
    }

    #[tokio::test]
    async fn eviction_purges_history_and_detaches() {
        let context = test_state();
        let state = &context.state;
        let game = lobby_service::create_session(state, "MOLLY").await.unwrap();
        lobby_service::join_session(state, game.id, "OLIVER")
            .await
            .unwrap();
        attach_session(state, game.id, "OLIVER").await.unwrap();

        let row = state
            .store()
            .find_participant(game.id, "OLIVER")
            .await
            .unwrap()
            .unwrap();
        state.store().delete_participant(row.id).await.unwrap();
        sleep(Duration::from_millis(50)).await;

        assert!(state.current_session().await.is_none());
        assert!(
            state
                .recent_sessions()
                .iter()
                .all(|entry| entry.session_id != game.id)
        );
    }
}
