use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle phase of a game session.
///
/// The serialized names match the wire values stored in the shared game
/// record, so every client agrees on the encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GamePhase {
    /// Players are boarding; the roster can still change freely.
    Lobby,
    /// Roles have been dealt and participants reveal them one by one.
    Selecting,
    /// The round is underway with roles locked in.
    Active,
    /// Terminal phase; every client must invalidate its local session.
    Completed,
}

impl GamePhase {
    /// Whether this phase is terminal.
    pub fn is_terminal(self) -> bool {
        matches!(self, GamePhase::Completed)
    }
}

/// Host-initiated actions that move a session forward through its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseAction {
    /// Deal roles and move the lobby into the selection phase.
    StartSelection,
    /// Begin the round once every participant has acknowledged their role.
    Advance,
    /// End the session for everyone.
    Complete,
}

/// Error returned when an action cannot be applied from the current phase.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {action:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// The phase the session was in when the action was attempted.
    pub from: GamePhase,
    /// The action that cannot be applied from that phase.
    pub action: PhaseAction,
}

impl GamePhase {
    /// Compute the phase this action leads to, or reject it.
    ///
    /// This validates shape only; roster-dependent guards (minimum player
    /// count, full acknowledgment) live with the services issuing the writes.
    /// Forced transitions intentionally bypass this and write the target
    /// phase directly.
    pub fn transition(self, action: PhaseAction) -> Result<GamePhase, InvalidTransition> {
        match (self, action) {
            (GamePhase::Lobby, PhaseAction::StartSelection) => Ok(GamePhase::Selecting),
            (GamePhase::Selecting, PhaseAction::Advance) => Ok(GamePhase::Active),
            (GamePhase::Active, PhaseAction::Complete) => Ok(GamePhase::Completed),
            (from, action) => Err(InvalidTransition { from, action }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_through_lifecycle() {
        let phase = GamePhase::Lobby;
        let phase = phase.transition(PhaseAction::StartSelection).unwrap();
        assert_eq!(phase, GamePhase::Selecting);
        let phase = phase.transition(PhaseAction::Advance).unwrap();
        assert_eq!(phase, GamePhase::Active);
        let phase = phase.transition(PhaseAction::Complete).unwrap();
        assert_eq!(phase, GamePhase::Completed);
        assert!(phase.is_terminal());
    }

    #[test]
    fn skipping_phases_is_rejected() {
        let err = GamePhase::Lobby.transition(PhaseAction::Advance).unwrap_err();
        assert_eq!(err.from, GamePhase::Lobby);
        assert_eq!(err.action, PhaseAction::Advance);

        assert!(GamePhase::Lobby.transition(PhaseAction::Complete).is_err());
        assert!(
            GamePhase::Selecting
                .transition(PhaseAction::StartSelection)
                .is_err()
        );
    }

    #[test]
    fn completed_is_terminal_for_every_action() {
        for action in [
            PhaseAction::StartSelection,
            PhaseAction::Advance,
            PhaseAction::Complete,
        ] {
            assert!(GamePhase::Completed.transition(action).is_err());
        }
    }

    #[test]
    fn wire_names_are_screaming_snake_case() {
        assert_eq!(
            serde_json::to_string(&GamePhase::Selecting).unwrap(),
            "\"SELECTING\""
        );
        assert_eq!(
            serde_json::from_str::<GamePhase>("\"LOBBY\"").unwrap(),
            GamePhase::Lobby
        );
    }
}
