use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use uuid::Uuid;

use crate::state::phase::GamePhase;

/// One game session row shared by every connected client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameRecord {
    /// Primary key of the session, assigned at creation and used as the
    /// sharding key for change feed topics.
    pub id: Uuid,
    /// Current lifecycle phase of the session.
    pub phase: GamePhase,
    /// Creation timestamp, immutable after insertion.
    pub created_at: SystemTime,
}

/// One participant row within a session.
///
/// Rows are logically shared between clients; the "current player" relation
/// is reconstructed per client by matching `name`, not by a session token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParticipantRecord {
    /// Primary key of the row, assigned at insertion.
    pub id: Uuid,
    /// Owning game session.
    pub session_id: Uuid,
    /// Display identity, unique within a session (the natural key used for
    /// rejoin matching).
    pub name: String,
    /// Whether this participant runs the session. Storage does not enforce
    /// uniqueness; the rejoin self-healing rule is the only defense.
    pub is_host: bool,
    /// `None` until a selection round has touched this row; `Some(true)` for
    /// exactly one participant while a round is underway.
    pub is_poisoner: Option<bool>,
    /// Whether the participant has consumed their role reveal.
    pub acknowledged: bool,
}

/// Payload for inserting a fresh participant row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewParticipant {
    /// Session the participant joins.
    pub session_id: Uuid,
    /// Chosen display identity.
    pub name: String,
    /// Whether the new row claims the host seat.
    pub is_host: bool,
}

/// Partial update applied to a game row; `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GamePatch {
    /// New lifecycle phase, if the phase changes.
    pub phase: Option<GamePhase>,
}

impl GamePatch {
    /// Patch that only moves the session to `phase`.
    pub fn phase(phase: GamePhase) -> Self {
        Self { phase: Some(phase) }
    }
}

/// Partial update applied to one or more participant rows; `None` fields are
/// left untouched. The poisoner flag is doubly optional because the column
/// itself is nullable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParticipantPatch {
    /// New host flag.
    pub is_host: Option<bool>,
    /// New poisoner flag, including clearing it back to `None`.
    pub is_poisoner: Option<Option<bool>>,
    /// New acknowledgment flag.
    pub acknowledged: Option<bool>,
}

impl ParticipantPatch {
    /// Patch that only sets the acknowledgment flag.
    pub fn acknowledged(value: bool) -> Self {
        Self {
            acknowledged: Some(value),
            ..Self::default()
        }
    }

    /// Patch that only sets the poisoner flag.
    pub fn poisoner(value: bool) -> Self {
        Self {
            is_poisoner: Some(Some(value)),
            ..Self::default()
        }
    }

    /// Patch that only sets the host flag.
    pub fn host(value: bool) -> Self {
        Self {
            is_host: Some(value),
            ..Self::default()
        }
    }

    /// Bulk patch used when a session re-enters the selection phase: clears
    /// both the acknowledgment and poisoner flags on every row.
    pub fn round_reset() -> Self {
        Self {
            is_host: None,
            is_poisoner: Some(Some(false)),
            acknowledged: Some(false),
        }
    }

    /// Apply this patch to a participant row in place.
    pub fn apply_to(&self, row: &mut ParticipantRecord) {
        if let Some(is_host) = self.is_host {
            row.is_host = is_host;
        }
        if let Some(is_poisoner) = self.is_poisoner {
            row.is_poisoner = is_poisoner;
        }
        if let Some(acknowledged) = self.acknowledged {
            row.acknowledged = acknowledged;
        }
    }
}

impl GamePatch {
    /// Apply this patch to a game row in place.
    pub fn apply_to(&self, row: &mut GameRecord) {
        if let Some(phase) = self.phase {
            row.phase = phase;
        }
    }
}
