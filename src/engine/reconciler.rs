use indexmap::IndexMap;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::dao::models::{GameRecord, ParticipantRecord};
use crate::feed::RowEvent;

/// Forced-invalidation events surfaced alongside the projection. These are
/// not errors: they tell the presentation layer to abandon the session and
/// return to the entry flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionNotice {
    /// This client's own participant row was deleted, by itself or by the
    /// host; the local session must be purged.
    Evicted,
    /// The session reached its terminal phase; the local attachment is stale.
    Completed,
}

/// Read-only snapshot of one client's view of the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    /// The game row as last observed.
    pub game: GameRecord,
    /// Every participant row, in arrival order.
    pub participants: Vec<ParticipantRecord>,
    /// The row matching this client's remembered identity, when present.
    pub current: Option<ParticipantRecord>,
}

impl Projection {
    /// `(acknowledged, total)` readiness counts driving the host's ability to
    /// advance out of the selection phase.
    pub fn readiness(&self) -> (usize, usize) {
        let acknowledged = self
            .participants
            .iter()
            .filter(|row| row.acknowledged)
            .count();
        (acknowledged, self.participants.len())
    }
}

/// One client's in-memory projection of the shared game and participant
/// records, kept current by applying change feed events.
///
/// Application is idempotent and tolerates arbitrary interleavings across the
/// two event kinds: the feed guarantees at-least-once delivery with no
/// cross-topic ordering, so no rule here may depend on arrival order.
#[derive(Debug, Clone)]
pub struct Reconciler {
    game: GameRecord,
    roster: IndexMap<Uuid, ParticipantRecord>,
    self_name: String,
}

impl Reconciler {
    /// Seed a projection from one full read of the shared records.
    pub fn new(game: GameRecord, participants: Vec<ParticipantRecord>, self_name: String) -> Self {
        let roster = participants
            .into_iter()
            .map(|row| (row.id, row))
            .collect::<IndexMap<_, _>>();
        Self {
            game,
            roster,
            self_name,
        }
    }

    /// The identity this projection resolves `current` against.
    pub fn self_name(&self) -> &str {
        &self.self_name
    }

    /// The participant row matching this client's identity, if it still
    /// exists. Recomputed from the roster on every call so feed updates are
    /// reflected without separate bookkeeping.
    pub fn self_row(&self) -> Option<&ParticipantRecord> {
        self.roster.values().find(|row| row.name == self.self_name)
    }

    /// Snapshot the `(game, participants, current)` triple for presentation.
    pub fn projection(&self) -> Projection {
        Projection {
            game: self.game.clone(),
            participants: self.roster.values().cloned().collect(),
            current: self.self_row().cloned(),
        }
    }

    /// Apply a game-row event. The feed delivers full row snapshots, so the
    /// local game projection is replaced wholesale, last write wins.
    pub fn apply_game_event(&mut self, event: RowEvent<GameRecord>) -> Option<SessionNotice> {
        match event {
            RowEvent::Insert { after } | RowEvent::Update { after, .. } => {
                let was_terminal = self.game.phase.is_terminal();
                debug!(session = %after.id, phase = ?after.phase, "game projection replaced");
                self.game = after;
                if self.game.phase.is_terminal() && !was_terminal {
                    return Some(SessionNotice::Completed);
                }
                None
            }
            RowEvent::Delete { before } => {
                // Game rows are never deleted during normal play; keep the
                // last known state rather than tearing the projection down.
                warn!(session = %before.id, "ignoring game row deletion");
                None
            }
        }
    }

    /// Apply a participant-row event.
    ///
    /// Inserts are idempotent against duplicate delivery; updates replace the
    /// matching row by identifier (adding it when the insert has not arrived
    /// yet); deletes of this client's own row report an eviction.
    pub fn apply_participant_event(
        &mut self,
        event: RowEvent<ParticipantRecord>,
    ) -> Option<SessionNotice> {
        match event {
            RowEvent::Insert { after } => {
                if !self.roster.contains_key(&after.id) {
                    debug!(participant = %after.id, name = %after.name, "roster insert");
                    self.roster.insert(after.id, after);
                }
                None
            }
            RowEvent::Update { after, .. } => {
                debug!(participant = %after.id, name = %after.name, "roster update");
                self.roster.insert(after.id, after);
                None
            }
            RowEvent::Delete { before } => {
                self.roster.shift_remove(&before.id);
                if before.name == self.self_name {
                    return Some(SessionNotice::Evicted);
                }
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;
    use crate::state::phase::GamePhase;

    fn game(phase: GamePhase) -> GameRecord {
        GameRecord {
            id: Uuid::new_v4(),
            phase,
            created_at: SystemTime::now(),
        }
    }

    fn passenger(session_id: Uuid, name: &str) -> ParticipantRecord {
        ParticipantRecord {
            id: Uuid::new_v4(),
            session_id,
            name: name.into(),
            is_host: false,
            is_poisoner: None,
            acknowledged: false,
        }
    }

    #[test]
    fn duplicate_insert_leaves_one_row() {
        let game = game(GamePhase::Lobby);
        let row = passenger(game.id, "MOLLY");
        let mut reconciler = Reconciler::new(game, vec![], "MOLLY".into());

        reconciler.apply_participant_event(RowEvent::Insert { after: row.clone() });
        reconciler.apply_participant_event(RowEvent::Insert { after: row.clone() });

        let projection = reconciler.projection();
        assert_eq!(projection.participants.len(), 1);
        assert_eq!(projection.current.unwrap().id, row.id);
    }

    #[test]
    fn update_for_self_refreshes_current() {
        let game = game(GamePhase::Selecting);
        let mut row = passenger(game.id, "JADE");
        let mut reconciler = Reconciler::new(game, vec![row.clone()], "JADE".into());

        row.acknowledged = true;
        row.is_poisoner = Some(true);
        reconciler.apply_participant_event(RowEvent::Update {
            before: None,
            after: row.clone(),
        });

        let current = reconciler.projection().current.unwrap();
        assert!(current.acknowledged);
        assert_eq!(current.is_poisoner, Some(true));
    }

    #[test]
    fn update_arriving_before_insert_is_absorbed() {
        let game = game(GamePhase::Lobby);
        let row = passenger(game.id, "OLIVER");
        let mut reconciler = Reconciler::new(game, vec![], "MOLLY".into());

        reconciler.apply_participant_event(RowEvent::Update {
            before: None,
            after: row.clone(),
        });
        reconciler.apply_participant_event(RowEvent::Insert { after: row.clone() });

        assert_eq!(reconciler.projection().participants.len(), 1);
    }

    #[test]
    fn own_row_deletion_reports_eviction() {
        let game = game(GamePhase::Lobby);
        let me = passenger(game.id, "MOLLY");
        let other = passenger(game.id, "OLIVER");
        let mut reconciler =
            Reconciler::new(game, vec![me.clone(), other.clone()], "MOLLY".into());

        let notice = reconciler.apply_participant_event(RowEvent::Delete {
            before: other.clone(),
        });
        assert_eq!(notice, None);

        let notice = reconciler.apply_participant_event(RowEvent::Delete { before: me });
        assert_eq!(notice, Some(SessionNotice::Evicted));
        assert!(reconciler.projection().current.is_none());
    }

    #[test]
    fn terminal_phase_reports_completion_once() {
        let mut record = game(GamePhase::Active);
        let mut reconciler = Reconciler::new(record.clone(), vec![], "MOLLY".into());

        record.phase = GamePhase::Completed;
        let notice = reconciler.apply_game_event(RowEvent::Update {
            before: None,
            after: record.clone(),
        });
        assert_eq!(notice, Some(SessionNotice::Completed));

        // Redelivery of the same snapshot does not re-fire the notice.
        let notice = reconciler.apply_game_event(RowEvent::Update {
            before: None,
            after: record,
        });
        assert_eq!(notice, None);
    }

    #[test]
    fn clients_converge_across_interleavings() {
        let record = game(GamePhase::Lobby);
        let a = passenger(record.id, "A");
        let b = passenger(record.id, "B");
        let mut updated_a = a.clone();
        updated_a.acknowledged = true;
        let mut selecting = record.clone();
        selecting.phase = GamePhase::Selecting;

        let participant_events = [
            RowEvent::Insert { after: a.clone() },
            RowEvent::Insert { after: b.clone() },
            RowEvent::Insert { after: a.clone() }, // duplicate delivery
            RowEvent::Update {
                before: Some(a.clone()),
                after: updated_a.clone(),
            },
            RowEvent::Delete { before: b.clone() },
        ];

        let mut first = Reconciler::new(record.clone(), vec![], "A".into());
        let mut second = Reconciler::new(record.clone(), vec![], "A".into());

        // First client sees the phase change before any roster event; the
        // second sees it last.
        first.apply_game_event(RowEvent::Update {
            before: None,
            after: selecting.clone(),
        });
        for event in participant_events.clone() {
            first.apply_participant_event(event);
        }
        for event in participant_events {
            second.apply_participant_event(event);
        }
        second.apply_game_event(RowEvent::Update {
            before: None,
            after: selecting,
        });

        assert_eq!(first.projection(), second.projection());
        let (ready, total) = first.projection().readiness();
        assert_eq!((ready, total), (1, 1));
    }
}
