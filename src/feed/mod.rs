//! Change feed fanning row-level insert/update/delete notifications out to
//! subscribed clients.
//!
//! Delivery is at-least-once per topic with no ordering guarantee across
//! topics; consumers must apply events idempotently.

use dashmap::DashMap;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::dao::models::{GameRecord, ParticipantRecord};

/// Row-level change notification carrying full row snapshots, not diffs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowEvent<T> {
    /// A row was inserted.
    Insert {
        /// The freshly inserted row.
        after: T,
    },
    /// A row was updated; `before` may be absent depending on the backend.
    Update {
        /// Snapshot prior to the update, when the backend provides one.
        before: Option<T>,
        /// Snapshot after the update.
        after: T,
    },
    /// A row was deleted.
    Delete {
        /// Snapshot of the row as it existed before deletion.
        before: T,
    },
}

/// Subscription handle for one feed topic.
///
/// Dropping the handle unsubscribes; [`FeedSubscription::unsubscribe`] makes
/// the release explicit at call sites that pair it with a subscribe.
pub struct FeedSubscription<T> {
    receiver: broadcast::Receiver<RowEvent<T>>,
}

impl<T: Clone> FeedSubscription<T> {
    /// Receive the next event on this topic.
    pub async fn recv(&mut self) -> Result<RowEvent<T>, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// Release the subscription.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

/// Per-session fan-out hub for game and participant change events.
///
/// Each topic is backed by a dedicated broadcast channel created lazily on
/// first use and garbage-collected once its last subscriber is gone.
pub struct FeedHub {
    capacity: usize,
    games: DashMap<Uuid, broadcast::Sender<RowEvent<GameRecord>>>,
    participants: DashMap<Uuid, broadcast::Sender<RowEvent<ParticipantRecord>>>,
}

impl FeedHub {
    /// Construct a hub whose per-topic channels buffer `capacity` events.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            games: DashMap::new(),
            participants: DashMap::new(),
        }
    }

    /// Subscribe to game-row events for one session.
    pub fn subscribe_game(&self, session_id: Uuid) -> FeedSubscription<GameRecord> {
        FeedSubscription {
            receiver: Self::topic_sender(&self.games, session_id, self.capacity).subscribe(),
        }
    }

    /// Subscribe to participant-row events for one session.
    pub fn subscribe_participants(&self, session_id: Uuid) -> FeedSubscription<ParticipantRecord> {
        FeedSubscription {
            receiver: Self::topic_sender(&self.participants, session_id, self.capacity).subscribe(),
        }
    }

    /// Publish a game-row event to every subscriber of the session topic.
    pub fn publish_game(&self, session_id: Uuid, event: RowEvent<GameRecord>) {
        Self::publish(&self.games, session_id, event);
    }

    /// Publish a participant-row event to every subscriber of the session
    /// topic.
    pub fn publish_participant(&self, session_id: Uuid, event: RowEvent<ParticipantRecord>) {
        Self::publish(&self.participants, session_id, event);
    }

    fn topic_sender<T: Clone>(
        topics: &DashMap<Uuid, broadcast::Sender<RowEvent<T>>>,
        session_id: Uuid,
        capacity: usize,
    ) -> broadcast::Sender<RowEvent<T>> {
        topics
            .entry(session_id)
            .or_insert_with(|| broadcast::channel(capacity).0)
            .clone()
    }

    fn publish<T: Clone>(
        topics: &DashMap<Uuid, broadcast::Sender<RowEvent<T>>>,
        session_id: Uuid,
        event: RowEvent<T>,
    ) {
        let Some(sender) = topics.get(&session_id).map(|entry| entry.value().clone()) else {
            return;
        };

        // A send error means every subscriber is gone; drop the topic so the
        // hub does not accumulate channels for finished sessions.
        if sender.send(event).is_err() {
            topics.remove_if(&session_id, |_, sender| sender.receiver_count() == 0);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;
    use crate::state::phase::GamePhase;

    fn game(session_id: Uuid) -> GameRecord {
        GameRecord {
            id: session_id,
            phase: GamePhase::Lobby,
            created_at: SystemTime::now(),
        }
    }

    #[tokio::test]
    async fn events_reach_every_topic_subscriber() {
        let hub = FeedHub::new(8);
        let session = Uuid::new_v4();
        let mut first = hub.subscribe_game(session);
        let mut second = hub.subscribe_game(session);

        hub.publish_game(
            session,
            RowEvent::Insert {
                after: game(session),
            },
        );

        assert!(matches!(first.recv().await, Ok(RowEvent::Insert { .. })));
        assert!(matches!(second.recv().await, Ok(RowEvent::Insert { .. })));
    }

    #[tokio::test]
    async fn topics_are_isolated_per_session() {
        let hub = FeedHub::new(8);
        let session = Uuid::new_v4();
        let other = Uuid::new_v4();
        let mut subscription = hub.subscribe_game(session);

        hub.publish_game(other, RowEvent::Insert { after: game(other) });
        hub.publish_game(
            session,
            RowEvent::Insert {
                after: game(session),
            },
        );

        match subscription.recv().await {
            Ok(RowEvent::Insert { after }) => assert_eq!(after.id, session),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn publishing_without_subscribers_discards_silently() {
        let hub = FeedHub::new(8);
        let session = Uuid::new_v4();
        hub.publish_game(
            session,
            RowEvent::Insert {
                after: game(session),
            },
        );

        let subscription = hub.subscribe_game(session);
        subscription.unsubscribe();
    }
}
