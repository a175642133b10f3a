//! Change notification broadcasting
//!
//! Every register write that changes a visible value produces one
//! `ChangeEvent`. Rendering code subscribes per entity with `on_change`;
//! the streams are infinite and never replay past events.

use crate::core_canvas::crdt::LogicalClock;
use crate::core_canvas::model::{EntityId, FieldValue};
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tracing::warn;

/// Where the write that caused a change came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOrigin {
    Local,
    Remote,
}

/// One field of one entity took a new value
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub entity_id: EntityId,
    pub field: String,
    pub value: FieldValue,
    pub stamp: LogicalClock,
    pub origin: ChangeOrigin,
}

/// Fan-out of change events to any number of subscribers
#[derive(Clone)]
pub struct ChangeBroadcaster {
    tx: broadcast::Sender<ChangeEvent>,
}

impl ChangeBroadcaster {
    /// Create a broadcaster buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Emit an event; returns how many subscribers will see it
    pub fn emit(&self, event: ChangeEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.tx.subscribe()
    }

    /// Every change to every entity from now on
    ///
    /// A subscriber that falls more than `capacity` events behind skips the
    /// overflow and keeps going.
    pub fn changes(&self) -> impl Stream<Item = ChangeEvent> + Send + Unpin + 'static {
        BroadcastStream::new(self.tx.subscribe()).filter_map(|item| match item {
            Ok(event) => Some(event),
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                warn!(skipped, "change subscriber lagged, events dropped");
                None
            }
        })
    }

    /// Changes to one entity from now on
    pub fn on_change(&self, entity_id: EntityId) -> impl Stream<Item = ChangeEvent> + Send + Unpin + 'static {
        self.changes().filter(move |event| event.entity_id == entity_id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ChangeBroadcaster {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_canvas::crdt::Site;
    use std::time::Duration;

    fn event(entity_id: EntityId, counter: u64) -> ChangeEvent {
        ChangeEvent {
            entity_id,
            field: "x".to_string(),
            value: FieldValue::Number(counter as f64),
            stamp: LogicalClock::new(counter, Site::generate()),
            origin: ChangeOrigin::Local,
        }
    }

    #[tokio::test]
    async fn test_emit_without_subscribers() {
        let broadcaster = ChangeBroadcaster::new(8);
        assert_eq!(broadcaster.emit(event(EntityId::generate(), 1)), 0);
    }

    #[tokio::test]
    async fn test_on_change_filters_by_entity() {
        let broadcaster = ChangeBroadcaster::new(8);
        let watched = EntityId::generate();
        let other = EntityId::generate();
        let mut stream = broadcaster.on_change(watched);

        broadcaster.emit(event(other, 1));
        broadcaster.emit(event(watched, 2));

        let received = tokio::time::timeout(Duration::from_secs(1), stream.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.entity_id, watched);
        assert_eq!(received.value, FieldValue::Number(2.0));
    }

    #[tokio::test]
    async fn test_lagged_subscriber_skips_ahead() {
        let broadcaster = ChangeBroadcaster::new(2);
        let id = EntityId::generate();
        let mut stream = broadcaster.changes();

        for counter in 1..=5 {
            broadcaster.emit(event(id, counter));
        }

        let received = stream.next().await.unwrap();
        assert_eq!(received.value, FieldValue::Number(4.0));
        let received = stream.next().await.unwrap();
        assert_eq!(received.value, FieldValue::Number(5.0));
    }

    #[tokio::test]
    async fn test_subscriber_count() {
        let broadcaster = ChangeBroadcaster::default();
        let _a = broadcaster.subscribe();
        let _b = broadcaster.changes();
        assert_eq!(broadcaster.subscriber_count(), 2);
    }
}
