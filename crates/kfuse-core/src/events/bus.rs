//! Event bus using tokio broadcast channel
//!
//! Slow subscribers miss events rather than blocking the pipeline.

use crate::events::PipelineEvent;
use tokio::sync::broadcast;

/// Default channel capacity
const DEFAULT_CAPACITY: usize = 1024;

/// Broadcasts [`PipelineEvent`]s to any number of subscribers.
///
/// If no subscribers are listening, events are dropped.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<PipelineEvent>,
}

impl EventBus {
    /// Create a new event bus with default capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a new event bus with custom capacity
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events emitted after this call.
    pub fn subscribe(&self) -> EventSubscriber {
        EventSubscriber {
            receiver: self.sender.subscribe(),
        }
    }

    /// Emit an event to all subscribers. Never blocks.
    pub fn emit(&self, event: PipelineEvent) {
        tracing::debug!(event = event.event_type(), "Emitting pipeline event");
        let _ = self.sender.send(event);
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Subscriber to event bus
pub struct EventSubscriber {
    receiver: broadcast::Receiver<PipelineEvent>,
}

impl EventSubscriber {
    /// Receive the next event. Returns `None` once the bus is dropped.
    pub async fn recv(&mut self) -> Option<PipelineEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("Event subscriber lagged by {} events", n);
                    continue;
                }
            }
        }
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Option<PipelineEvent> {
        self.receiver.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Stage;

    #[tokio::test]
    async fn test_event_bus_basic() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe();

        bus.emit(PipelineEvent::stage_started(Some("job-1"), Stage::Ingestion));

        let received = sub.recv().await.unwrap();
        assert_eq!(received.job_id(), Some("job-1"));
        assert_eq!(received.stage(), Some(Stage::Ingestion));
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let bus = EventBus::new();
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();

        bus.emit(PipelineEvent::stage_started(None, Stage::Projection));

        let r1 = sub1.recv().await.unwrap();
        let r2 = sub2.recv().await.unwrap();
        assert_eq!(r1.event_type(), r2.event_type());
    }

    #[test]
    fn test_no_subscribers_no_panic() {
        let bus = EventBus::new();
        bus.emit(PipelineEvent::stage_started(None, Stage::Projection));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_subscriber_count() {
        let bus = EventBus::new();
        let _s1 = bus.subscribe();
        let _s2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
    }
}
