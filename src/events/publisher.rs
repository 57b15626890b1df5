use crate::events::types::{EventLevel, PipelineEvent};
use tokio::sync::broadcast;

/// Broadcast publisher for pipeline lifecycle events.
///
/// # Examples
///
/// ```
/// use scribe_core::events::{EventLevel, EventPublisher};
///
/// let publisher = EventPublisher::new(16);
/// let mut rx = publisher.subscribe();
/// publisher.emit("workflow_started", "run 1", EventLevel::Status);
///
/// let event = tokio_test::block_on(rx.recv()).unwrap();
/// assert_eq!(event.kind, "workflow_started");
/// ```
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<PipelineEvent>,
}

impl EventPublisher {
    /// Create a new publisher with the specified channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event, returning how many subscribers received it.
    /// Zero subscribers is not an error; events are emitted regardless of
    /// whether anyone is listening.
    pub fn publish(&self, event: PipelineEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Convenience constructor-and-publish for the common case.
    pub fn emit(
        &self,
        kind: impl Into<String>,
        message: impl Into<String>,
        level: EventLevel,
    ) -> usize {
        self.publish(PipelineEvent::new(kind, message, level))
    }

    /// Subscribe to the event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.sender.subscribe()
    }

    /// Number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_subscriber() {
        let publisher = EventPublisher::new(16);
        let mut rx = publisher.subscribe();

        let reached = publisher.emit("workflow_started", "run 1", EventLevel::Status);
        assert_eq!(reached, 1);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, "workflow_started");
        assert_eq!(event.level, EventLevel::Status);
    }

    #[tokio::test]
    async fn publish_without_subscribers_reaches_nobody() {
        let publisher = EventPublisher::new(16);
        assert_eq!(publisher.emit("noop", "nobody listening", EventLevel::Info), 0);
        assert_eq!(publisher.subscriber_count(), 0);
    }
}
