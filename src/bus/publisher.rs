//! Event publishing.

use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::Bus;
use crate::message::{message_name, EventMessage};
use crate::types::Result;

/// Sends events through a bus. Delivery semantics are those of the bus.
pub struct EventPublisher<B> {
    bus: Arc<B>,
}

impl<B: Bus> EventPublisher<B> {
    pub fn new(bus: Arc<B>) -> Self {
        Self { bus }
    }

    pub fn bus(&self) -> &Arc<B> {
        &self.bus
    }

    pub async fn publish<E: EventMessage>(&self, event: E) -> Result<()> {
        log_publish(&event);
        self.bus.send(event).await
    }

    pub async fn publish_with_cancel<E: EventMessage>(
        &self,
        event: E,
        cancel: &CancellationToken,
    ) -> Result<()> {
        log_publish(&event);
        self.bus.send_with_cancel(event, cancel).await
    }
}

fn log_publish<E: EventMessage>(event: &E) {
    tracing::debug!(
        message_type = message_name::<E>(),
        event_id = %event.id(),
        occurred_on_utc = %event.occurred_on_utc(),
        "event_published"
    );
}

impl<B> Clone for EventPublisher<B> {
    fn clone(&self) -> Self {
        Self {
            bus: self.bus.clone(),
        }
    }
}

impl<B> fmt::Debug for EventPublisher<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventPublisher")
            .field("bus", &std::any::type_name::<B>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::SyncBus;
    use crate::consumer::Consumer;
    use crate::message::EventMetadata;
    use crate::registry::Registry;
    use crate::types::EventId;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct OrderPlaced {
        meta: EventMetadata,
    }

    impl EventMessage for OrderPlaced {
        fn metadata(&self) -> &EventMetadata {
            &self.meta
        }
    }

    #[derive(Default)]
    struct Seen(Mutex<Vec<EventId>>);

    #[async_trait]
    impl Consumer<OrderPlaced> for Seen {
        async fn consume(&self, event: &OrderPlaced, _cancel: &CancellationToken) -> Result<()> {
            self.0.lock().unwrap().push(event.id());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_publish_passes_event_through() {
        let seen = Arc::new(Seen::default());
        let registry = Registry::builder()
            .singleton_consumer::<OrderPlaced, _>(seen.clone())
            .build();
        let publisher = EventPublisher::new(Arc::new(SyncBus::new(Arc::new(registry))));

        let meta = EventMetadata::new();
        publisher.publish(OrderPlaced { meta }).await.unwrap();

        assert_eq!(*seen.0.lock().unwrap(), vec![meta.id()]);
    }
}
