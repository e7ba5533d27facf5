//! Composition root helper.
//!
//! Collects registrations and options, then produces either an async or a
//! sync bus together with an [`EventPublisher`] over it.
//!
//! ```rust,ignore
//! let messaging = MessagingBuilder::new()
//!     .configure(|o| o.max_retries = 5)
//!     .register(|r| r.consumer::<OrderPlaced, _, _>(|| OrderPlacedConsumer))
//!     .build_async()?;
//!
//! messaging.bus().send(OrderPlaced::new()).await?;
//! messaging.bus().shutdown().await;
//! ```

use std::fmt;
use std::sync::Arc;

use crate::bus::{AsyncBus, Bus, DiagnosticSink, EventPublisher, SyncBus, TracingSink};
use crate::registry::{MessagingModule, RegistryBuilder};
use crate::types::{Config, ProcessingOptions, Result};

pub struct MessagingBuilder {
    registry: RegistryBuilder,
    options: ProcessingOptions,
    sink: Arc<dyn DiagnosticSink>,
}

impl MessagingBuilder {
    pub fn new() -> Self {
        Self {
            registry: RegistryBuilder::new(),
            options: ProcessingOptions::default(),
            sink: Arc::new(TracingSink),
        }
    }

    /// Start from a loaded [`Config`].
    pub fn from_config(config: &Config) -> Self {
        Self::new().with_options(config.processing.clone())
    }

    pub fn with_options(mut self, options: ProcessingOptions) -> Self {
        self.options = options;
        self
    }

    /// Adjust the current options in place.
    pub fn configure(mut self, f: impl FnOnce(&mut ProcessingOptions)) -> Self {
        f(&mut self.options);
        self
    }

    /// Diagnostic sink for the async bus. Ignored by [`build_sync`](Self::build_sync).
    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn module(mut self, module: &dyn MessagingModule) -> Self {
        self.registry = self.registry.module(module);
        self
    }

    /// Add registrations directly.
    pub fn register(mut self, f: impl FnOnce(RegistryBuilder) -> RegistryBuilder) -> Self {
        self.registry = f(self.registry);
        self
    }

    /// Add every module submitted with [`submit_module!`](crate::submit_module).
    #[cfg(feature = "discovery")]
    pub fn discover(mut self) -> Self {
        self.registry = self.registry.discover();
        self
    }

    /// Build the queue-backed bus and start its dispatch loop.
    pub fn build_async(self) -> Result<Messaging<AsyncBus>> {
        let registry = Arc::new(self.registry.build());
        let bus = AsyncBus::with_sink(registry, self.options, self.sink)?;
        Ok(Messaging::new(bus))
    }

    pub fn build_sync(self) -> Messaging<SyncBus> {
        let registry = Arc::new(self.registry.build());
        Messaging::new(SyncBus::new(registry))
    }
}

impl Default for MessagingBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MessagingBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessagingBuilder")
            .field("registry", &self.registry)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// A built bus and its publisher.
#[derive(Debug)]
pub struct Messaging<B> {
    bus: Arc<B>,
    publisher: EventPublisher<B>,
}

impl<B: Bus> Messaging<B> {
    fn new(bus: B) -> Self {
        let bus = Arc::new(bus);
        Self {
            publisher: EventPublisher::new(bus.clone()),
            bus,
        }
    }

    pub fn bus(&self) -> &Arc<B> {
        &self.bus
    }

    pub fn publisher(&self) -> &EventPublisher<B> {
        &self.publisher
    }

    pub fn into_parts(self) -> (Arc<B>, EventPublisher<B>) {
        (self.bus, self.publisher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumer::Consumer;
    use crate::types::Error;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_util::sync::CancellationToken;

    struct Tick;

    #[derive(Default)]
    struct Ticks(AtomicUsize);

    #[async_trait]
    impl Consumer<Tick> for Ticks {
        async fn consume(&self, _message: &Tick, _cancel: &CancellationToken) -> crate::Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_build_sync_delivers() {
        let ticks = Arc::new(Ticks::default());
        let consumer = ticks.clone();
        let messaging = MessagingBuilder::new()
            .register(move |r| r.singleton_consumer::<Tick, _>(consumer))
            .build_sync();

        messaging.bus().send(Tick).await.unwrap();
        assert_eq!(ticks.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_build_async_validates_options() {
        let err = MessagingBuilder::new()
            .configure(|o| o.max_queue_size = 0)
            .build_async()
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_from_config() {
        let config = Config::from_json_str(r#"{"processing": {"max_retries": 7}}"#).unwrap();
        let messaging = MessagingBuilder::from_config(&config).build_async().unwrap();

        assert_eq!(messaging.bus().options().max_retries, 7);
        messaging.bus().shutdown().await;
    }
}
