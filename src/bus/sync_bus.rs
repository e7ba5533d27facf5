//! Synchronous bus: run the pipeline inline and report the result.

use std::any::TypeId;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::message::{message_name, Message, MessageContext};
use crate::pipeline::{DispatchMode, Pipeline};
use crate::registry::Registry;
use crate::types::{Error, Result};

/// Runs consumers one after another, in registration order, before `send`
/// returns. No queue, no concurrency limit, no retries; the first error is
/// returned to the caller.
#[derive(Debug, Clone)]
pub struct SyncBus {
    registry: Arc<Registry>,
}

impl SyncBus {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub async fn send<M: Message>(&self, message: M) -> Result<()> {
        self.send_with_cancel(message, &CancellationToken::new())
            .await
    }

    pub async fn send_with_cancel<M: Message>(
        &self,
        message: M,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(Error::cancelled("send cancelled before dispatch"));
        }

        let pipeline = Pipeline::build(
            &self.registry,
            TypeId::of::<M>(),
            DispatchMode::Sequential,
            cancel,
        );
        tracing::trace!(
            message_type = message_name::<M>(),
            middleware = pipeline.middleware_count(),
            consumers = pipeline.consumer_count(),
            "sync_dispatch"
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::cancelled("send cancelled during dispatch")),
            result = pipeline.run(MessageContext::new(&message)) => result,
        }
    }
}
