//! Bus front-ends.
//!
//! - [`AsyncBus`]: enqueue and return; delivery happens in the background
//!   with bounded concurrency, retries and backpressure.
//! - [`SyncBus`]: run the pipeline inline; errors reach the caller.
//!
//! Both implement [`Bus`], which is what [`EventPublisher`] and application
//! code generic over the delivery mode depend on.

mod async_bus;
pub mod diagnostics;
mod publisher;
mod queue;
mod retry;
mod sync_bus;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::message::Message;
use crate::types::Result;

pub use async_bus::AsyncBus;
pub use diagnostics::{BusStats, Diagnostic, DiagnosticSink, TracingSink};
pub use publisher::EventPublisher;
pub use sync_bus::SyncBus;

/// Something messages can be sent to.
#[async_trait]
pub trait Bus: Send + Sync {
    async fn send<M: Message>(&self, message: M) -> Result<()>;

    async fn send_with_cancel<M: Message>(
        &self,
        message: M,
        cancel: &CancellationToken,
    ) -> Result<()>;
}

#[async_trait]
impl Bus for AsyncBus {
    async fn send<M: Message>(&self, message: M) -> Result<()> {
        AsyncBus::send(self, message).await
    }

    async fn send_with_cancel<M: Message>(
        &self,
        message: M,
        cancel: &CancellationToken,
    ) -> Result<()> {
        AsyncBus::send_with_cancel(self, message, cancel).await
    }
}

#[async_trait]
impl Bus for SyncBus {
    async fn send<M: Message>(&self, message: M) -> Result<()> {
        SyncBus::send(self, message).await
    }

    async fn send_with_cancel<M: Message>(
        &self,
        message: M,
        cancel: &CancellationToken,
    ) -> Result<()> {
        SyncBus::send_with_cancel(self, message, cancel).await
    }
}
