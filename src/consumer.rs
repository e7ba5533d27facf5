//! Consumers: the terminal recipients of a message.

use async_trait::async_trait;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::message::{Message, MessageContext};
use crate::types::{Error, Result};

/// Handles messages of type `M`.
///
/// Returning an error fails the current delivery attempt. On the async bus
/// that attempt may be retried; on the sync bus the error reaches the caller.
#[async_trait]
pub trait Consumer<M: Message>: Send + Sync {
    async fn consume(&self, message: &M, cancel: &CancellationToken) -> Result<()>;
}

#[async_trait]
impl<M, C> Consumer<M> for Arc<C>
where
    M: Message,
    C: Consumer<M> + ?Sized,
{
    async fn consume(&self, message: &M, cancel: &CancellationToken) -> Result<()> {
        (**self).consume(message, cancel).await
    }
}

/// Consumer with the message type erased, as stored in the registry.
#[async_trait]
pub(crate) trait ErasedConsumer: Send + Sync {
    async fn consume(&self, message: MessageContext<'_>, cancel: &CancellationToken) -> Result<()>;
}

pub(crate) struct TypedConsumer<M, C> {
    inner: C,
    _message: PhantomData<fn(M)>,
}

impl<M, C> TypedConsumer<M, C> {
    pub(crate) fn new(inner: C) -> Self {
        Self {
            inner,
            _message: PhantomData,
        }
    }
}

#[async_trait]
impl<M, C> ErasedConsumer for TypedConsumer<M, C>
where
    M: Message,
    C: Consumer<M>,
{
    async fn consume(&self, message: MessageContext<'_>, cancel: &CancellationToken) -> Result<()> {
        let typed = message.downcast_ref::<M>().ok_or_else(|| {
            Error::internal(format!(
                "consumer for {} received {}",
                std::any::type_name::<M>(),
                message.type_name()
            ))
        })?;
        self.inner.consume(typed, cancel).await
    }
}
