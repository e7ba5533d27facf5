//! Middleware: ordered, optionally type-targeted wrappers around consumer
//! dispatch.
//!
//! Two flavours are supported:
//!   - [`Middleware<M>`]: registered for one message type, receives `&M`.
//!   - [`Interceptor`]: registered once, runs for every message type its
//!     [`MiddlewareOptions::targets`] allow, receives a [`MessageContext`].
//!
//! Both receive a [`Next`] continuation. Calling `next.run().await` executes
//! everything after this middleware (later middleware, then the consumers);
//! not calling it short-circuits the chain.

pub mod logging;

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::any::TypeId;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::message::{message_name, Message, MessageContext};
use crate::pipeline::HandlerDispatch;
use crate::types::{Error, Result};

pub use logging::LoggingInterceptor;

/// Middleware for a single message type.
#[async_trait]
pub trait Middleware<M: Message>: Send + Sync {
    async fn invoke(&self, message: &M, next: Next<'_>) -> Result<()>;
}

#[async_trait]
impl<M, W> Middleware<M> for Arc<W>
where
    M: Message,
    W: Middleware<M> + ?Sized,
{
    async fn invoke(&self, message: &M, next: Next<'_>) -> Result<()> {
        (**self).invoke(message, next).await
    }
}

/// Middleware that can run for any message type.
#[async_trait]
pub trait Interceptor: Send + Sync {
    async fn intercept(&self, message: MessageContext<'_>, next: Next<'_>) -> Result<()>;
}

#[async_trait]
impl<I> Interceptor for Arc<I>
where
    I: Interceptor + ?Sized,
{
    async fn intercept(&self, message: MessageContext<'_>, next: Next<'_>) -> Result<()> {
        (**self).intercept(message, next).await
    }
}

/// Adapts a typed [`Middleware<M>`] into an [`Interceptor`].
pub(crate) struct TypedMiddleware<M, W> {
    inner: W,
    _message: PhantomData<fn(M)>,
}

impl<M, W> TypedMiddleware<M, W> {
    pub(crate) fn new(inner: W) -> Self {
        Self {
            inner,
            _message: PhantomData,
        }
    }
}

#[async_trait]
impl<M, W> Interceptor for TypedMiddleware<M, W>
where
    M: Message,
    W: Middleware<M>,
{
    async fn intercept(&self, message: MessageContext<'_>, next: Next<'_>) -> Result<()> {
        let typed = message.downcast_ref::<M>().ok_or_else(|| {
            Error::internal(format!(
                "middleware for {} received {}",
                message_name::<M>(),
                message.type_name()
            ))
        })?;
        self.inner.invoke(typed, next).await
    }
}

/// Ordering and targeting of a middleware registration.
///
/// Lower `order` runs first (outermost). Equal orders keep registration
/// order. An empty target set matches every message type.
#[derive(Debug, Clone, Default)]
pub struct MiddlewareOptions {
    order: i32,
    targets: Vec<(TypeId, &'static str)>,
}

impl MiddlewareOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    /// Restrict the middleware to `M` (may be called several times).
    pub fn target<M: Message>(mut self) -> Self {
        self.targets.push((TypeId::of::<M>(), message_name::<M>()));
        self
    }

    pub fn order_value(&self) -> i32 {
        self.order
    }

    pub fn target_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.targets.iter().map(|(_, name)| *name)
    }

    pub fn matches(&self, message_type: TypeId) -> bool {
        self.targets.is_empty() || self.targets.iter().any(|(id, _)| *id == message_type)
    }
}

/// Continuation handed to each middleware: "everything after me".
pub struct Next<'a> {
    chain: &'a [Arc<dyn Interceptor>],
    message: MessageContext<'a>,
    dispatch: &'a HandlerDispatch,
}

impl<'a> Next<'a> {
    pub(crate) fn new(
        chain: &'a [Arc<dyn Interceptor>],
        message: MessageContext<'a>,
        dispatch: &'a HandlerDispatch,
    ) -> Self {
        Self {
            chain,
            message,
            dispatch,
        }
    }

    pub fn message(&self) -> MessageContext<'a> {
        self.message
    }

    /// Number of middleware still to run before the consumers.
    pub fn remaining(&self) -> usize {
        self.chain.len()
    }

    /// Run the rest of the pipeline.
    pub fn run(self) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            match self.chain.split_first() {
                Some((current, rest)) => {
                    let next = Next::new(rest, self.message, self.dispatch);
                    current.intercept(self.message, next).await
                }
                None => self.dispatch.dispatch(self.message).await,
            }
        })
    }
}

impl fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("message_type", &self.message.type_name())
            .field("remaining", &self.chain.len())
            .finish()
    }
}
