//! Middleware pipeline builder and consumer dispatch.
//!
//! For one message type the builder selects the eligible middleware, sorts
//! them by order and terminates the chain in [`HandlerDispatch`]. The first
//! middleware in sorted order is the outermost: for A(1), B(2), C(3) that all
//! call through, the observed sequence is
//! `before A, before B, before C, consumers, after C, after B, after A`.

use futures::future::try_join_all;
use std::any::TypeId;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::consumer::ErasedConsumer;
use crate::message::MessageContext;
use crate::middleware::{Interceptor, Next};
use crate::registry::Registry;
use crate::types::{Error, Result};

/// How consumers for one message are invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// All consumers at once; completes when all complete or one fails.
    Concurrent,
    /// One after another in registration order; stops at the first failure.
    Sequential,
}

/// Terminal step of a pipeline: invoke every consumer of the message type.
pub struct HandlerDispatch {
    consumers: Vec<Arc<dyn ErasedConsumer>>,
    mode: DispatchMode,
    cancel: CancellationToken,
}

impl HandlerDispatch {
    pub(crate) async fn dispatch(&self, message: MessageContext<'_>) -> Result<()> {
        if self.consumers.is_empty() {
            return Err(Error::no_handler(message.type_name()));
        }
        if self.cancel.is_cancelled() {
            return Err(Error::cancelled("message cancelled before its consumers ran"));
        }

        match self.mode {
            DispatchMode::Concurrent => {
                try_join_all(
                    self.consumers
                        .iter()
                        .map(|consumer| consumer.consume(message, &self.cancel)),
                )
                .await?;
            }
            DispatchMode::Sequential => {
                for consumer in &self.consumers {
                    consumer.consume(message, &self.cancel).await?;
                }
            }
        }
        Ok(())
    }
}

impl fmt::Debug for HandlerDispatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerDispatch")
            .field("consumers", &self.consumers.len())
            .field("mode", &self.mode)
            .finish()
    }
}

/// A composed middleware chain for one dispatch.
///
/// Instances are resolved from the registry when the pipeline is built, so
/// scoped consumers and middleware are fresh for every build.
pub struct Pipeline {
    middleware: Vec<Arc<dyn Interceptor>>,
    dispatch: HandlerDispatch,
}

impl Pipeline {
    pub fn build(
        registry: &Registry,
        message_type: TypeId,
        mode: DispatchMode,
        cancel: &CancellationToken,
    ) -> Self {
        Self {
            middleware: registry.resolve_middleware(message_type),
            dispatch: HandlerDispatch {
                consumers: registry.resolve_consumers(message_type),
                mode,
                cancel: cancel.clone(),
            },
        }
    }

    pub fn middleware_count(&self) -> usize {
        self.middleware.len()
    }

    pub fn consumer_count(&self) -> usize {
        self.dispatch.consumers.len()
    }

    /// Run the chain for `message`. The message must be of the type the
    /// pipeline was built for.
    pub async fn run(&self, message: MessageContext<'_>) -> Result<()> {
        Next::new(&self.middleware, message, &self.dispatch).run().await
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("middleware", &self.middleware.len())
            .field("dispatch", &self.dispatch)
            .finish()
    }
}
