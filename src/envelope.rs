//! Envelope: one message in transit, plus its type identity and
//! cancellation signal.
//!
//! The envelope is owned by the queue between enqueue and dequeue and by the
//! processing task afterwards. It is never mutated after construction.

use std::any::{Any, TypeId};
use std::fmt;
use tokio_util::sync::CancellationToken;

use crate::message::{message_name, Message, MessageContext};

pub struct Envelope {
    message: Box<dyn Any + Send + Sync>,
    message_type: TypeId,
    message_name: &'static str,
    // Handed to consumers. A child of the caller's token when there is one,
    // otherwise a child of bus shutdown.
    cancel: CancellationToken,
    shutdown: CancellationToken,
}

impl Envelope {
    /// Wrap a message with an existing cancellation token.
    pub fn new<M: Message>(message: M, cancel: CancellationToken) -> Self {
        Self {
            message: Box::new(message),
            message_type: TypeId::of::<M>(),
            message_name: message_name::<M>(),
            shutdown: cancel.clone(),
            cancel,
        }
    }

    /// Wrap a message that is cancelled when either the bus shuts down or the
    /// caller's token is cancelled.
    ///
    /// Both sources are observed directly: a caller cancelling right after
    /// `send` returns is seen by the next [`Envelope::is_cancelled`] check.
    pub fn linked<M: Message>(
        message: M,
        shutdown: &CancellationToken,
        caller: Option<&CancellationToken>,
    ) -> Self {
        let cancel = match caller {
            Some(caller) => caller.child_token(),
            None => shutdown.child_token(),
        };
        Self {
            shutdown: shutdown.clone(),
            ..Self::new(message, cancel)
        }
    }

    pub fn message_type(&self) -> TypeId {
        self.message_type
    }

    pub fn message_name(&self) -> &'static str {
        self.message_name
    }

    /// Token passed to consumers of this message.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled() || self.shutdown.is_cancelled()
    }

    /// Resolves once the caller cancels or the bus shuts down. The consumer
    /// token is cancelled too, so running consumers observe either source.
    pub async fn cancelled(&self) {
        tokio::select! {
            _ = self.cancel.cancelled() => {}
            _ = self.shutdown.cancelled() => self.cancel.cancel(),
        }
    }

    pub fn context(&self) -> MessageContext<'_> {
        MessageContext::from_erased(self.message.as_ref(), self.message_type, self.message_name)
    }
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("message_type", &self.message_name)
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}
