//! Message model.
//!
//! A message is any `Send + Sync + 'static` value; its concrete type is the
//! routing key. Events are messages that also carry an id and a UTC
//! occurrence timestamp, both fixed at construction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::any::{Any, TypeId};
use std::fmt;

use crate::types::EventId;

/// Marker for values that can travel through the bus.
///
/// Implemented for every `Any + Send + Sync` type; there is nothing to
/// implement by hand.
pub trait Message: Any + Send + Sync {}

impl<T: Any + Send + Sync> Message for T {}

/// Human-readable name of a message type (used in logs and errors).
pub fn message_name<M: Message>() -> &'static str {
    std::any::type_name::<M>()
}

/// Identity and timestamp carried by every event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    id: EventId,
    occurred_on_utc: DateTime<Utc>,
}

impl EventMetadata {
    /// Fresh id, current UTC time.
    pub fn new() -> Self {
        Self {
            id: EventId::new(),
            occurred_on_utc: Utc::now(),
        }
    }

    /// Keep a caller-supplied id and timestamp.
    pub fn with(id: EventId, occurred_on_utc: DateTime<Utc>) -> Self {
        Self {
            id,
            occurred_on_utc,
        }
    }

    pub fn id(&self) -> EventId {
        self.id
    }

    pub fn occurred_on_utc(&self) -> DateTime<Utc> {
        self.occurred_on_utc
    }
}

impl Default for EventMetadata {
    fn default() -> Self {
        Self::new()
    }
}

/// A message that records something that happened.
///
/// ```rust,ignore
/// struct OrderPlaced { meta: EventMetadata, order: String }
///
/// impl EventMessage for OrderPlaced {
///     fn metadata(&self) -> &EventMetadata { &self.meta }
/// }
/// ```
pub trait EventMessage: Message {
    fn metadata(&self) -> &EventMetadata;

    fn id(&self) -> EventId {
        self.metadata().id()
    }

    fn occurred_on_utc(&self) -> DateTime<Utc> {
        self.metadata().occurred_on_utc()
    }
}

/// Type-erased view of a message being dispatched.
///
/// Interceptors that apply to many message types receive this instead of a
/// concrete `&M`; `downcast_ref` recovers the concrete message.
#[derive(Clone, Copy)]
pub struct MessageContext<'a> {
    message: &'a (dyn Any + Send + Sync),
    type_id: TypeId,
    type_name: &'static str,
}

impl<'a> MessageContext<'a> {
    pub fn new<M: Message>(message: &'a M) -> Self {
        Self {
            message,
            type_id: TypeId::of::<M>(),
            type_name: message_name::<M>(),
        }
    }

    pub(crate) fn from_erased(
        message: &'a (dyn Any + Send + Sync),
        type_id: TypeId,
        type_name: &'static str,
    ) -> Self {
        Self {
            message,
            type_id,
            type_name,
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn is<M: Message>(&self) -> bool {
        self.type_id == TypeId::of::<M>()
    }

    pub fn downcast_ref<M: Message>(&self) -> Option<&'a M> {
        self.message.downcast_ref::<M>()
    }
}

impl fmt::Debug for MessageContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageContext")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}
