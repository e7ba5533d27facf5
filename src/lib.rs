//! # membus - In-process message bus
//!
//! Typed messages are routed to every consumer registered for their exact
//! type, through an ordered chain of middleware:
//! - Async delivery: bounded queue, cooperative backpressure, bounded
//!   concurrency, per-message retries with delay
//! - Sync delivery: consumers run inline, in registration order
//! - Middleware ordering and per-type targeting
//! - Scoped (per-dispatch) or singleton consumers and middleware
//! - Cancellation linked from the caller and from bus shutdown
//!
//! ## Architecture
//!
//! ```text
//!   send(msg) ──▶ Envelope ──▶ MessageQueue ──▶ dispatch loop
//!                                                   │ (slot)
//!                                                   ▼
//!                                            RetryController
//!                                                   │
//!              ┌────────────── Pipeline ───────────┴───────────┐
//!              │ mw(order 1) ▶ mw(order 2) ▶ … ▶ HandlerDispatch │
//!              └───────────────────────────────────────────────┘
//! ```
//!
//! The sync bus enters the pipeline directly.

// Enforce strict safety at compile time
#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

pub mod builder;
pub mod bus;
pub mod consumer;
pub mod envelope;
pub mod message;
pub mod middleware;
pub mod pipeline;
pub mod registry;
pub mod types;

// Internal utilities
pub mod observability;

#[cfg(feature = "discovery")]
#[doc(hidden)]
pub use inventory;

pub use builder::{Messaging, MessagingBuilder};
pub use bus::{
    AsyncBus, Bus, BusStats, Diagnostic, DiagnosticSink, EventPublisher, SyncBus, TracingSink,
};
pub use consumer::Consumer;
pub use message::{EventMessage, EventMetadata, Message, MessageContext};
pub use middleware::{Interceptor, LoggingInterceptor, Middleware, MiddlewareOptions, Next};
pub use registry::{Lifetime, MessagingModule, Registry, RegistryBuilder};
pub use types::{BoxError, Config, Error, EventId, ProcessingOptions, Result};
pub use tokio_util::sync::CancellationToken;
