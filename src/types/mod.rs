//! Core types for the message bus.
//!
//! - **IDs**: Strongly-typed identifiers (EventId)
//! - **Errors**: Bus error taxonomy with thiserror derives
//! - **Config**: Processing options and observability configuration

mod config;
mod errors;
mod ids;

pub use config::{Config, ObservabilityConfig, ProcessingOptions};
pub use errors::{BoxError, Error, Result};
pub use ids::EventId;
