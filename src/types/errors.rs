//! Bus error types.
//!
//! All errors use `thiserror` for automatic Error trait derivation. The
//! variants mirror how a failure is treated by the delivery engine. A
//! missing consumer, a registry type mismatch and cancellation are final;
//! anything else raised while processing a message is worth another attempt.

use thiserror::Error;

/// Boxed error produced by user handlers and middleware.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Bus result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error enum for the message bus.
#[derive(Error, Debug)]
pub enum Error {
    /// No consumer registered for the dispatched message type.
    #[error("no consumer registered for message type {message_type}")]
    NoHandler { message_type: &'static str },

    /// A consumer or middleware failed while processing a message.
    #[error("handler failed: {0}")]
    Handler(#[source] BoxError),

    /// The send or processing attempt was cancelled.
    #[error("operation cancelled: {0}")]
    Cancelled(String),

    /// The bus has been shut down.
    #[error("bus has been disposed")]
    Disposed,

    /// Invalid options or registration.
    #[error("validation error: {0}")]
    Validation(String),

    /// Internal invariant broken (e.g. type mismatch in the erased registry).
    /// Never retried.
    #[error("internal error: {0}")]
    Internal(String),

    /// Serialization/deserialization errors.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Stable error code used in diagnostics.
    pub fn code(&self) -> &'static str {
        match self {
            Error::NoHandler { .. } => "NO_HANDLER",
            Error::Handler(_) => "HANDLER_FAILED",
            Error::Cancelled(_) => "CANCELLED",
            Error::Disposed => "DISPOSED",
            Error::Validation(_) => "INVALID_ARGUMENT",
            Error::Internal(_) => "INTERNAL",
            Error::Serialization(_) => "SERIALIZATION",
            Error::Io(_) => "IO",
        }
    }

    /// Whether a later attempt could succeed. Errors raised by consumers or
    /// middleware are retryable whatever variant `?` converted them into.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Error::NoHandler { .. } | Error::Cancelled(_) | Error::Disposed | Error::Internal(_)
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled(_))
    }
}

// Convenience constructors
impl Error {
    pub fn handler(err: impl Into<BoxError>) -> Self {
        Self::Handler(err.into())
    }

    pub fn no_handler(message_type: &'static str) -> Self {
        Self::NoHandler { message_type }
    }

    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::Cancelled(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
