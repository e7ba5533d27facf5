//! Delivery diagnostics and bus statistics.
//!
//! The async bus never surfaces consumer failures to the sender. Retries,
//! abandonment and unexpected loop errors are reported to a
//! [`DiagnosticSink`] instead; [`TracingSink`] is the default.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// A notable event in the life of an asynchronously delivered message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// An attempt failed and another will follow after the retry delay.
    Retrying {
        message_type: &'static str,
        attempt: u32,
        max_retries: u32,
        error: String,
    },
    /// Retries are exhausted; the message is dropped.
    Abandoned {
        message_type: &'static str,
        attempts: u32,
        error: String,
    },
    /// The failure is not retried (configuration error, or errors are not
    /// swallowed); the message is dropped.
    Failed {
        message_type: &'static str,
        code: &'static str,
        error: String,
    },
    /// The dispatch loop itself hit an unexpected error.
    DispatchError { error: String },
}

/// Receives delivery diagnostics.
#[cfg_attr(test, mockall::automock)]
pub trait DiagnosticSink: Send + Sync {
    fn record(&self, diagnostic: &Diagnostic);
}

/// Writes diagnostics to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn record(&self, diagnostic: &Diagnostic) {
        match diagnostic {
            Diagnostic::Retrying {
                message_type,
                attempt,
                max_retries,
                error,
            } => tracing::warn!(
                message_type,
                attempt,
                max_retries,
                error = %error,
                "message_retry_scheduled"
            ),
            Diagnostic::Abandoned {
                message_type,
                attempts,
                error,
            } => tracing::error!(
                message_type,
                attempts,
                error = %error,
                "message_abandoned"
            ),
            Diagnostic::Failed {
                message_type,
                code,
                error,
            } => tracing::error!(message_type, code, error = %error, "message_failed"),
            Diagnostic::DispatchError { error } => {
                tracing::error!(error = %error, "dispatch_loop_error")
            }
        }
    }
}

/// Snapshot of async bus counters.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusStats {
    pub messages_enqueued: u64,
    pub messages_delivered: u64,
    pub retries: u64,
    pub messages_abandoned: u64,
    pub messages_failed: u64,
    pub messages_cancelled: u64,
    pub queue_length: usize,
    pub in_flight: usize,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub(crate) enqueued: AtomicU64,
    pub(crate) delivered: AtomicU64,
    pub(crate) retries: AtomicU64,
    pub(crate) abandoned: AtomicU64,
    pub(crate) failed: AtomicU64,
    pub(crate) cancelled: AtomicU64,
}

impl Counters {
    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, queue_length: usize, in_flight: usize) -> BusStats {
        BusStats {
            messages_enqueued: self.enqueued.load(Ordering::Relaxed),
            messages_delivered: self.delivered.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            messages_abandoned: self.abandoned.load(Ordering::Relaxed),
            messages_failed: self.failed.load(Ordering::Relaxed),
            messages_cancelled: self.cancelled.load(Ordering::Relaxed),
            queue_length,
            in_flight,
        }
    }
}
