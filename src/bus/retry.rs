//! Per-message retry loop for the async bus.

use std::sync::Arc;

use super::diagnostics::{Diagnostic, DiagnosticSink};
use crate::envelope::Envelope;
use crate::pipeline::{DispatchMode, Pipeline};
use crate::registry::Registry;
use crate::types::{Error, ProcessingOptions};

/// Final result of processing one envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Delivered { attempts: u32 },
    Cancelled { attempts: u32 },
    Abandoned { attempts: u32 },
    Failed { attempts: u32 },
}

impl Outcome {
    pub(crate) fn attempts(&self) -> u32 {
        match *self {
            Outcome::Delivered { attempts }
            | Outcome::Cancelled { attempts }
            | Outcome::Abandoned { attempts }
            | Outcome::Failed { attempts } => attempts,
        }
    }

    /// Attempts that were followed by another attempt.
    pub(crate) fn retries(&self) -> u32 {
        self.attempts().saturating_sub(1)
    }
}

/// Runs the full pipeline for an envelope until it succeeds, is cancelled,
/// or fails for good.
///
/// Each attempt builds a fresh pipeline, so scoped consumers and middleware
/// are new per attempt. With `max_retries = k` a persistently failing
/// consumer runs `k + 1` times.
pub(crate) struct RetryController<'a> {
    registry: &'a Registry,
    options: &'a ProcessingOptions,
    sink: &'a Arc<dyn DiagnosticSink>,
}

impl<'a> RetryController<'a> {
    pub(crate) fn new(
        registry: &'a Registry,
        options: &'a ProcessingOptions,
        sink: &'a Arc<dyn DiagnosticSink>,
    ) -> Self {
        Self {
            registry,
            options,
            sink,
        }
    }

    pub(crate) async fn run(&self, envelope: &Envelope) -> Outcome {
        let message_type = envelope.message_name();
        let mut failures: u32 = 0;

        loop {
            let attempts = failures + 1;
            if envelope.is_cancelled() {
                return Outcome::Cancelled {
                    attempts: failures,
                };
            }

            let pipeline = Pipeline::build(
                self.registry,
                envelope.message_type(),
                DispatchMode::Concurrent,
                envelope.cancellation(),
            );
            let result = tokio::select! {
                biased;
                _ = envelope.cancelled() => {
                    Err(Error::cancelled("message cancelled during processing"))
                }
                result = pipeline.run(envelope.context()) => result,
            };

            let err = match result {
                Ok(()) => {
                    tracing::trace!(message_type, attempts, "message_delivered");
                    return Outcome::Delivered { attempts };
                }
                Err(e) if e.is_cancelled() || envelope.is_cancelled() => {
                    tracing::debug!(message_type, attempts, "message_processing_cancelled");
                    return Outcome::Cancelled { attempts };
                }
                Err(e) => e,
            };

            if !self.options.swallow_errors || !err.is_retryable() {
                self.sink.record(&Diagnostic::Failed {
                    message_type,
                    code: err.code(),
                    error: err.to_string(),
                });
                return Outcome::Failed { attempts };
            }

            failures += 1;
            if failures > self.options.max_retries {
                self.sink.record(&Diagnostic::Abandoned {
                    message_type,
                    attempts,
                    error: err.to_string(),
                });
                return Outcome::Abandoned { attempts };
            }

            self.sink.record(&Diagnostic::Retrying {
                message_type,
                attempt: failures,
                max_retries: self.options.max_retries,
                error: err.to_string(),
            });

            tokio::select! {
                _ = envelope.cancelled() => {
                    tracing::debug!(message_type, attempts, "message_retry_cancelled");
                    return Outcome::Cancelled { attempts };
                }
                _ = tokio::time::sleep(self.options.retry_delay) => {}
            }
        }
    }
}
