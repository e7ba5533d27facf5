//! Structured logging around each pipeline run.

use async_trait::async_trait;
use chrono::Utc;
use std::time::Instant;

use super::{Interceptor, Next};
use crate::message::MessageContext;
use crate::types::Result;

/// Logs when a message enters the pipeline and how long the rest of the
/// chain took. Register it with a low order to time everything after it.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingInterceptor;

#[async_trait]
impl Interceptor for LoggingInterceptor {
    async fn intercept(&self, message: MessageContext<'_>, next: Next<'_>) -> Result<()> {
        let started = Instant::now();
        tracing::info!(
            message_type = message.type_name(),
            started_at = %Utc::now(),
            "message_pipeline_started"
        );

        let result = next.run().await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(()) => tracing::info!(
                message_type = message.type_name(),
                elapsed_ms,
                "message_pipeline_completed"
            ),
            Err(e) => tracing::warn!(
                message_type = message.type_name(),
                elapsed_ms,
                error = %e,
                "message_pipeline_failed"
            ),
        }

        result
    }
}
