//! Asynchronous bus: bounded queue, concurrency-limited dispatch loop,
//! per-message retry.
//!
//! ```text
//!  send() ──admission──▶ MessageQueue ──▶ dispatch loop ──slot──▶ task
//!                                                                 │
//!                                           RetryController ◀─────┘
//!                                                  │
//!                                    Pipeline (middleware → consumers)
//! ```
//!
//! `send` returns once the message is queued. Consumer failures never reach
//! the sender; they are retried and reported to the [`DiagnosticSink`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::diagnostics::{BusStats, Counters, Diagnostic, DiagnosticSink, TracingSink};
use super::queue::MessageQueue;
use super::retry::{Outcome, RetryController};
use crate::envelope::Envelope;
use crate::message::{message_name, Message};
use crate::registry::Registry;
use crate::types::{Error, ProcessingOptions, Result};

struct Shared {
    registry: Arc<Registry>,
    options: ProcessingOptions,
    queue: MessageQueue,
    limiter: Arc<Semaphore>,
    shutdown: CancellationToken,
    disposed: AtomicBool,
    sink: Arc<dyn DiagnosticSink>,
    counters: Counters,
}

impl Shared {
    fn in_flight(&self) -> usize {
        self.options
            .max_concurrent_messages
            .saturating_sub(self.limiter.available_permits())
    }

    async fn process(&self, envelope: Envelope) {
        let outcome = RetryController::new(&self.registry, &self.options, &self.sink)
            .run(&envelope)
            .await;

        Counters::add(&self.counters.retries, u64::from(outcome.retries()));
        let counter = match outcome {
            Outcome::Delivered { .. } => &self.counters.delivered,
            Outcome::Cancelled { .. } => &self.counters.cancelled,
            Outcome::Abandoned { .. } => &self.counters.abandoned,
            Outcome::Failed { .. } => &self.counters.failed,
        };
        Counters::incr(counter);
    }
}

/// Queue-backed bus with bounded concurrency and retries.
///
/// Owned by the composition root. Call [`AsyncBus::shutdown`] before
/// dropping it to give the dispatch loop its grace period; dropping without
/// shutdown only signals cancellation.
pub struct AsyncBus {
    shared: Arc<Shared>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl AsyncBus {
    /// Create the bus and start its dispatch loop. Must be called from
    /// within a tokio runtime.
    pub fn new(registry: Arc<Registry>, options: ProcessingOptions) -> Result<Self> {
        Self::with_sink(registry, options, Arc::new(TracingSink))
    }

    pub fn with_sink(
        registry: Arc<Registry>,
        options: ProcessingOptions,
        sink: Arc<dyn DiagnosticSink>,
    ) -> Result<Self> {
        options.validate()?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::internal(format!("AsyncBus requires a tokio runtime: {e}")))?;

        let shared = Arc::new(Shared {
            registry,
            queue: MessageQueue::new(options.max_queue_size),
            limiter: Arc::new(Semaphore::new(options.max_concurrent_messages)),
            shutdown: CancellationToken::new(),
            disposed: AtomicBool::new(false),
            sink,
            counters: Counters::default(),
            options,
        });
        let dispatcher = runtime.spawn(dispatch_loop(shared.clone()));

        Ok(Self {
            shared,
            dispatcher: Mutex::new(Some(dispatcher)),
        })
    }

    /// Queue `message` for delivery. Waits while the queue is full.
    pub async fn send<M: Message>(&self, message: M) -> Result<()> {
        self.enqueue(message, None).await
    }

    /// Like [`send`](Self::send); cancelling `cancel` aborts the admission
    /// wait, or the delivery if the message is already queued or running.
    pub async fn send_with_cancel<M: Message>(
        &self,
        message: M,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.enqueue(message, Some(cancel)).await
    }

    async fn enqueue<M: Message>(
        &self,
        message: M,
        caller: Option<&CancellationToken>,
    ) -> Result<()> {
        let shared = &self.shared;
        if shared.disposed.load(Ordering::Acquire) {
            return Err(Error::Disposed);
        }
        if caller.is_some_and(CancellationToken::is_cancelled) {
            return Err(Error::cancelled("send cancelled before admission"));
        }

        let message_type = message_name::<M>();
        let envelope = Envelope::linked(message, &shared.shutdown, caller);

        if shared.queue.is_full() {
            tracing::debug!(
                message_type,
                queue_length = shared.queue.len(),
                max_queue_size = shared.options.max_queue_size,
                "send_backpressure"
            );
        }
        shared
            .queue
            .wait_for_space(&envelope, shared.options.admission_poll_interval)
            .await
            .map_err(|e| {
                if shared.disposed.load(Ordering::Acquire) {
                    Error::Disposed
                } else {
                    e
                }
            })?;

        shared.queue.enqueue(envelope);
        Counters::incr(&shared.counters.enqueued);
        tracing::trace!(
            message_type,
            queue_length = shared.queue.len(),
            "message_enqueued"
        );
        Ok(())
    }

    /// Signal shutdown and wait up to the grace period for the dispatch loop
    /// to exit. Queued messages are not drained; running pipelines observe
    /// cancellation but are not awaited.
    pub async fn shutdown(&self) {
        if self.shared.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::info!(
            queue_length = self.shared.queue.len(),
            in_flight = self.shared.in_flight(),
            "bus_shutdown_requested"
        );
        self.shared.shutdown.cancel();

        let dispatcher = self
            .dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(dispatcher) = dispatcher else {
            return;
        };

        match tokio::time::timeout(self.shared.options.shutdown_grace_period, dispatcher).await {
            Ok(Ok(())) => tracing::debug!("dispatch_loop_joined"),
            Ok(Err(e)) => self.shared.sink.record(&Diagnostic::DispatchError {
                error: e.to_string(),
            }),
            Err(_) => tracing::warn!(
                grace_period_ms = self.shared.options.shutdown_grace_period.as_millis() as u64,
                "dispatch_loop_shutdown_timed_out"
            ),
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.disposed.load(Ordering::Acquire)
    }

    pub fn options(&self) -> &ProcessingOptions {
        &self.shared.options
    }

    pub fn registry(&self) -> &Registry {
        &self.shared.registry
    }

    pub fn queue_len(&self) -> usize {
        self.shared.queue.len()
    }

    /// Pipelines currently holding a concurrency slot.
    pub fn in_flight(&self) -> usize {
        self.shared.in_flight()
    }

    pub fn stats(&self) -> BusStats {
        self.shared
            .counters
            .snapshot(self.shared.queue.len(), self.shared.in_flight())
    }
}

impl Drop for AsyncBus {
    fn drop(&mut self) {
        self.shared.disposed.store(true, Ordering::Release);
        self.shared.shutdown.cancel();
    }
}

impl std::fmt::Debug for AsyncBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncBus")
            .field("queue", &self.shared.queue)
            .field("in_flight", &self.shared.in_flight())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

/// Single coordinator: wait for work, take one envelope, take one slot,
/// hand both to a task. Never waits on a pipeline itself.
async fn dispatch_loop(shared: Arc<Shared>) {
    tracing::info!(
        max_concurrent_messages = shared.options.max_concurrent_messages,
        max_queue_size = shared.options.max_queue_size,
        "dispatch_loop_started"
    );

    loop {
        tokio::select! {
            biased;
            _ = shared.shutdown.cancelled() => break,
            _ = shared.queue.wait_for_work() => {}
        }

        let Some(envelope) = shared.queue.try_dequeue() else {
            shared.sink.record(&Diagnostic::DispatchError {
                error: "work signalled but queue was empty".to_string(),
            });
            continue;
        };

        let slot = tokio::select! {
            biased;
            _ = shared.shutdown.cancelled() => break,
            permit = shared.limiter.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(e) => {
                    shared.sink.record(&Diagnostic::DispatchError { error: e.to_string() });
                    break;
                }
            },
        };

        let task_shared = shared.clone();
        tokio::spawn(async move {
            // Released when processing ends, however it ends.
            let _slot = slot;
            task_shared.process(envelope).await;
        });
    }

    tracing::info!(
        queue_length = shared.queue.len(),
        in_flight = shared.in_flight(),
        "dispatch_loop_stopped"
    );
}
