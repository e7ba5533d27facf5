//! FIFO of pending envelopes with a work signal and soft admission control.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};

use crate::envelope::Envelope;
use crate::types::{Error, Result};

/// Multi-producer queue drained by a single dispatch loop.
///
/// `pending` carries one permit per queued envelope so the loop can sleep
/// until there is work. Admission is soft: a sender that observes free space
/// enqueues without reserving it, so concurrent senders may briefly push the
/// length past `capacity`.
pub(crate) struct MessageQueue {
    items: Mutex<VecDeque<Envelope>>,
    pending: Semaphore,
    space: Notify,
    capacity: usize,
}

impl MessageQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            pending: Semaphore::new(0),
            space: Notify::new(),
            capacity,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.items.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub(crate) fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    pub(crate) fn enqueue(&self, envelope: Envelope) {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(envelope);
        self.pending.add_permits(1);
    }

    pub(crate) fn try_dequeue(&self) -> Option<Envelope> {
        let envelope = self
            .items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        if envelope.is_some() {
            self.space.notify_waiters();
        }
        envelope
    }

    /// Wait until at least one envelope has been enqueued since the last call.
    pub(crate) async fn wait_for_work(&self) {
        // The semaphore is never closed.
        if let Ok(permit) = self.pending.acquire().await {
            permit.forget();
        }
    }

    /// Wait until the queue has room for `envelope`, polling at `poll` in
    /// case a dequeue notification is missed. Fails once the envelope is
    /// cancelled.
    pub(crate) async fn wait_for_space(&self, envelope: &Envelope, poll: Duration) -> Result<()> {
        if !self.is_full() {
            return Ok(());
        }

        loop {
            tokio::select! {
                _ = envelope.cancelled() => {
                    return Err(Error::cancelled("send cancelled while waiting for queue space"));
                }
                _ = self.space.notified() => {}
                _ = tokio::time::sleep(poll) => {}
            }
            if !self.is_full() {
                return Ok(());
            }
        }
    }
}

impl std::fmt::Debug for MessageQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageQueue")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    struct Item(u32);

    fn envelope(n: u32) -> Envelope {
        Envelope::new(Item(n), CancellationToken::new())
    }

    fn value(env: &Envelope) -> u32 {
        env.context().downcast_ref::<Item>().map(|i| i.0).unwrap()
    }

    #[test]
    fn test_fifo_order() {
        let queue = MessageQueue::new(10);
        for n in 0..3 {
            queue.enqueue(envelope(n));
        }
        assert_eq!(queue.len(), 3);

        let drained: Vec<u32> = std::iter::from_fn(|| queue.try_dequeue())
            .map(|e| value(&e))
            .collect();
        assert_eq!(drained, vec![0, 1, 2]);
        assert!(queue.try_dequeue().is_none());
    }

    #[tokio::test]
    async fn test_wait_for_work_wakes_on_enqueue() {
        let queue = Arc::new(MessageQueue::new(10));
        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.wait_for_work().await })
        };

        tokio::task::yield_now().await;
        queue.enqueue(envelope(1));
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_wait_for_space_returns_when_not_full() {
        let queue = MessageQueue::new(2);
        queue.enqueue(envelope(1));
        queue
            .wait_for_space(&envelope(2), Duration::from_millis(10))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_wait_for_space_unblocks_after_dequeue() {
        let queue = Arc::new(MessageQueue::new(1));
        queue.enqueue(envelope(1));
        assert!(queue.is_full());

        let sender = {
            let queue = queue.clone();
            tokio::spawn(async move {
                queue
                    .wait_for_space(&envelope(2), Duration::from_millis(10))
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!sender.is_finished());

        queue.try_dequeue();
        let admitted = tokio::time::timeout(Duration::from_secs(1), sender)
            .await
            .unwrap()
            .unwrap();
        assert!(admitted.is_ok());
    }

    #[tokio::test]
    async fn test_wait_for_space_cancelled() {
        let queue = MessageQueue::new(1);
        queue.enqueue(envelope(1));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = queue
            .wait_for_space(&Envelope::new(Item(2), cancel), Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }
}
