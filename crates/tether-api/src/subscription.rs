//! Cancelable event streams and cancel handles

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Idempotent cancellation switch returned by intercepts, exposures and
/// subscriptions. Cloning shares the switch.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    /// A handle that is not yet cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Safe to call any number of times.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once cancelled.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}

/// Consumer end of a subscription.
#[derive(Debug)]
pub struct Subscription<T> {
    rx: mpsc::Receiver<T>,
    cancel: CancelHandle,
}

/// Producer end of a subscription.
#[derive(Debug)]
pub struct SubscriptionSender<T> {
    tx: mpsc::Sender<T>,
    cancel: CancelHandle,
}

impl<T> Clone for SubscriptionSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            cancel: self.cancel.clone(),
        }
    }
}

impl<T> Subscription<T> {
    /// A subscription buffering at most `capacity` undelivered items.
    pub fn channel(capacity: usize) -> (SubscriptionSender<T>, Subscription<T>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let cancel = CancelHandle::new();
        (
            SubscriptionSender {
                tx,
                cancel: cancel.clone(),
            },
            Subscription { rx, cancel },
        )
    }

    /// Next item, `None` once the producer finished or the subscription was
    /// cancelled.
    pub async fn recv(&mut self) -> Option<T> {
        if self.cancel.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            item = self.rx.recv() => item,
        }
    }

    /// Stop the subscription. Idempotent.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }
}

impl<T> SubscriptionSender<T> {
    /// Offer an item without waiting. A full buffer drops the item, matching
    /// best-effort event delivery; returns whether it was queued.
    pub fn send(&self, item: T) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        match self.tx.try_send(item) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!("subscription buffer full, item dropped");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Queue an item, waiting for buffer space.
    pub async fn send_wait(&self, item: T) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            sent = self.tx.send(item) => sent.is_ok(),
        }
    }

    /// Whether the consumer cancelled or went away.
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled() || self.tx.is_closed()
    }

    /// Resolves once the consumer cancelled or went away.
    pub async fn closed(&self) {
        tokio::select! {
            _ = self.cancel.cancelled() => {}
            _ = self.tx.closed() => {}
        }
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cancel_twice_is_safe() {
        let (_tx, sub) = Subscription::<u32>::channel(4);
        sub.cancel();
        sub.cancel();
        assert!(sub.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancel_before_any_item_closes_stream() {
        let (tx, mut sub) = Subscription::<u32>::channel(4);
        sub.cancel();
        assert_eq!(sub.recv().await, None);
        assert!(!tx.send(1));
        assert!(tx.is_closed());
    }

    #[tokio::test]
    async fn test_full_buffer_drops() {
        let (tx, mut sub) = Subscription::channel(1);
        assert!(tx.send(1));
        assert!(!tx.send(2));
        assert_eq!(sub.recv().await, Some(1));
        drop(tx);
        assert_eq!(sub.recv().await, None);
    }
}
