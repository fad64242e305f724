//! Event publishing/subscription abstraction (mechanics only).
//!
//! The bus distributes trip notifications (dispatched, delivered, ...) to
//! whatever delivers them onward (SMS/WhatsApp gateways, dashboards).
//!
//! - **Transport-agnostic**: a bounded broadcast channel here; brokers elsewhere.
//! - **Best-effort**: publishers never wait on subscribers, and a failed
//!   publish must not undo the state change that produced the event.
//! - **At-least-once**: a retried status update may publish twice, so
//!   consumers must tolerate duplicates.

use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};

/// One subscriber's view of a bus: every message published after it was
/// created, in publish order. A subscriber that falls more than the bus
/// capacity behind skips the oldest messages.
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: broadcast::Receiver<M>,
    skipped: u64,
}

impl<M: Clone> Subscription<M> {
    pub fn new(receiver: broadcast::Receiver<M>) -> Self {
        Self {
            receiver,
            skipped: 0,
        }
    }

    /// Next message, waiting for one. `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<M> {
        loop {
            match self.receiver.recv().await {
                Ok(message) => return Some(message),
                Err(RecvError::Lagged(n)) => self.skipped += n,
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Everything queued right now, without waiting.
    pub fn drain(&mut self) -> Vec<M> {
        let mut out = Vec::new();
        loop {
            match self.receiver.try_recv() {
                Ok(message) => out.push(message),
                Err(TryRecvError::Lagged(n)) => self.skipped += n,
                Err(TryRecvError::Empty | TryRecvError::Closed) => return out,
            }
        }
    }

    /// Messages lost to lag so far.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// The raw receiver, for adapting into a stream.
    pub fn into_receiver(self) -> broadcast::Receiver<M> {
        self.receiver
    }
}

/// Publish/subscribe transport for notifications.
///
/// `publish` returns as soon as the message is handed off.
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn publish(&self, message: M) -> Result<(), Self::Error>;

    fn subscribe(&self) -> Subscription<M>;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        (**self).publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }
}
