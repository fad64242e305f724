//! Bounded fan-out bus over a tokio broadcast channel.

use std::convert::Infallible;

use tokio::sync::broadcast;

use crate::bus::{EventBus, Subscription};

/// Default per-subscriber buffer.
pub const DEFAULT_CAPACITY: usize = 256;

/// Process-local pub/sub bus.
///
/// Publishing never blocks. With no subscribers the message is dropped, and a
/// subscriber more than `capacity` messages behind loses the oldest ones.
#[derive(Debug, Clone)]
pub struct BroadcastBus<M> {
    sender: broadcast::Sender<M>,
}

impl<M: Clone> BroadcastBus<M> {
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl<M: Clone> Default for BroadcastBus<M> {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl<M> EventBus<M> for BroadcastBus<M>
where
    M: Clone + Send + Sync + 'static,
{
    type Error = Infallible;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        // Err only means nobody is listening.
        let _ = self.sender.send(message);
        Ok(())
    }

    fn subscribe(&self) -> Subscription<M> {
        Subscription::new(self.sender.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_subscriber_receives_each_message() {
        let bus = BroadcastBus::with_capacity(8);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.publish("dispatched".to_string()).unwrap();

        assert_eq!(a.drain(), vec!["dispatched".to_string()]);
        assert_eq!(b.drain(), vec!["dispatched".to_string()]);
    }

    #[test]
    fn publishing_without_subscribers_is_not_an_error() {
        let bus = BroadcastBus::with_capacity(4);
        assert!(bus.publish(1u32).is_ok());

        let mut late = bus.subscribe();
        assert!(late.drain().is_empty());

        drop(late);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn lagging_subscriber_skips_oldest_messages() {
        let bus = BroadcastBus::with_capacity(2);
        let mut slow = bus.subscribe();

        for n in 0..5u32 {
            bus.publish(n).unwrap();
        }

        assert_eq!(slow.drain(), vec![3, 4]);
        assert_eq!(slow.skipped(), 3);
    }

    #[tokio::test]
    async fn recv_waits_for_the_next_message() {
        let bus = BroadcastBus::with_capacity(4);
        let mut sub = bus.subscribe();

        let publisher = bus.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            publisher.publish(7u32).unwrap();
        });

        assert_eq!(sub.recv().await, Some(7));
    }

    #[tokio::test]
    async fn recv_ends_when_the_bus_is_dropped() {
        let bus = BroadcastBus::<u32>::with_capacity(4);
        let mut sub = bus.subscribe();
        drop(bus);

        assert_eq!(sub.recv().await, None);
    }
}
