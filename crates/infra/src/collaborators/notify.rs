use thiserror::Error;

use haulbook_events::{EventBus, EventEnvelope};
use haulbook_trips::TripNotification;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("notification publish failed: {0}")]
    Publish(String),
}

/// Outbound trip notifications. Called after the status change committed and
/// never awaited for correctness: failures are the caller's to log.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &TripNotification) -> Result<(), NotifyError>;
}

/// Publishes notifications as JSON envelopes on an event bus.
pub struct BusNotifier<B> {
    bus: B,
}

impl<B> BusNotifier<B> {
    pub fn new(bus: B) -> Self {
        Self { bus }
    }
}

impl<B> Notifier for BusNotifier<B>
where
    B: EventBus<EventEnvelope<serde_json::Value>>,
{
    fn notify(&self, notification: &TripNotification) -> Result<(), NotifyError> {
        let envelope = EventEnvelope::wrap(notification)?;

        self.bus
            .publish(envelope)
            .map_err(|e| NotifyError::Publish(format!("{e:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use haulbook_core::{OrgId, TripId};
    use haulbook_events::{BroadcastBus, Subscription};
    use haulbook_trips::TripEventKind;
    use serde_json::Value;
    use std::sync::Arc;

    fn delivered() -> TripNotification {
        TripNotification {
            kind: TripEventKind::Delivered,
            org_id: OrgId::new(),
            trip_id: TripId::new(),
            dm_id: None,
            client_name: "Sharma Traders".into(),
            client_phone: None,
            vehicle_number: "MH12AB1234".into(),
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn publishes_envelope_with_event_type() {
        let bus = Arc::new(BroadcastBus::with_capacity(8));
        let mut sub = bus.subscribe();
        let notifier = BusNotifier::new(bus.clone());

        let n = delivered();
        notifier.notify(&n).unwrap();

        let got = sub.drain();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].event_type(), "logistics.trip.delivered");
        assert_eq!(got[0].subject_id(), *n.trip_id.as_uuid());
    }

    struct ClosedBus;

    impl EventBus<EventEnvelope<Value>> for ClosedBus {
        type Error = &'static str;

        fn publish(&self, _message: EventEnvelope<Value>) -> Result<(), Self::Error> {
            Err("closed")
        }

        fn subscribe(&self) -> Subscription<EventEnvelope<Value>> {
            BroadcastBus::with_capacity(1).subscribe()
        }
    }

    #[test]
    fn publish_failures_surface_as_typed_errors() {
        let err = BusNotifier::new(ClosedBus).notify(&delivered()).unwrap_err();
        assert!(matches!(err, NotifyError::Publish(ref m) if m.contains("closed")), "got {err:?}");
        assert!(err.to_string().starts_with("notification publish failed"));
    }
}
