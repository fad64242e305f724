//! Service wiring shared by the handlers: the engine plus the realtime feed
//! of trip notifications.

use std::{convert::Infallible, sync::Arc, time::Duration};

use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use serde_json::Value;
use tokio_stream::{StreamExt, wrappers::BroadcastStream};

use haulbook_core::OrgId;
use haulbook_events::{BroadcastBus, EventBus, EventEnvelope};
use haulbook_infra::{BusNotifier, Engine};

/// Buffered notifications per realtime subscriber before it starts lagging.
pub const REALTIME_CAPACITY: usize = 256;

/// Bus carrying trip notifications from the engine to SSE subscribers.
pub type NotificationBus = BroadcastBus<EventEnvelope<Value>>;

pub struct AppServices {
    pub engine: Engine,
    bus: Arc<NotificationBus>,
}

impl AppServices {
    pub fn new(engine: Engine, bus: Arc<NotificationBus>) -> Arc<Self> {
        Arc::new(Self { engine, bus })
    }

    pub fn bus(&self) -> &NotificationBus {
        &self.bus
    }
}

/// A bus and the notifier that publishes onto it, for handing to the engine.
pub fn notification_bus(capacity: usize) -> (Arc<NotificationBus>, BusNotifier<Arc<NotificationBus>>) {
    let bus = Arc::new(BroadcastBus::with_capacity(capacity));
    (bus.clone(), BusNotifier::new(bus))
}

pub fn org_sse_stream(
    services: Arc<AppServices>,
    org_id: OrgId,
) -> Sse<impl tokio_stream::Stream<Item = Result<SseEvent, Infallible>>> {
    let rx = services.bus().subscribe().into_receiver();
    let stream = BroadcastStream::new(rx).filter_map(move |msg| match msg {
        Ok(envelope) if envelope.org_id() == org_id => {
            let data = serde_json::to_string(envelope.payload()).unwrap_or_else(|_| "{}".to_string());
            Some(Ok(SseEvent::default().event(envelope.event_type()).data(data)))
        }
        _ => None,
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use haulbook_core::TripId;
    use haulbook_infra::Notifier;
    use haulbook_trips::{TripEventKind, TripNotification};

    #[test]
    fn notifier_publishes_onto_the_shared_bus() {
        let (bus, notifier) = notification_bus(8);
        let mut sub = bus.subscribe();
        let org_id = OrgId::new();

        notifier
            .notify(&TripNotification {
                kind: TripEventKind::Dispatched,
                org_id,
                trip_id: TripId::new(),
                dm_id: None,
                client_name: "Patil Hardware".into(),
                client_phone: None,
                vehicle_number: "MH14XY0001".into(),
                occurred_at: Utc::now(),
            })
            .unwrap();

        let got = sub.drain();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].org_id(), org_id);
        assert_eq!(got[0].event_type(), "logistics.trip.dispatched");
    }
}
