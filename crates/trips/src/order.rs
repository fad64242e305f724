use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use haulbook_core::{ClientId, OrderId, OrgId, TripId};

use crate::model::{PaymentType, Trip, TripStatus};

/// Order as far as trips care about it: identity, payment terms and the
/// embedded per-trip summaries kept in sync by the cascade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub org_id: OrgId,
    pub client_id: ClientId,
    pub client_name: String,
    pub payment_type: PaymentType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub trips: Vec<OrderTripSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderTripSummary {
    pub trip_id: TripId,
    pub trip_status: TripStatus,
    pub dm_number: Option<u64>,
    pub scheduled_date: NaiveDate,
    pub dispatched_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub returned_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Fields copied from a trip into its order summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripMirror {
    pub trip_id: TripId,
    pub trip_status: TripStatus,
    pub dm_number: Option<u64>,
    pub scheduled_date: NaiveDate,
    pub dispatched_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub returned_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl TripMirror {
    /// `clear_stale` forces the delivered/returned sub-fields to null.
    pub fn from_trip(trip: &Trip, clear_stale: bool) -> Self {
        let (delivered_at, returned_at) = if clear_stale {
            (None, None)
        } else {
            (trip.delivered_at, trip.returned_at)
        };
        Self {
            trip_id: trip.id,
            trip_status: trip.trip_status,
            dm_number: trip.dm_number,
            scheduled_date: trip.scheduled_date,
            dispatched_at: trip.dispatched_at,
            delivered_at,
            returned_at,
            updated_at: trip.updated_at,
        }
    }
}

impl Order {
    pub fn new(
        id: OrderId,
        org_id: OrgId,
        client_id: ClientId,
        client_name: impl Into<String>,
        payment_type: PaymentType,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            org_id,
            client_id,
            client_name: client_name.into(),
            payment_type,
            created_at: at,
            updated_at: at,
            trips: Vec::new(),
        }
    }

    pub fn trip(&self, trip_id: TripId) -> Option<&OrderTripSummary> {
        self.trips.iter().find(|t| t.trip_id == trip_id)
    }

    /// Upsert the summary for `mirror.trip_id`.
    pub fn mirror_trip(&mut self, mirror: TripMirror) {
        let summary = OrderTripSummary {
            trip_id: mirror.trip_id,
            trip_status: mirror.trip_status,
            dm_number: mirror.dm_number,
            scheduled_date: mirror.scheduled_date,
            dispatched_at: mirror.dispatched_at,
            delivered_at: mirror.delivered_at,
            returned_at: mirror.returned_at,
            updated_at: mirror.updated_at,
        };
        self.updated_at = summary.updated_at.max(self.updated_at);
        match self.trips.iter_mut().find(|t| t.trip_id == summary.trip_id) {
            Some(existing) => *existing = summary,
            None => self.trips.push(summary),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::{trip, with_memo};
    use haulbook_core::Actor;

    #[test]
    fn mirror_upserts_by_trip_id() {
        let t = with_memo(trip(), 1);
        let mut order = Order::new(
            t.order_id,
            t.org_id,
            t.client_id,
            "Sharma Traders",
            PaymentType::PayLater,
            Utc::now(),
        );

        order.mirror_trip(TripMirror::from_trip(&t, false));
        order.mirror_trip(TripMirror::from_trip(&t, false));
        assert_eq!(order.trips.len(), 1);
        assert_eq!(order.trip(t.id).unwrap().dm_number, Some(1));
    }

    #[test]
    fn clear_stale_nulls_delivery_and_return() {
        let mut t = with_memo(trip(), 1);
        let actor = Actor::system();
        t.apply_status(TripStatus::Dispatched, actor, Utc::now(), None).unwrap();
        t.apply_status(TripStatus::Delivered, actor, Utc::now(), None).unwrap();

        let mirror = TripMirror::from_trip(&t, true);
        assert!(mirror.dispatched_at.is_some());
        assert!(mirror.delivered_at.is_none());
        assert!(mirror.returned_at.is_none());
    }
}
