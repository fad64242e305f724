use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use haulbook_core::{OrgId, TripId};
use haulbook_events::Event;

use crate::memo::DmId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TripEventKind {
    Dispatched,
    Delivered,
}

/// Outbound notice that a trip was dispatched or delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripNotification {
    pub kind: TripEventKind,
    pub org_id: OrgId,
    pub trip_id: TripId,
    pub dm_id: Option<DmId>,
    pub client_name: String,
    pub client_phone: Option<String>,
    pub vehicle_number: String,
    pub occurred_at: DateTime<Utc>,
}

impl Event for TripNotification {
    fn event_type(&self) -> &'static str {
        match self.kind {
            TripEventKind::Dispatched => "logistics.trip.dispatched",
            TripEventKind::Delivered => "logistics.trip.delivered",
        }
    }

    fn org_id(&self) -> OrgId {
        self.org_id
    }

    fn subject_type(&self) -> &'static str {
        "logistics.trip"
    }

    fn subject_id(&self) -> Uuid {
        *self.trip_id.as_uuid()
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}
