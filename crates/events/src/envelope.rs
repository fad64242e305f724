use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use haulbook_core::OrgId;

use crate::Event;

/// A published event with its routing metadata.
///
/// Subscribers filter on `org_id` and `event_type` without decoding the
/// payload. `event_id` is fresh per publish, so a retried status update that
/// publishes twice yields two envelopes with the same subject and type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope<P> {
    event_id: Uuid,
    org_id: OrgId,
    subject_type: String,
    subject_id: Uuid,
    event_type: String,
    schema_version: u32,
    occurred_at: DateTime<Utc>,
    payload: P,
}

impl<P> EventEnvelope<P> {
    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn org_id(&self) -> OrgId {
        self.org_id
    }

    pub fn subject_type(&self) -> &str {
        &self.subject_type
    }

    pub fn subject_id(&self) -> Uuid {
        self.subject_id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn schema_version(&self) -> u32 {
        self.schema_version
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn payload(&self) -> &P {
        &self.payload
    }

    pub fn into_payload(self) -> P {
        self.payload
    }
}

impl EventEnvelope<serde_json::Value> {
    /// Wrap `event` with its body serialized to JSON.
    pub fn wrap<E>(event: &E) -> Result<Self, serde_json::Error>
    where
        E: Event + Serialize,
    {
        Ok(Self {
            event_id: Uuid::now_v7(),
            org_id: event.org_id(),
            subject_type: event.subject_type().to_string(),
            subject_id: event.subject_id(),
            event_type: event.event_type().to_string(),
            schema_version: event.schema_version(),
            occurred_at: event.occurred_at(),
            payload: serde_json::to_value(event)?,
        })
    }
}
