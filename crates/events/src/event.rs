use chrono::{DateTime, Utc};
use uuid::Uuid;

use haulbook_core::OrgId;

/// Something that happened to a record, published for subscribers.
///
/// The event knows which organization and record it belongs to, so it can be
/// wrapped into an [`EventEnvelope`](crate::EventEnvelope) without extra
/// arguments.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Dotted routing name, e.g. `logistics.trip.dispatched`.
    fn event_type(&self) -> &'static str;

    fn org_id(&self) -> OrgId;

    /// Kind of record the event is about, e.g. `logistics.trip`.
    fn subject_type(&self) -> &'static str;

    fn subject_id(&self) -> Uuid;

    fn occurred_at(&self) -> DateTime<Utc>;

    /// Payload schema revision; bump on breaking field changes.
    fn schema_version(&self) -> u32 {
        1
    }
}
