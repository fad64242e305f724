//! Delivery memos and the projector that snapshots a trip into one.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use haulbook_core::{
    Actor, ClientId, DomainError, DomainResult, FiscalYear, OrderId, OrgId, TripId,
};

use crate::model::{PaymentType, Pricing, Trip, TripItem, TripStatus};

/// Memo identifier, `DM/{fiscal year}/{number}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DmId(String);

impl DmId {
    pub fn new(fiscal_year: FiscalYear, number: u64) -> Self {
        Self(format!("DM/{}/{}", fiscal_year, number))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for DmId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for DmId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Which event produced the memo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MemoSource {
    Dispatch,
    ReturnTrigger,
}

impl MemoSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoSource::Dispatch => "dispatch",
            MemoSource::ReturnTrigger => "returnTrigger",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MemoStatus {
    Active,
    Delivered,
    Returned,
    Cancelled,
}

impl MemoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoStatus::Active => "active",
            MemoStatus::Delivered => "delivered",
            MemoStatus::Returned => "returned",
            MemoStatus::Cancelled => "cancelled",
        }
    }
}

/// Snapshot of a trip at the moment a memo number was issued.
///
/// Snapshot fields are never null (missing trip values become empty strings);
/// lifecycle fields are explicit nulls until stamped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryMemo {
    pub id: DmId,
    pub org_id: OrgId,
    pub trip_id: TripId,
    pub order_id: OrderId,
    pub dm_number: u64,
    pub fiscal_year: FiscalYear,
    pub source: MemoSource,
    pub status: MemoStatus,

    pub client_id: ClientId,
    pub client_name: String,
    pub client_phone: String,
    pub delivery_address: String,
    pub vehicle_number: String,
    pub driver_name: String,
    pub driver_phone: String,
    pub items: Vec<TripItem>,
    pub pricing: Pricing,
    pub payment_type: PaymentType,
    pub scheduled_date: NaiveDate,
    pub trip_status: TripStatus,

    /// For return memos: the dispatch memo this one supersedes.
    pub supersedes_dm_id: Option<DmId>,
    pub created_at: DateTime<Utc>,

    pub delivered_at: Option<DateTime<Utc>>,
    pub delivered_by: Option<Actor>,
    pub delivery_photo_url: Option<String>,
    pub returned_at: Option<DateTime<Utc>>,
    pub returned_by: Option<Actor>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancelled_by: Option<Actor>,
    pub cancellation_reason: Option<String>,
}

/// Build a memo from the trip's current fields.
///
/// For `ReturnTrigger`, call this before the trip is re-pointed at the new memo:
/// the trip's current `dm_id` is recorded as the superseded dispatch memo, and
/// the trip's delivery/return stamps are carried over.
pub fn project(
    trip: &Trip,
    number: u64,
    fiscal_year: FiscalYear,
    source: MemoSource,
    at: DateTime<Utc>,
) -> DeliveryMemo {
    let (status, supersedes_dm_id, delivered, returned) = match source {
        MemoSource::Dispatch => (MemoStatus::Active, None, None, None),
        MemoSource::ReturnTrigger => (
            MemoStatus::Returned,
            trip.dm_id.clone(),
            Some((
                trip.delivered_at,
                trip.delivered_by,
                trip.delivery_photo_url.clone(),
            )),
            Some((trip.returned_at.or(Some(at)), trip.returned_by)),
        ),
    };
    let (delivered_at, delivered_by, delivery_photo_url) = delivered.unwrap_or((None, None, None));
    let (returned_at, returned_by) = returned.unwrap_or((None, None));

    DeliveryMemo {
        id: DmId::new(fiscal_year, number),
        org_id: trip.org_id,
        trip_id: trip.id,
        order_id: trip.order_id,
        dm_number: number,
        fiscal_year,
        source,
        status,
        client_id: trip.client_id,
        client_name: trip.client_name.clone(),
        client_phone: trip.client_phone.clone().unwrap_or_default(),
        delivery_address: trip.delivery_address.clone().unwrap_or_default(),
        vehicle_number: trip.vehicle_number.clone(),
        driver_name: trip.driver_name.clone().unwrap_or_default(),
        driver_phone: trip.driver_phone.clone().unwrap_or_default(),
        items: trip.items.clone(),
        pricing: trip.pricing(),
        payment_type: trip.payment_type,
        scheduled_date: trip.scheduled_date,
        trip_status: trip.trip_status,
        supersedes_dm_id,
        created_at: at,
        delivered_at,
        delivered_by,
        delivery_photo_url,
        returned_at,
        returned_by,
        cancelled_at: None,
        cancelled_by: None,
        cancellation_reason: None,
    }
}

impl DeliveryMemo {
    pub fn stamp_delivery(
        &mut self,
        at: DateTime<Utc>,
        actor: Option<Actor>,
        photo_url: Option<String>,
    ) -> DomainResult<()> {
        if self.status != MemoStatus::Active {
            return Err(DomainError::conflict(format!(
                "memo {} is {}, expected active",
                self.id,
                self.status.as_str()
            )));
        }
        self.status = MemoStatus::Delivered;
        self.trip_status = TripStatus::Delivered;
        self.delivered_at = Some(at);
        self.delivered_by = actor;
        self.delivery_photo_url = photo_url;
        Ok(())
    }

    pub fn revert_delivery(&mut self) -> DomainResult<()> {
        if self.status != MemoStatus::Delivered {
            return Err(DomainError::conflict(format!(
                "memo {} is {}, expected delivered",
                self.id,
                self.status.as_str()
            )));
        }
        self.status = MemoStatus::Active;
        self.trip_status = TripStatus::Dispatched;
        self.delivered_at = None;
        self.delivered_by = None;
        self.delivery_photo_url = None;
        Ok(())
    }

    /// Stamp return fields. Returns `false` if the memo was already returned.
    pub fn stamp_return(&mut self, at: DateTime<Utc>, actor: Option<Actor>) -> DomainResult<bool> {
        match self.status {
            MemoStatus::Returned => Ok(false),
            MemoStatus::Cancelled => Err(DomainError::conflict(format!(
                "memo {} is cancelled",
                self.id
            ))),
            MemoStatus::Active | MemoStatus::Delivered => {
                self.status = MemoStatus::Returned;
                self.trip_status = TripStatus::Returned;
                self.returned_at = Some(at);
                self.returned_by = actor;
                Ok(true)
            }
        }
    }

    pub fn revert_return(&mut self) -> DomainResult<()> {
        if self.status != MemoStatus::Returned {
            return Err(DomainError::conflict(format!(
                "memo {} is {}, expected returned",
                self.id,
                self.status.as_str()
            )));
        }
        self.status = MemoStatus::Delivered;
        self.trip_status = TripStatus::Delivered;
        self.returned_at = None;
        self.returned_by = None;
        Ok(())
    }

    /// Cancel the memo, refreshing its snapshot from the trip as it stands.
    /// The number stays consumed.
    pub fn cancel(
        &mut self,
        trip: &Trip,
        reason: impl Into<String>,
        actor: Actor,
        at: DateTime<Utc>,
    ) -> DomainResult<()> {
        if self.status == MemoStatus::Cancelled {
            return Err(DomainError::conflict(format!("memo {} already cancelled", self.id)));
        }
        let mut refreshed = project(trip, self.dm_number, self.fiscal_year, self.source, self.created_at);
        refreshed.status = MemoStatus::Cancelled;
        refreshed.cancelled_at = Some(at);
        refreshed.cancelled_by = Some(actor);
        refreshed.cancellation_reason = Some(reason.into());
        *self = refreshed;
        Ok(())
    }
}
