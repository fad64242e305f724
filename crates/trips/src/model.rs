use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use haulbook_core::{
    Actor, ClientId, DomainError, DomainResult, EmployeeId, FiscalYear, LedgerEntryId, OrderId,
    OrgId, TripId,
};

use crate::memo::DmId;
use crate::order::Order;
use crate::transition::StatusTransition;

/// Trip status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TripStatus {
    Scheduled,
    Dispatched,
    Delivered,
    Returned,
}

impl TripStatus {
    /// Position in the forward lifecycle.
    pub fn rank(&self) -> u8 {
        match self {
            TripStatus::Scheduled => 0,
            TripStatus::Dispatched => 1,
            TripStatus::Delivered => 2,
            TripStatus::Returned => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TripStatus::Scheduled => "scheduled",
            TripStatus::Dispatched => "dispatched",
            TripStatus::Delivered => "delivered",
            TripStatus::Returned => "returned",
        }
    }
}

impl core::str::FromStr for TripStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(TripStatus::Scheduled),
            "dispatched" => Ok(TripStatus::Dispatched),
            "delivered" => Ok(TripStatus::Delivered),
            "returned" => Ok(TripStatus::Returned),
            other => Err(DomainError::validation(format!("unknown trip status '{other}'"))),
        }
    }
}

/// How the order is paid for; decides which ledger entries trips emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PaymentType {
    /// Paid ahead: dispatch records an advance credit.
    Advance,
    /// Collected on delivery: return records a pending credit.
    PayOnDelivery,
    /// Billed later: no trip-level entries.
    PayLater,
}

impl PaymentType {
    pub fn requires_dispatch_entry(&self) -> bool {
        matches!(self, PaymentType::Advance)
    }

    pub fn requires_return_entry(&self) -> bool {
        matches!(self, PaymentType::PayOnDelivery)
    }
}

/// Goods line carried on a trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripItem {
    pub product_name: String,
    pub quantity: i64,
    /// Price in smallest currency unit.
    pub unit_price: i64,
    /// Tax rate in basis points (1800 = 18%).
    pub tax_rate_bps: u32,
}

impl TripItem {
    /// `None` when the amount does not fit in an `i64`.
    pub fn line_amount(&self) -> Option<i64> {
        self.quantity.checked_mul(self.unit_price)
    }

    pub fn tax_amount(&self) -> Option<i64> {
        Some(self.line_amount()?.checked_mul(i64::from(self.tax_rate_bps))? / 10_000)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pricing {
    pub subtotal: i64,
    pub tax_amount: i64,
    pub total: i64,
}

impl Pricing {
    /// Totals for `items`, or `None` if any line or sum overflows.
    pub fn checked(items: &[TripItem]) -> Option<Self> {
        let mut subtotal = 0i64;
        let mut tax_amount = 0i64;
        for item in items {
            subtotal = subtotal.checked_add(item.line_amount()?)?;
            tax_amount = tax_amount.checked_add(item.tax_amount()?)?;
        }
        Some(Self {
            subtotal,
            tax_amount,
            total: subtotal.checked_add(tax_amount)?,
        })
    }
}

/// Audit record of the most recent status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    pub from: TripStatus,
    pub to: TripStatus,
    pub actor: Actor,
    pub at: DateTime<Utc>,
}

/// One physical delivery run against an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trip {
    pub id: TripId,
    pub org_id: OrgId,
    pub order_id: OrderId,
    pub client_id: ClientId,
    pub client_name: String,
    pub client_phone: Option<String>,
    pub delivery_address: Option<String>,
    pub vehicle_number: String,
    pub driver_id: Option<EmployeeId>,
    pub driver_name: Option<String>,
    pub driver_phone: Option<String>,
    pub items: Vec<TripItem>,
    pub payment_type: PaymentType,
    pub scheduled_date: NaiveDate,
    pub trip_status: TripStatus,

    /// Current authoritative memo.
    pub dm_id: Option<DmId>,
    pub dm_number: Option<u64>,
    pub fiscal_year: Option<FiscalYear>,
    /// Original dispatch memo, kept once a return memo becomes current.
    pub dispatch_dm_id: Option<DmId>,
    pub dispatch_dm_number: Option<u64>,
    /// Set once the return memo is minted. Cleared only when the memos are
    /// cancelled back in `scheduled`.
    pub return_dm_id: Option<DmId>,

    pub dispatch_entry_id: Option<LedgerEntryId>,
    pub return_entry_id: Option<LedgerEntryId>,

    pub last_status_change: Option<StatusChange>,
    pub dispatched_at: Option<DateTime<Utc>>,
    pub dispatched_by: Option<Actor>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub delivered_by: Option<Actor>,
    pub delivery_photo_url: Option<String>,
    pub returned_at: Option<DateTime<Utc>>,
    pub returned_by: Option<Actor>,

    /// Audit flag: the parent order was deleted; the trip stays actionable.
    pub order_deleted: bool,
    pub order_deleted_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What the scheduler supplies for a new trip. Client and payment terms come
/// from the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripPlan {
    pub vehicle_number: String,
    #[serde(default)]
    pub driver_id: Option<EmployeeId>,
    #[serde(default)]
    pub driver_name: Option<String>,
    #[serde(default)]
    pub driver_phone: Option<String>,
    #[serde(default)]
    pub client_phone: Option<String>,
    #[serde(default)]
    pub delivery_address: Option<String>,
    pub items: Vec<TripItem>,
    pub scheduled_date: NaiveDate,
}

impl Trip {
    /// A new trip in `scheduled` against `order`.
    pub fn schedule(id: TripId, order: &Order, plan: TripPlan, at: DateTime<Utc>) -> DomainResult<Self> {
        if plan.vehicle_number.trim().is_empty() {
            return Err(DomainError::validation("vehicle number is required"));
        }
        if plan.items.iter().any(|i| i.quantity <= 0 || i.unit_price < 0) {
            return Err(DomainError::validation("trip items need a positive quantity and a price"));
        }
        if Pricing::checked(&plan.items).is_none() {
            return Err(DomainError::validation("trip pricing overflows"));
        }
        Ok(Self {
            id,
            org_id: order.org_id,
            order_id: order.id,
            client_id: order.client_id,
            client_name: order.client_name.clone(),
            client_phone: plan.client_phone,
            delivery_address: plan.delivery_address,
            vehicle_number: plan.vehicle_number,
            driver_id: plan.driver_id,
            driver_name: plan.driver_name,
            driver_phone: plan.driver_phone,
            items: plan.items,
            payment_type: order.payment_type,
            scheduled_date: plan.scheduled_date,
            trip_status: TripStatus::Scheduled,
            dm_id: None,
            dm_number: None,
            fiscal_year: None,
            dispatch_dm_id: None,
            dispatch_dm_number: None,
            return_dm_id: None,
            dispatch_entry_id: None,
            return_entry_id: None,
            last_status_change: None,
            dispatched_at: None,
            dispatched_by: None,
            delivered_at: None,
            delivered_by: None,
            delivery_photo_url: None,
            returned_at: None,
            returned_by: None,
            order_deleted: false,
            order_deleted_at: None,
            created_at: at,
            updated_at: at,
        })
    }

    /// Items are overflow-checked at scheduling, so a stored trip always prices.
    /// A document written outside `schedule` that overflows prices as zero.
    pub fn pricing(&self) -> Pricing {
        Pricing::checked(&self.items).unwrap_or_default()
    }

    /// Guard for entering `after`. Anything from dispatch onwards needs a memo.
    pub fn ensure_can_enter(&self, after: TripStatus) -> DomainResult<()> {
        if after.rank() >= TripStatus::Dispatched.rank() && self.dm_number.is_none() {
            return Err(DomainError::validation("memo required before dispatch"));
        }
        Ok(())
    }

    /// Move to `after`, recording who did it and when.
    ///
    /// Forward moves stamp the target status's time/actor; reverts clear the
    /// stamps of every status above the target. Same-status requests change
    /// nothing.
    pub fn apply_status(
        &mut self,
        after: TripStatus,
        actor: Actor,
        at: DateTime<Utc>,
        photo_url: Option<String>,
    ) -> DomainResult<StatusTransition> {
        let transition = StatusTransition::new(self.trip_status, after);
        if transition.is_noop() {
            return Ok(transition);
        }
        self.ensure_can_enter(after)?;

        match after {
            TripStatus::Scheduled => {}
            TripStatus::Dispatched => {
                if transition.is_forward() {
                    self.dispatched_at = Some(at);
                    self.dispatched_by = Some(actor);
                }
            }
            TripStatus::Delivered => {
                if transition.is_forward() {
                    self.delivered_at = Some(at);
                    self.delivered_by = Some(actor);
                    self.delivery_photo_url = photo_url;
                }
            }
            TripStatus::Returned => {
                self.returned_at = Some(at);
                self.returned_by = Some(actor);
            }
        }

        if after.rank() < TripStatus::Returned.rank() {
            self.returned_at = None;
            self.returned_by = None;
        }
        if after.rank() < TripStatus::Delivered.rank() {
            self.delivered_at = None;
            self.delivered_by = None;
            self.delivery_photo_url = None;
        }
        if after.rank() < TripStatus::Dispatched.rank() {
            self.dispatched_at = None;
            self.dispatched_by = None;
        }

        self.trip_status = after;
        self.last_status_change = Some(StatusChange {
            from: transition.before,
            to: after,
            actor,
            at,
        });
        self.updated_at = at;
        Ok(transition)
    }

    /// Point the trip at its first (dispatch) memo.
    pub fn attach_dispatch_memo(&mut self, dm_id: DmId, number: u64, fiscal_year: FiscalYear) {
        self.dm_id = Some(dm_id);
        self.dm_number = Some(number);
        self.fiscal_year = Some(fiscal_year);
    }

    /// Make the return memo current, preserving the previous memo under the
    /// dispatch aliases.
    pub fn attach_return_memo(
        &mut self,
        dm_id: DmId,
        number: u64,
        fiscal_year: FiscalYear,
    ) -> DomainResult<()> {
        if self.return_dm_id.is_some() {
            return Err(DomainError::conflict("trip already has a return memo"));
        }
        self.dispatch_dm_id = self.dm_id.take();
        self.dispatch_dm_number = self.dm_number.take();
        self.return_dm_id = Some(dm_id.clone());
        self.dm_id = Some(dm_id);
        self.dm_number = Some(number);
        self.fiscal_year = Some(fiscal_year);
        Ok(())
    }

    /// Drop every memo reference before the memos themselves are cancelled.
    ///
    /// Returns the dispatch memo and, when the trip was returned and then
    /// reverted, the return memo. Both must be cancelled so the next dispatch
    /// and return each get a fresh memo.
    pub fn detach_memo(&mut self) -> DomainResult<(DmId, Option<DmId>)> {
        if self.trip_status != TripStatus::Scheduled {
            return Err(DomainError::validation(
                "memo can only be cancelled before dispatch",
            ));
        }
        let dispatch = self
            .dispatch_dm_id
            .take()
            .or_else(|| self.dm_id.take())
            .ok_or_else(|| DomainError::validation("trip has no memo to cancel"))?;
        let returned = self.return_dm_id.take();
        self.dm_id = None;
        self.dm_number = None;
        self.dispatch_dm_number = None;
        self.fiscal_year = None;
        Ok((dispatch, returned))
    }

    /// The memo created at dispatch time, whether or not a return memo superseded it.
    pub fn dispatch_memo_id(&self) -> Option<&DmId> {
        self.dispatch_dm_id.as_ref().or(self.dm_id.as_ref())
    }

    pub fn mark_order_deleted(&mut self, at: DateTime<Utc>) {
        self.order_deleted = true;
        self.order_deleted_at = Some(at);
        self.updated_at = at;
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn dispatch_without_memo_is_rejected_and_status_kept() {
        let mut t = trip();
        let err = t
            .apply_status(TripStatus::Dispatched, Actor::system(), Utc::now(), None)
            .unwrap_err();
        assert_eq!(err, DomainError::validation("memo required before dispatch"));
        assert_eq!(t.trip_status, TripStatus::Scheduled);
        assert!(t.last_status_change.is_none());
    }

    #[test]
    fn same_status_is_a_noop() {
        let mut t = trip();
        let before = t.clone();
        let tr = t
            .apply_status(TripStatus::Scheduled, Actor::system(), Utc::now(), None)
            .unwrap();
        assert!(tr.is_noop());
        assert_eq!(t, before);
    }

    #[test]
    fn revert_clears_stamps_above_target() {
        let mut t = with_memo(trip(), 1);
        let actor = Actor::system();
        t.apply_status(TripStatus::Dispatched, actor, Utc::now(), None).unwrap();
        t.apply_status(TripStatus::Delivered, actor, Utc::now(), Some("p.jpg".into()))
            .unwrap();
        t.apply_status(TripStatus::Returned, actor, Utc::now(), None).unwrap();

        let tr = t.apply_status(TripStatus::Dispatched, actor, Utc::now(), None).unwrap();
        assert!(tr.is_revert());
        assert!(t.dispatched_at.is_some());
        assert!(t.delivered_at.is_none());
        assert!(t.delivery_photo_url.is_none());
        assert!(t.returned_at.is_none());
        assert_eq!(t.last_status_change.unwrap().from, TripStatus::Returned);
    }

    #[test]
    fn return_memo_preserves_dispatch_aliases_once() {
        let mut t = with_memo(trip(), 4);
        let fy = FiscalYear::starting(2024);
        let dispatch = t.dm_id.clone().unwrap();

        t.attach_return_memo(DmId::new(fy, 9), 9, fy).unwrap();
        assert_eq!(t.dispatch_dm_id.as_ref(), Some(&dispatch));
        assert_eq!(t.dispatch_dm_number, Some(4));
        assert_eq!(t.dm_number, Some(9));
        assert_eq!(t.dispatch_memo_id(), Some(&dispatch));

        let err = t.attach_return_memo(DmId::new(fy, 10), 10, fy).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
        assert_eq!(t.dm_number, Some(9));
    }

    #[test]
    fn memo_cannot_be_detached_after_dispatch() {
        let mut t = with_memo(trip(), 2);
        t.apply_status(TripStatus::Dispatched, Actor::system(), Utc::now(), None)
            .unwrap();
        assert!(t.detach_memo().is_err());
        assert_eq!(t.dm_number, Some(2));
    }

    #[test]
    fn detaching_after_full_revert_releases_both_memos() {
        let mut t = with_memo(trip(), 1);
        let fy = FiscalYear::starting(2024);
        let dispatch = t.dm_id.clone().unwrap();
        let actor = Actor::system();
        t.apply_status(TripStatus::Returned, actor, Utc::now(), None).unwrap();
        t.attach_return_memo(DmId::new(fy, 2), 2, fy).unwrap();
        t.apply_status(TripStatus::Scheduled, actor, Utc::now(), None).unwrap();

        let (cancelled_dispatch, cancelled_return) = t.detach_memo().unwrap();
        assert_eq!(cancelled_dispatch, dispatch);
        assert_eq!(cancelled_return, Some(DmId::new(fy, 2)));
        assert!(t.dm_id.is_none());
        assert!(t.dispatch_dm_id.is_none());
        assert!(t.return_dm_id.is_none());
        assert!(t.fiscal_year.is_none());
        assert_eq!(t.dispatch_memo_id(), None);
    }

    #[test]
    fn scheduling_copies_client_and_terms_from_order() {
        let order = Order::new(
            OrderId::new(),
            OrgId::new(),
            ClientId::new(),
            "Patil Hardware",
            PaymentType::Advance,
            Utc::now(),
        );
        let plan = TripPlan {
            vehicle_number: "MH14XY0001".into(),
            driver_id: None,
            driver_name: None,
            driver_phone: None,
            client_phone: None,
            delivery_address: None,
            items: Vec::new(),
            scheduled_date: NaiveDate::from_ymd_opt(2025, 1, 3).unwrap(),
        };
        let t = Trip::schedule(TripId::new(), &order, plan.clone(), Utc::now()).unwrap();
        assert_eq!(t.payment_type, PaymentType::Advance);
        assert_eq!(t.client_name, "Patil Hardware");
        assert_eq!(t.trip_status, TripStatus::Scheduled);

        let blank = TripPlan {
            vehicle_number: " ".into(),
            ..plan
        };
        assert!(Trip::schedule(TripId::new(), &order, blank, Utc::now()).is_err());
    }

    #[test]
    fn scheduling_rejects_items_whose_totals_overflow() {
        let order = Order::new(
            OrderId::new(),
            OrgId::new(),
            ClientId::new(),
            "Patil Hardware",
            PaymentType::PayLater,
            Utc::now(),
        );
        let plan = TripPlan {
            vehicle_number: "MH14XY0001".into(),
            driver_id: None,
            driver_name: None,
            driver_phone: None,
            client_phone: None,
            delivery_address: None,
            items: vec![TripItem {
                product_name: "bulk".into(),
                quantity: 4_000_000_000,
                unit_price: 4_000_000_000,
                tax_rate_bps: 1800,
            }],
            scheduled_date: NaiveDate::from_ymd_opt(2025, 1, 3).unwrap(),
        };
        let err = Trip::schedule(TripId::new(), &order, plan, Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)), "got {err:?}");

        let item = TripItem {
            product_name: "bulk".into(),
            quantity: i64::MAX / 2,
            unit_price: 1,
            tax_rate_bps: 0,
        };
        assert!(Pricing::checked(&[item.clone(), item.clone(), item]).is_none());
    }

    #[test]
    fn pricing_sums_lines_and_tax() {
        let t = trip();
        let p = t.pricing();
        assert_eq!(p.subtotal, 800_000);
        assert_eq!(p.tax_amount, 96_000);
        assert_eq!(p.total, 896_000);
    }
}
