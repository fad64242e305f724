use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use haulbook_core::{
    Actor, ClientId, DomainError, DomainResult, EmployeeId, FiscalYear, LedgerEntryId, OrderId,
    OrgId, TripId, TripWageId,
};

/// Direction of an entry relative to the account it is posted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntryType {
    Credit,
    Debit,
}

/// Business category of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntryCategory {
    /// Client paid ahead of dispatch.
    Advance,
    /// Amount pending on a returned pay-on-delivery trip.
    WagePending,
    /// Per-worker loading/unloading pay.
    WageCredit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntryStatus {
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AccountKind {
    Client,
    Employee,
}

/// Party an entry is posted against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerAccount {
    pub kind: AccountKind,
    pub id: Uuid,
}

impl LedgerAccount {
    pub fn client(id: ClientId) -> Self {
        Self {
            kind: AccountKind::Client,
            id: *id.as_uuid(),
        }
    }

    pub fn employee(id: EmployeeId) -> Self {
        Self {
            kind: AccountKind::Employee,
            id: *id.as_uuid(),
        }
    }
}

/// The task that produced an entry. Together with the originating record id it
/// forms the idempotency key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskType {
    Dispatch,
    Return,
    Loading,
    Unloading,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Dispatch => "dispatch",
            TaskType::Return => "return",
            TaskType::Loading => "loading",
            TaskType::Unloading => "unloading",
        }
    }
}

/// Links an entry back to the business event that created it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryOrigin {
    pub trip_id: Option<TripId>,
    pub order_id: Option<OrderId>,
    pub trip_wage_id: Option<TripWageId>,
    pub dm_number: Option<u64>,
    pub task: TaskType,
}

impl EntryOrigin {
    pub fn trip(trip_id: TripId, order_id: OrderId, dm_number: Option<u64>, task: TaskType) -> Self {
        Self {
            trip_id: Some(trip_id),
            order_id: Some(order_id),
            trip_wage_id: None,
            dm_number,
            task,
        }
    }

    pub fn wage(trip_wage_id: TripWageId, trip_id: TripId, task: TaskType) -> Self {
        Self {
            trip_id: Some(trip_id),
            order_id: None,
            trip_wage_id: Some(trip_wage_id),
            dm_number: None,
            task,
        }
    }
}

/// Deduplicates entries per originating event.
///
/// Trip entries are keyed by `(trip, task)`; wage entries by
/// `(settlement, worker, task)` since one settlement pays many workers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    pub fn for_origin(origin: &EntryOrigin, account: &LedgerAccount) -> DomainResult<Self> {
        let task = origin.task.as_str();
        if let Some(wage_id) = origin.trip_wage_id {
            return Ok(Self(format!("wage_{wage_id}_{}_{task}", account.id)));
        }
        if let Some(trip_id) = origin.trip_id {
            return Ok(Self(format!("trip_{trip_id}_{task}")));
        }
        Err(DomainError::validation("ledger entry origin must reference a trip or settlement"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Request to create an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryDraft {
    pub org_id: OrgId,
    pub account: LedgerAccount,
    pub entry_type: EntryType,
    pub category: EntryCategory,
    /// Positive amount in the smallest currency unit.
    pub amount: i64,
    pub origin: EntryOrigin,
    pub fiscal_year: FiscalYear,
    pub entry_date: NaiveDate,
    pub description: Option<String>,
}

impl EntryDraft {
    pub fn idempotency_key(&self) -> DomainResult<IdempotencyKey> {
        IdempotencyKey::for_origin(&self.origin, &self.account)
    }
}

/// A posted ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub id: LedgerEntryId,
    pub org_id: OrgId,
    pub account: LedgerAccount,
    pub entry_type: EntryType,
    pub category: EntryCategory,
    pub status: EntryStatus,
    pub amount: i64,
    pub origin: EntryOrigin,
    pub idempotency_key: IdempotencyKey,
    pub fiscal_year: FiscalYear,
    pub entry_date: NaiveDate,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub created_by: Actor,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancelled_by: Option<Actor>,
}

impl LedgerEntry {
    pub fn from_draft(
        id: LedgerEntryId,
        draft: EntryDraft,
        actor: Actor,
        at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if draft.amount <= 0 {
            return Err(DomainError::validation("amount must be positive"));
        }
        let idempotency_key = draft.idempotency_key()?;

        Ok(Self {
            id,
            org_id: draft.org_id,
            account: draft.account,
            entry_type: draft.entry_type,
            category: draft.category,
            status: EntryStatus::Completed,
            amount: draft.amount,
            origin: draft.origin,
            idempotency_key,
            fiscal_year: draft.fiscal_year,
            entry_date: draft.entry_date,
            description: draft.description,
            created_at: at,
            created_by: actor,
            cancelled_at: None,
            cancelled_by: None,
        })
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == EntryStatus::Cancelled
    }

    /// Mark cancelled. Returns `false` (and changes nothing) if already cancelled.
    pub fn cancel(&mut self, actor: Actor, at: DateTime<Utc>) -> bool {
        if self.is_cancelled() {
            return false;
        }
        self.status = EntryStatus::Cancelled;
        self.cancelled_at = Some(at);
        self.cancelled_by = Some(actor);
        true
    }

    /// Contribution to the account balance: credits positive, debits negative,
    /// cancelled entries zero.
    pub fn signed_amount(&self) -> i64 {
        match (self.status, self.entry_type) {
            (EntryStatus::Cancelled, _) => 0,
            (EntryStatus::Completed, EntryType::Credit) => self.amount,
            (EntryStatus::Completed, EntryType::Debit) => -self.amount,
        }
    }
}

/// Running balance over a set of entries.
pub fn balance<'a>(entries: impl IntoIterator<Item = &'a LedgerEntry>) -> i64 {
    entries.into_iter().map(LedgerEntry::signed_amount).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn test_draft(amount: i64, entry_type: EntryType) -> EntryDraft {
        EntryDraft {
            org_id: OrgId::new(),
            account: LedgerAccount::employee(EmployeeId::new()),
            entry_type,
            category: EntryCategory::WageCredit,
            amount,
            origin: EntryOrigin::wage(TripWageId::new(), TripId::new(), TaskType::Loading),
            fiscal_year: FiscalYear::starting(2024),
            entry_date: NaiveDate::from_ymd_opt(2024, 7, 1).unwrap(),
            description: None,
        }
    }

    #[test]
    fn non_positive_amount_is_rejected() {
        let err = LedgerEntry::from_draft(
            LedgerEntryId::new(),
            test_draft(0, EntryType::Credit),
            Actor::system(),
            test_time(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn cancel_is_idempotent() {
        let mut entry = LedgerEntry::from_draft(
            LedgerEntryId::new(),
            test_draft(500, EntryType::Credit),
            Actor::system(),
            test_time(),
        )
        .unwrap();

        assert!(entry.cancel(Actor::system(), test_time()));
        let cancelled_at = entry.cancelled_at;
        assert!(!entry.cancel(Actor::system(), test_time()));
        assert_eq!(entry.cancelled_at, cancelled_at);
        assert_eq!(entry.signed_amount(), 0);
    }

    #[test]
    fn trip_keys_ignore_the_account_and_wage_keys_include_it() {
        let trip_id = TripId::new();
        let origin = EntryOrigin::trip(trip_id, OrderId::new(), Some(7), TaskType::Dispatch);
        let a = IdempotencyKey::for_origin(&origin, &LedgerAccount::client(ClientId::new())).unwrap();
        let b = IdempotencyKey::for_origin(&origin, &LedgerAccount::client(ClientId::new())).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), format!("trip_{trip_id}_dispatch"));

        let wage = EntryOrigin::wage(TripWageId::new(), trip_id, TaskType::Unloading);
        let w1 = IdempotencyKey::for_origin(&wage, &LedgerAccount::employee(EmployeeId::new())).unwrap();
        let w2 = IdempotencyKey::for_origin(&wage, &LedgerAccount::employee(EmployeeId::new())).unwrap();
        assert_ne!(w1, w2);
    }

    #[test]
    fn unset_optionals_serialize_as_null() {
        let entry = LedgerEntry::from_draft(
            LedgerEntryId::new(),
            test_draft(10, EntryType::Debit),
            Actor::system(),
            test_time(),
        )
        .unwrap();
        let json = serde_json::to_value(&entry).unwrap();
        assert!(json.get("cancelledAt").unwrap().is_null());
        assert!(json.get("description").unwrap().is_null());
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: the balance equals the signed sum over completed entries only;
        /// cancelled entries never contribute.
        #[test]
        fn cancelled_entries_never_affect_balance(
            spec in prop::collection::vec((1i64..1_000_000i64, any::<bool>(), any::<bool>()), 0..20)
        ) {
            let mut entries = Vec::new();
            let mut expected: i64 = 0;

            for (amount, is_credit, cancelled) in spec {
                let entry_type = if is_credit { EntryType::Credit } else { EntryType::Debit };
                let mut entry = LedgerEntry::from_draft(
                    LedgerEntryId::new(),
                    test_draft(amount, entry_type),
                    Actor::system(),
                    test_time(),
                ).unwrap();

                if cancelled {
                    entry.cancel(Actor::system(), test_time());
                } else if is_credit {
                    expected += amount;
                } else {
                    expected -= amount;
                }
                entries.push(entry);
            }

            prop_assert_eq!(balance(&entries), expected);
        }
    }
}
