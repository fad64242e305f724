use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use haulbook_core::{
    Actor, DomainError, DomainResult, EmployeeId, FiscalYear, LedgerEntryId, OrgId, TripId,
    TripWageId,
};
use haulbook_ledger::TaskType;
use haulbook_trips::DmId;

use crate::attendance::YearMonth;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WageStatus {
    Pending,
    Processed,
}

/// Where a settlement landed in attendance, kept so revert can find it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementStamp {
    pub date: NaiveDate,
    pub fiscal_year: FiscalYear,
    pub year_month: YearMonth,
}

impl SettlementStamp {
    pub fn for_date(date: NaiveDate) -> Self {
        Self {
            date,
            fiscal_year: FiscalYear::containing(date),
            year_month: YearMonth::of(date),
        }
    }
}

/// One ledger credit owed to one worker for one role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerCredit {
    pub employee_id: EmployeeId,
    pub task: TaskType,
    pub amount: i64,
}

/// Even split of a role's total wage. Zero when nobody worked the role.
pub fn per_worker(total: i64, workers: usize) -> i64 {
    if workers == 0 {
        return 0;
    }
    total / workers as i64
}

/// Loading/unloading pay for one trip, settled as one ledger credit per worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripWage {
    pub id: TripWageId,
    pub org_id: OrgId,
    pub trip_id: TripId,
    pub dm_id: Option<DmId>,
    pub dm_number: Option<u64>,
    pub loading_workers: Vec<EmployeeId>,
    pub unloading_workers: Vec<EmployeeId>,
    pub total_loading_wage: i64,
    pub total_unloading_wage: i64,
    pub loading_wage_per_worker: Option<i64>,
    pub unloading_wage_per_worker: Option<i64>,
    pub status: WageStatus,
    pub ledger_entry_ids: Vec<LedgerEntryId>,
    pub payment_date: Option<NaiveDate>,
    pub attendance: Option<SettlementStamp>,
    pub processed_at: Option<DateTime<Utc>>,
    pub processed_by: Option<Actor>,
    pub created_at: DateTime<Utc>,
    pub created_by: Actor,
}

impl TripWage {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: TripWageId,
        org_id: OrgId,
        trip_id: TripId,
        dm_id: Option<DmId>,
        dm_number: Option<u64>,
        loading_workers: Vec<EmployeeId>,
        unloading_workers: Vec<EmployeeId>,
        total_loading_wage: i64,
        total_unloading_wage: i64,
        actor: Actor,
        at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if total_loading_wage < 0 || total_unloading_wage < 0 {
            return Err(DomainError::validation("wage totals must not be negative"));
        }
        let loading_workers = dedup(loading_workers);
        let unloading_workers = dedup(unloading_workers);

        Ok(Self {
            id,
            org_id,
            trip_id,
            dm_id,
            dm_number,
            loading_wage_per_worker: Some(per_worker(total_loading_wage, loading_workers.len())),
            unloading_wage_per_worker: Some(per_worker(
                total_unloading_wage,
                unloading_workers.len(),
            )),
            loading_workers,
            unloading_workers,
            total_loading_wage,
            total_unloading_wage,
            status: WageStatus::Pending,
            ledger_entry_ids: Vec::new(),
            payment_date: None,
            attendance: None,
            processed_at: None,
            processed_by: None,
            created_at: at,
            created_by: actor,
        })
    }

    pub fn is_processed(&self) -> bool {
        self.status == WageStatus::Processed
    }

    /// Reject settlement unless the record is complete and still pending.
    pub fn ensure_settleable(&self) -> DomainResult<()> {
        if self.is_processed() {
            return Err(DomainError::conflict(format!(
                "trip wage {} is already processed",
                self.id
            )));
        }
        if self.loading_wage_per_worker.is_none() || self.unloading_wage_per_worker.is_none() {
            return Err(DomainError::validation(
                "per-worker wages must be computed for both roles",
            ));
        }
        if self.dm_id.is_none() {
            return Err(DomainError::validation(
                "trip wage must reference a delivery memo",
            ));
        }
        if self.loading_workers.is_empty() && self.unloading_workers.is_empty() {
            return Err(DomainError::validation("trip wage lists no workers"));
        }
        Ok(())
    }

    /// Everyone who worked either role, each once.
    pub fn workers(&self) -> Vec<EmployeeId> {
        self.loading_workers
            .iter()
            .chain(self.unloading_workers.iter())
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Credits for one role. Zero-pay roles produce nothing.
    pub fn credits_for(&self, task: TaskType) -> Vec<WorkerCredit> {
        let (workers, rate) = match task {
            TaskType::Loading => (&self.loading_workers, self.loading_wage_per_worker),
            TaskType::Unloading => (&self.unloading_workers, self.unloading_wage_per_worker),
            TaskType::Dispatch | TaskType::Return => return Vec::new(),
        };
        let amount = rate.unwrap_or(0);
        if amount <= 0 {
            return Vec::new();
        }
        workers
            .iter()
            .map(|&employee_id| WorkerCredit {
                employee_id,
                task,
                amount,
            })
            .collect()
    }

    pub fn mark_processed(
        &mut self,
        entry_ids: Vec<LedgerEntryId>,
        stamp: SettlementStamp,
        payment_date: NaiveDate,
        actor: Actor,
        at: DateTime<Utc>,
    ) -> DomainResult<()> {
        if self.is_processed() {
            return Err(DomainError::conflict(format!(
                "trip wage {} is already processed",
                self.id
            )));
        }
        self.status = WageStatus::Processed;
        self.ledger_entry_ids = entry_ids;
        self.attendance = Some(stamp);
        self.payment_date = Some(payment_date);
        self.processed_at = Some(at);
        self.processed_by = Some(actor);
        Ok(())
    }
}

fn dedup(workers: Vec<EmployeeId>) -> Vec<EmployeeId> {
    let mut seen = BTreeSet::new();
    workers.into_iter().filter(|w| seen.insert(*w)).collect()
}
