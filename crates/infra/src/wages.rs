//! Trip wage settlement and reversal.
//!
//! Settlement writes one ledger credit per worker per role in chunked atomic
//! batches, then records attendance and marks the wage processed in a single
//! transaction. The two phases are separate commits: a failure between them
//! is reported with the entries already created and left for revert.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use haulbook_core::{Actor, EmployeeId, LedgerEntryId, TripId, TripWageId};
use haulbook_ledger::{EntryCategory, EntryDraft, EntryOrigin, EntryType, LedgerAccount, TaskType};
use haulbook_trips::{DeliveryMemo, Trip};
use haulbook_wages::{AttendanceRecord, SettlementStamp, TripWage, chunk_size};

use crate::collaborators::LedgerService;
use crate::error::{EngineError, EngineResult};
use crate::retry::retry_on_conflict;
use crate::store::{SharedStore, Transaction, load, memo_doc_id};

/// Each ledger entry is written together with its idempotency claim.
const WRITES_PER_ENTRY: usize = 2;

/// Input for recording a trip's loading/unloading pay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTripWage {
    pub trip_id: TripId,
    #[serde(default)]
    pub loading_workers: Vec<EmployeeId>,
    #[serde(default)]
    pub unloading_workers: Vec<EmployeeId>,
    pub total_loading_wage: i64,
    pub total_unloading_wage: i64,
}

#[derive(Clone)]
pub struct WageService {
    store: SharedStore,
    ledger: Arc<dyn LedgerService>,
    batch_write_limit: usize,
    max_attempts: u32,
}

impl WageService {
    pub fn new(
        store: SharedStore,
        ledger: Arc<dyn LedgerService>,
        batch_write_limit: usize,
        max_attempts: u32,
    ) -> Self {
        Self {
            store,
            ledger,
            batch_write_limit,
            max_attempts,
        }
    }

    fn entries_per_chunk(&self) -> usize {
        chunk_size(self.batch_write_limit, WRITES_PER_ENTRY)
    }

    /// Store a pending wage record for a trip, computing per-worker pay.
    #[instrument(skip(self, input, actor), fields(trip_id = %input.trip_id), err)]
    pub async fn record_trip_wage(&self, input: NewTripWage, actor: Actor) -> EngineResult<TripWage> {
        let trip = load::<Trip>(&*self.store, &input.trip_id.to_string())
            .await?
            .ok_or_else(|| EngineError::not_found(format!("trip {}", input.trip_id)))?;

        let wage = TripWage::new(
            TripWageId::new(),
            trip.org_id,
            trip.id,
            trip.dispatch_memo_id().cloned(),
            trip.dispatch_dm_number.or(trip.dm_number),
            input.loading_workers,
            input.unloading_workers,
            input.total_loading_wage,
            input.total_unloading_wage,
            actor,
            Utc::now(),
        )?;

        let mut tx = Transaction::begin(&*self.store);
        tx.create(&wage)?;
        tx.commit().await?;
        info!(trip_wage_id = %wage.id, workers = wage.workers().len(), "trip wage recorded");
        Ok(wage)
    }

    pub async fn get_trip_wage(&self, id: TripWageId) -> EngineResult<TripWage> {
        load::<TripWage>(&*self.store, &id.to_string())
            .await?
            .ok_or_else(|| EngineError::not_found(format!("trip wage {id}")))
    }

    /// Pay every worker and record their attendance.
    ///
    /// On failure after entries were written, returns
    /// `EngineError::PartialSettlement` listing them; the record stays pending.
    #[instrument(skip(self, actor), fields(trip_wage_id = %id), err)]
    pub async fn settle_trip_wage(
        &self,
        id: TripWageId,
        payment_date: NaiveDate,
        actor: Actor,
    ) -> EngineResult<Vec<LedgerEntryId>> {
        let wage = self.get_trip_wage(id).await?;
        wage.ensure_settleable()?;
        let stamp = SettlementStamp::for_date(self.trip_date(&wage).await?.unwrap_or(payment_date));

        let mut created: Vec<LedgerEntryId> = Vec::new();
        for task in [TaskType::Loading, TaskType::Unloading] {
            let drafts: Vec<EntryDraft> = wage
                .credits_for(task)
                .into_iter()
                .map(|credit| EntryDraft {
                    org_id: wage.org_id,
                    account: LedgerAccount::employee(credit.employee_id),
                    entry_type: EntryType::Credit,
                    category: EntryCategory::WageCredit,
                    amount: credit.amount,
                    origin: EntryOrigin::wage(wage.id, wage.trip_id, task),
                    fiscal_year: stamp.fiscal_year,
                    entry_date: payment_date,
                    description: wage.dm_id.as_ref().map(|dm| format!("{} {dm}", task.as_str())),
                })
                .collect();

            for chunk in drafts.chunks(self.entries_per_chunk()) {
                match self.ledger.create_entries(chunk.to_vec(), actor).await {
                    Ok(ids) => created.extend(ids),
                    Err(source) => return Err(partial(id, created, source)),
                }
            }
        }

        let attendance = retry_on_conflict("settle_attendance", self.max_attempts, || {
            self.record_attendance_once(id, &created, stamp, payment_date, actor)
        })
        .await;
        if let Err(source) = attendance {
            return Err(partial(id, created, source));
        }

        info!(
            trip_wage_id = %id,
            entries = created.len(),
            date = %stamp.date,
            "trip wage settled"
        );
        Ok(created)
    }

    /// Trip date from the wage's memo, if the memo can be found.
    async fn trip_date(&self, wage: &TripWage) -> EngineResult<Option<NaiveDate>> {
        let Some(dm_id) = &wage.dm_id else {
            return Ok(None);
        };
        let memo = load::<DeliveryMemo>(&*self.store, &memo_doc_id(wage.org_id, dm_id)).await?;
        if memo.is_none() {
            warn!(trip_wage_id = %wage.id, %dm_id, "memo not found, using payment date");
        }
        Ok(memo.map(|m| m.scheduled_date))
    }

    async fn record_attendance_once(
        &self,
        id: TripWageId,
        entry_ids: &[LedgerEntryId],
        stamp: SettlementStamp,
        payment_date: NaiveDate,
        actor: Actor,
    ) -> EngineResult<()> {
        let at = Utc::now();
        let mut tx = Transaction::begin(&*self.store);
        let mut wage = tx
            .get::<TripWage>(&id.to_string())
            .await?
            .ok_or_else(|| EngineError::not_found(format!("trip wage {id}")))?;

        let mut records = Vec::new();
        for employee_id in wage.workers() {
            let record = tx
                .get::<AttendanceRecord>(&AttendanceRecord::key(
                    employee_id,
                    stamp.fiscal_year,
                    stamp.year_month,
                ))
                .await?
                .unwrap_or_else(|| {
                    AttendanceRecord::new(
                        wage.org_id,
                        employee_id,
                        stamp.fiscal_year,
                        stamp.year_month,
                        at,
                    )
                });
            records.push(record);
        }

        for mut record in records {
            if record.add_contribution(stamp.date, id, at) {
                tx.set(&record)?;
            }
        }
        wage.mark_processed(entry_ids.to_vec(), stamp, payment_date, actor, at)?;
        tx.set(&wage)?;
        tx.commit().await?;
        Ok(())
    }

    /// Undo a settlement: delete its entries, strip its attendance and delete
    /// the wage record. Returns how many entries were deleted.
    #[instrument(skip(self), fields(trip_wage_id = %id), err)]
    pub async fn revert_trip_wage(&self, id: TripWageId) -> EngineResult<usize> {
        let wage = self.get_trip_wage(id).await?;

        let entry_ids: Vec<LedgerEntryId> = if wage.is_processed() {
            wage.ledger_entry_ids.clone()
        } else {
            // A failed settlement leaves entries the record never listed.
            self.ledger
                .entries_for_settlement(wage.org_id, id)
                .await?
                .into_iter()
                .map(|e| e.id)
                .collect()
        };

        let mut deleted = 0;
        for chunk in entry_ids.chunks(self.entries_per_chunk()) {
            match self.ledger.delete_entries(chunk).await {
                Ok(n) => deleted += n,
                Err(err) => {
                    warn!(trip_wage_id = %id, chunk = chunk.len(), error = %err, "entry deletion failed, continuing")
                }
            }
        }

        retry_on_conflict("revert_attendance", self.max_attempts, || {
            self.strip_attendance_once(id)
        })
        .await?;

        info!(trip_wage_id = %id, deleted, "trip wage reverted");
        Ok(deleted)
    }

    async fn strip_attendance_once(&self, id: TripWageId) -> EngineResult<()> {
        let at = Utc::now();
        let mut tx = Transaction::begin(&*self.store);
        let Some(wage) = tx.get::<TripWage>(&id.to_string()).await? else {
            return Ok(());
        };

        let mut records = Vec::new();
        if let Some(stamp) = wage.attendance {
            for employee_id in wage.workers() {
                if let Some(record) = tx
                    .get::<AttendanceRecord>(&AttendanceRecord::key(
                        employee_id,
                        stamp.fiscal_year,
                        stamp.year_month,
                    ))
                    .await?
                {
                    records.push(record);
                }
            }
        }

        for mut record in records {
            if record.remove_contribution(id, at) {
                tx.set(&record)?;
            }
        }
        tx.delete::<TripWage>(&id.to_string());
        tx.commit().await?;
        Ok(())
    }
}

fn partial(trip_wage_id: TripWageId, created: Vec<LedgerEntryId>, source: EngineError) -> EngineError {
    if created.is_empty() {
        return source;
    }
    warn!(%trip_wage_id, created = created.len(), error = %source, "settlement left partial entries");
    EngineError::PartialSettlement {
        trip_wage_id,
        created,
        source: Box::new(source),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::StoreLedgerService;
    use crate::store::{InMemoryDocumentStore, WriteBatch};
    use haulbook_core::{FiscalYear, OrgId};
    use haulbook_trips::DmId;
    use haulbook_wages::YearMonth;

    fn services(limit: usize) -> (SharedStore, WageService) {
        let store: SharedStore = Arc::new(InMemoryDocumentStore::with_write_limit(limit));
        let ledger = Arc::new(StoreLedgerService::new(store.clone(), 5));
        (store.clone(), WageService::new(store, ledger, limit, 5))
    }

    async fn seed_wage(store: &SharedStore, loading: Vec<EmployeeId>, unloading: Vec<EmployeeId>) -> TripWage {
        let fy = FiscalYear::starting(2024);
        let wage = TripWage::new(
            TripWageId::new(),
            OrgId::new(),
            TripId::new(),
            Some(DmId::new(fy, 7)),
            Some(7),
            loading,
            unloading,
            900,
            600,
            Actor::system(),
            Utc::now(),
        )
        .unwrap();
        let mut batch = WriteBatch::new();
        batch.set(&wage).unwrap();
        batch.commit(&**store).await.unwrap();
        wage
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 8, 5).unwrap()
    }

    #[tokio::test]
    async fn settlement_is_chunked_under_a_small_write_limit() {
        // four entries per batch; the attendance commit (five records and
        // the wage) still fits
        let (store, wages) = services(8);
        let workers: Vec<EmployeeId> = (0..5).map(|_| EmployeeId::new()).collect();
        let wage = seed_wage(&store, workers.clone(), workers[..2].to_vec()).await;

        let ids = wages.settle_trip_wage(wage.id, date(), Actor::system()).await.unwrap();
        assert_eq!(ids.len(), 7);

        let settled = wages.get_trip_wage(wage.id).await.unwrap();
        assert!(settled.is_processed());
        assert_eq!(settled.ledger_entry_ids, ids);

        // memo missing, so attendance falls back to the payment date
        let ym = YearMonth::of(date());
        let record: AttendanceRecord = load(
            &*store,
            &AttendanceRecord::key(workers[0], FiscalYear::containing(date()), ym),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(record.total_trips_worked, 1);
        assert_eq!(record.days[0].date, date());
    }

    #[tokio::test]
    async fn processed_wage_cannot_be_settled_twice() {
        let (store, wages) = services(500);
        let wage = seed_wage(&store, vec![EmployeeId::new()], vec![]).await;

        wages.settle_trip_wage(wage.id, date(), Actor::system()).await.unwrap();
        let err = wages
            .settle_trip_wage(wage.id, date(), Actor::system())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Domain(haulbook_core::DomainError::Conflict(_))));
    }

    #[tokio::test]
    async fn revert_of_unprocessed_wage_sweeps_tagged_entries() {
        let (store, wages) = services(500);
        let worker = EmployeeId::new();
        let wage = seed_wage(&store, vec![worker], vec![]).await;

        // entries written by a settlement that never reached attendance
        let ledger = StoreLedgerService::new(store.clone(), 5);
        let draft = EntryDraft {
            org_id: wage.org_id,
            account: LedgerAccount::employee(worker),
            entry_type: EntryType::Credit,
            category: EntryCategory::WageCredit,
            amount: 900,
            origin: EntryOrigin::wage(wage.id, wage.trip_id, TaskType::Loading),
            fiscal_year: FiscalYear::containing(date()),
            entry_date: date(),
            description: None,
        };
        ledger.create_entries(vec![draft], Actor::system()).await.unwrap();

        assert_eq!(wages.revert_trip_wage(wage.id).await.unwrap(), 1);
        assert!(ledger.entries_for_settlement(wage.org_id, wage.id).await.unwrap().is_empty());
        assert!(wages.get_trip_wage(wage.id).await.unwrap_err().is_not_found());
    }
}
