//! Cascade router: runs the effects a committed status transition requires.
//!
//! Every effect is isolated. A failing effect is logged and reported, never
//! propagated, and the remaining effects still run. Effects are idempotent
//! through markers (memo status, cancelled flag, ledger idempotency keys), so
//! running the same transition twice changes nothing the second time.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use haulbook_core::{Actor, DomainResult, FiscalYear, LedgerEntryId, TripId};
use haulbook_ledger::{
    EntryCategory, EntryDraft, EntryOrigin, EntryType, IdempotencyKey, LedgerAccount, TaskType,
};
use haulbook_trips::{
    CascadeEffect, DeliveryMemo, MemoSource, MemoStatus, StatusTransition, Trip, TripEventKind,
    TripMirror, TripNotification, TripStatus, effects_for,
};

use crate::collaborators::{LedgerService, Notifier, OrderService};
use crate::error::{EngineError, EngineResult};
use crate::memos::MemoService;
use crate::retry::retry_on_conflict;
use crate::store::{Document, Filter, SharedStore, StoreError, Transaction, find};

/// What happened to each effect of one transition.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CascadeReport {
    pub applied: Vec<CascadeEffect>,
    /// Effects with nothing to act on (order gone, memo already in place).
    pub skipped: Vec<CascadeEffect>,
    pub failed: Vec<(CascadeEffect, String)>,
}

impl CascadeReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

enum EffectOutcome {
    Applied,
    Skipped,
}

#[derive(Clone)]
pub struct CascadeRouter {
    store: SharedStore,
    orders: Arc<dyn OrderService>,
    ledger: Arc<dyn LedgerService>,
    notifier: Arc<dyn Notifier>,
    memos: MemoService,
    max_attempts: u32,
}

impl CascadeRouter {
    pub fn new(
        store: SharedStore,
        orders: Arc<dyn OrderService>,
        ledger: Arc<dyn LedgerService>,
        notifier: Arc<dyn Notifier>,
        memos: MemoService,
        max_attempts: u32,
    ) -> Self {
        Self {
            store,
            orders,
            ledger,
            notifier,
            memos,
            max_attempts,
        }
    }

    /// Run every effect of `transition` against the committed `trip`.
    #[instrument(
        skip(self, trip, actor),
        fields(trip_id = %trip.id, before = transition.before.as_str(), after = transition.after.as_str())
    )]
    pub async fn run(
        &self,
        trip: &Trip,
        transition: StatusTransition,
        actor: Actor,
        at: DateTime<Utc>,
    ) -> CascadeReport {
        let mut report = CascadeReport::default();
        for effect in effects_for(transition) {
            match self.apply(effect, trip, actor, at).await {
                Ok(EffectOutcome::Applied) => {
                    debug!(?effect, "cascade effect applied");
                    report.applied.push(effect);
                }
                Ok(EffectOutcome::Skipped) => report.skipped.push(effect),
                Err(err) if err.is_not_found() => {
                    warn!(?effect, error = %err, "cascade effect skipped, target not found");
                    report.skipped.push(effect);
                }
                Err(err) => {
                    warn!(?effect, error = %err, "cascade effect failed");
                    report.failed.push((effect, err.to_string()));
                }
            }
        }
        report
    }

    async fn apply(
        &self,
        effect: CascadeEffect,
        trip: &Trip,
        actor: Actor,
        at: DateTime<Utc>,
    ) -> EngineResult<EffectOutcome> {
        match effect {
            CascadeEffect::MirrorOrder { clear_stale } => {
                self.orders
                    .mirror_trip_status(trip.order_id, TripMirror::from_trip(trip, clear_stale))
                    .await?;
                Ok(EffectOutcome::Applied)
            }
            CascadeEffect::CreateDispatchEntry => {
                if !trip.payment_type.requires_dispatch_entry() {
                    return Ok(EffectOutcome::Skipped);
                }
                self.create_trip_entry(trip, TaskType::Dispatch, EntryCategory::Advance, actor, at)
                    .await
            }
            CascadeEffect::CreateReturnEntry => {
                if !trip.payment_type.requires_return_entry() {
                    return Ok(EffectOutcome::Skipped);
                }
                self.create_trip_entry(trip, TaskType::Return, EntryCategory::WagePending, actor, at)
                    .await
            }
            CascadeEffect::CancelDispatchEntry => {
                self.cancel_trip_entry(trip, TaskType::Dispatch, trip.dispatch_entry_id, actor)
                    .await
            }
            CascadeEffect::CancelReturnEntry => {
                self.cancel_trip_entry(trip, TaskType::Return, trip.return_entry_id, actor)
                    .await
            }
            CascadeEffect::StampDelivery => {
                let (delivered_at, delivered_by, photo) = (
                    trip.delivered_at.unwrap_or(at),
                    trip.delivered_by.or(Some(actor)),
                    trip.delivery_photo_url.clone(),
                );
                self.update_dispatch_memo(trip, &[MemoStatus::Active], |memo| {
                    memo.stamp_delivery(delivered_at, delivered_by, photo.clone())
                        .map(|()| true)
                })
                .await
            }
            CascadeEffect::RevertDelivery => {
                self.update_dispatch_memo(trip, &[MemoStatus::Delivered], |memo| {
                    memo.revert_delivery().map(|()| true)
                })
                .await
            }
            CascadeEffect::StampReturn => {
                let (returned_at, returned_by) =
                    (trip.returned_at.unwrap_or(at), trip.returned_by.or(Some(actor)));
                self.update_dispatch_memo(
                    trip,
                    &[MemoStatus::Active, MemoStatus::Delivered],
                    |memo| memo.stamp_return(returned_at, returned_by),
                )
                .await
            }
            CascadeEffect::RevertReturn => {
                self.update_dispatch_memo(trip, &[MemoStatus::Returned], |memo| {
                    memo.revert_return().map(|()| true)
                })
                .await
            }
            CascadeEffect::EnsureReturnMemo => {
                match self.memos.ensure_return_memo(trip.id, at).await? {
                    Some(_) => Ok(EffectOutcome::Applied),
                    None => Ok(EffectOutcome::Skipped),
                }
            }
            CascadeEffect::Notify => {
                let kind = match trip.trip_status {
                    TripStatus::Dispatched => TripEventKind::Dispatched,
                    TripStatus::Delivered => TripEventKind::Delivered,
                    TripStatus::Scheduled | TripStatus::Returned => {
                        return Ok(EffectOutcome::Skipped);
                    }
                };
                let notification = TripNotification {
                    kind,
                    org_id: trip.org_id,
                    trip_id: trip.id,
                    dm_id: trip.dm_id.clone(),
                    client_name: trip.client_name.clone(),
                    client_phone: trip.client_phone.clone(),
                    vehicle_number: trip.vehicle_number.clone(),
                    occurred_at: at,
                };
                self.notifier.notify(&notification)?;
                Ok(EffectOutcome::Applied)
            }
        }
    }

    async fn create_trip_entry(
        &self,
        trip: &Trip,
        task: TaskType,
        category: EntryCategory,
        actor: Actor,
        at: DateTime<Utc>,
    ) -> EngineResult<EffectOutcome> {
        let amount = trip.pricing().total;
        if amount <= 0 {
            debug!(trip_id = %trip.id, task = task.as_str(), "zero-value trip, no entry");
            return Ok(EffectOutcome::Skipped);
        }
        let draft = EntryDraft {
            org_id: trip.org_id,
            account: LedgerAccount::client(trip.client_id),
            entry_type: EntryType::Credit,
            category,
            amount,
            origin: EntryOrigin::trip(trip.id, trip.order_id, trip.dm_number, task),
            fiscal_year: trip
                .fiscal_year
                .unwrap_or_else(|| FiscalYear::containing(at.date_naive())),
            entry_date: at.date_naive(),
            description: trip
                .dm_id
                .as_ref()
                .map(|dm| format!("{} {dm}", task.as_str())),
        };
        let entry_id = self.ledger.create_entry(draft, actor).await?;
        self.record_entry_ref(trip.id, task, Some(entry_id)).await?;
        info!(trip_id = %trip.id, %entry_id, task = task.as_str(), "trip ledger entry linked");
        Ok(EffectOutcome::Applied)
    }

    async fn cancel_trip_entry(
        &self,
        trip: &Trip,
        task: TaskType,
        entry_id: Option<LedgerEntryId>,
        actor: Actor,
    ) -> EngineResult<EffectOutcome> {
        // The reference write can fail after the entry committed; the key
        // claim still names the live entry.
        let entry_id = match entry_id {
            Some(id) => id,
            None => {
                let origin = EntryOrigin::trip(trip.id, trip.order_id, trip.dm_number, task);
                let key = IdempotencyKey::for_origin(&origin, &LedgerAccount::client(trip.client_id))?;
                match self.ledger.live_entry(trip.org_id, &key).await? {
                    Some(id) => {
                        warn!(
                            trip_id = %trip.id,
                            entry_id = %id,
                            task = task.as_str(),
                            "trip entry reference missing, cancelling by key"
                        );
                        id
                    }
                    None => return Ok(EffectOutcome::Skipped),
                }
            }
        };
        let cancelled = self.ledger.cancel_entry(entry_id, actor).await?;
        self.record_entry_ref(trip.id, task, None).await?;
        Ok(if cancelled {
            EffectOutcome::Applied
        } else {
            EffectOutcome::Skipped
        })
    }

    /// Store (or clear) the trip's reference to its dispatch/return entry.
    async fn record_entry_ref(
        &self,
        trip_id: TripId,
        task: TaskType,
        entry_id: Option<LedgerEntryId>,
    ) -> EngineResult<()> {
        retry_on_conflict("record_trip_entry_ref", self.max_attempts, || async move {
            let mut tx = Transaction::begin(&*self.store);
            let mut trip = tx
                .get::<Trip>(&trip_id.to_string())
                .await?
                .ok_or_else(|| EngineError::not_found(format!("trip {trip_id}")))?;
            let slot = match task {
                TaskType::Dispatch => &mut trip.dispatch_entry_id,
                TaskType::Return => &mut trip.return_entry_id,
                TaskType::Loading | TaskType::Unloading => return Ok(()),
            };
            if *slot == entry_id {
                return Ok(());
            }
            *slot = entry_id;
            tx.set(&trip)?;
            tx.commit().await?;
            Ok(())
        })
        .await
    }

    /// Apply `change` to the trip's dispatch memo if it is in one of
    /// `expected`. Skipped when no dispatch memo is in such a state.
    async fn update_dispatch_memo<F>(
        &self,
        trip: &Trip,
        expected: &[MemoStatus],
        change: F,
    ) -> EngineResult<EffectOutcome>
    where
        F: Fn(&mut DeliveryMemo) -> DomainResult<bool> + Sync,
    {
        let changed = retry_on_conflict("update_dispatch_memo", self.max_attempts, || {
            self.update_dispatch_memo_once(trip, expected, &change)
        })
        .await?;
        Ok(if changed {
            EffectOutcome::Applied
        } else {
            EffectOutcome::Skipped
        })
    }

    async fn update_dispatch_memo_once<F>(
        &self,
        trip: &Trip,
        expected: &[MemoStatus],
        change: &F,
    ) -> EngineResult<bool>
    where
        F: Fn(&mut DeliveryMemo) -> DomainResult<bool> + Sync,
    {
        let candidates: Vec<DeliveryMemo> = find(
            &*self.store,
            &[
                Filter::eq("orgId", trip.org_id.to_string()),
                Filter::eq("tripId", trip.id.to_string()),
                Filter::eq("source", MemoSource::Dispatch.as_str()),
            ],
        )
        .await?;
        let Some(found) = candidates
            .into_iter()
            .find(|m| expected.contains(&m.status))
        else {
            debug!(trip_id = %trip.id, ?expected, "no dispatch memo in expected state");
            return Ok(false);
        };

        let mut tx = Transaction::begin(&*self.store);
        let Some(mut memo) = tx.get::<DeliveryMemo>(&found.doc_id()).await? else {
            return Err(StoreError::Conflict(format!("memo {} vanished", found.id)).into());
        };
        if !expected.contains(&memo.status) {
            return Err(StoreError::Conflict(format!("memo {} changed state", memo.id)).into());
        }
        if !change(&mut memo)? {
            return Ok(false);
        }
        tx.set(&memo)?;
        tx.commit().await?;
        Ok(true)
    }
}
