//! Delivery memo minting and cancellation.
//!
//! A memo number, the memo document and the trip's memo reference always
//! commit in one transaction with the counter increment, so a committed memo
//! number is never orphaned and an aborted one is never issued.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};

use haulbook_core::{Actor, DomainError, FiscalYear, TripId};
use haulbook_trips::{
    DeliveryMemo, DmId, MemoSource, MemoStatus, Trip, TripMirror, TripStatus, project,
};

use crate::collaborators::OrderService;
use crate::error::{EngineError, EngineResult};
use crate::retry::retry_on_conflict;
use crate::sequence::issue_in;
use crate::store::{SharedStore, Transaction, memo_doc_id};

/// Result of a dispatch memo request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoOutcome {
    Created { memo_id: DmId, number: u64 },
    /// The trip already carries a memo; nothing was issued.
    AlreadyExists { memo_id: DmId, number: u64 },
}

impl MemoOutcome {
    pub fn memo_id(&self) -> &DmId {
        match self {
            MemoOutcome::Created { memo_id, .. } | MemoOutcome::AlreadyExists { memo_id, .. } => {
                memo_id
            }
        }
    }

    pub fn number(&self) -> u64 {
        match self {
            MemoOutcome::Created { number, .. } | MemoOutcome::AlreadyExists { number, .. } => {
                *number
            }
        }
    }
}

/// Memo numbers belong to the fiscal year of the day they are issued.
fn fiscal_year_at(at: DateTime<Utc>) -> FiscalYear {
    FiscalYear::containing(at.date_naive())
}

/// Mint the return-trigger memo for `trip` inside `tx`.
///
/// `trip` must already be in `returned` and every other read of the
/// transaction must be done, since this reads the counter. Returns `None`
/// when the trip already has a return memo. The caller writes the trip.
pub(crate) async fn mint_return_memo(
    tx: &mut Transaction<'_>,
    trip: &mut Trip,
    at: DateTime<Utc>,
) -> EngineResult<Option<DeliveryMemo>> {
    if trip.return_dm_id.is_some() {
        return Ok(None);
    }
    let fiscal_year = fiscal_year_at(at);
    let number = issue_in(tx, trip.org_id, fiscal_year, at).await?;

    // Projected before the trip is re-pointed so the memo records what it supersedes.
    let memo = project(trip, number, fiscal_year, MemoSource::ReturnTrigger, at);
    trip.attach_return_memo(memo.id.clone(), number, fiscal_year)?;
    trip.updated_at = at;
    tx.create(&memo)?;
    Ok(Some(memo))
}

#[derive(Clone)]
pub struct MemoService {
    store: SharedStore,
    orders: Arc<dyn OrderService>,
    max_attempts: u32,
}

impl MemoService {
    pub fn new(store: SharedStore, orders: Arc<dyn OrderService>, max_attempts: u32) -> Self {
        Self {
            store,
            orders,
            max_attempts,
        }
    }

    /// Issue the dispatch memo for a trip, or report the one it already has.
    #[instrument(skip(self, actor), fields(trip_id = %trip_id), err)]
    pub async fn generate_dispatch_memo(
        &self,
        trip_id: TripId,
        actor: Actor,
    ) -> EngineResult<MemoOutcome> {
        let (outcome, trip) = retry_on_conflict("generate_dispatch_memo", self.max_attempts, || {
            self.generate_once(trip_id)
        })
        .await?;

        if let MemoOutcome::Created { memo_id, number } = &outcome {
            info!(%trip_id, %memo_id, number, actor_id = %actor.id, "dispatch memo issued");
            self.mirror(&trip).await;
        }
        Ok(outcome)
    }

    async fn generate_once(&self, trip_id: TripId) -> EngineResult<(MemoOutcome, Trip)> {
        let at = Utc::now();
        let mut tx = Transaction::begin(&*self.store);
        let mut trip = tx
            .get::<Trip>(&trip_id.to_string())
            .await?
            .ok_or_else(|| EngineError::not_found(format!("trip {trip_id}")))?;

        if let (Some(memo_id), Some(number)) = (trip.dm_id.clone(), trip.dm_number) {
            return Ok((MemoOutcome::AlreadyExists { memo_id, number }, trip));
        }
        if trip.trip_status != TripStatus::Scheduled {
            return Err(DomainError::validation(format!(
                "trip is {}, memos are issued before dispatch",
                trip.trip_status.as_str()
            ))
            .into());
        }

        let fiscal_year = fiscal_year_at(at);
        let number = issue_in(&mut tx, trip.org_id, fiscal_year, at).await?;
        let memo = project(&trip, number, fiscal_year, MemoSource::Dispatch, at);

        trip.attach_dispatch_memo(memo.id.clone(), number, fiscal_year);
        trip.updated_at = at;
        tx.create(&memo)?;
        tx.set(&trip)?;
        tx.commit().await?;

        Ok((
            MemoOutcome::Created {
                memo_id: memo.id,
                number,
            },
            trip,
        ))
    }

    /// Cancel the trip's memo before dispatch. The number stays consumed.
    #[instrument(skip(self, reason, actor), fields(trip_id = %trip_id), err)]
    pub async fn cancel_memo(
        &self,
        trip_id: TripId,
        reason: String,
        actor: Actor,
    ) -> EngineResult<DmId> {
        let (memo_id, trip) = retry_on_conflict("cancel_memo", self.max_attempts, || {
            self.cancel_once(trip_id, &reason, actor)
        })
        .await?;
        info!(%trip_id, %memo_id, "memo cancelled");
        self.mirror(&trip).await;
        Ok(memo_id)
    }

    async fn cancel_once(
        &self,
        trip_id: TripId,
        reason: &str,
        actor: Actor,
    ) -> EngineResult<(DmId, Trip)> {
        let at = Utc::now();
        let mut tx = Transaction::begin(&*self.store);
        let mut trip = tx
            .get::<Trip>(&trip_id.to_string())
            .await?
            .ok_or_else(|| EngineError::not_found(format!("trip {trip_id}")))?;

        let (memo_id, return_memo_id) = trip.detach_memo()?;
        trip.updated_at = at;

        let mut memos = Vec::with_capacity(2);
        for id in std::iter::once(&memo_id).chain(return_memo_id.as_ref()) {
            match tx.get::<DeliveryMemo>(&memo_doc_id(trip.org_id, id)).await? {
                Some(memo) => memos.push(memo),
                None => warn!(%trip_id, memo_id = %id, "memo document missing, detaching reference only"),
            }
        }
        for mut memo in memos {
            if memo.status == MemoStatus::Cancelled {
                continue;
            }
            memo.cancel(&trip, reason, actor, at)?;
            tx.set(&memo)?;
        }
        tx.set(&trip)?;
        tx.commit().await?;
        Ok((memo_id, trip))
    }

    /// Make sure a returned trip has its return memo. Safe to call repeatedly:
    /// the trip's return marker decides, not the memo collection.
    #[instrument(skip(self), fields(trip_id = %trip_id), err)]
    pub async fn ensure_return_memo(
        &self,
        trip_id: TripId,
        at: DateTime<Utc>,
    ) -> EngineResult<Option<DmId>> {
        let minted = retry_on_conflict("ensure_return_memo", self.max_attempts, || {
            self.ensure_return_once(trip_id, at)
        })
        .await?;
        if let Some((memo_id, trip)) = &minted {
            info!(%trip_id, %memo_id, "return memo issued");
            self.mirror(trip).await;
        }
        Ok(minted.map(|(memo_id, _)| memo_id))
    }

    async fn ensure_return_once(
        &self,
        trip_id: TripId,
        at: DateTime<Utc>,
    ) -> EngineResult<Option<(DmId, Trip)>> {
        let mut tx = Transaction::begin(&*self.store);
        let mut trip = tx
            .get::<Trip>(&trip_id.to_string())
            .await?
            .ok_or_else(|| EngineError::not_found(format!("trip {trip_id}")))?;
        if trip.trip_status != TripStatus::Returned {
            return Ok(None);
        }
        let Some(memo) = mint_return_memo(&mut tx, &mut trip, at).await? else {
            return Ok(None);
        };
        tx.set(&trip)?;
        tx.commit().await?;
        Ok(Some((memo.id, trip)))
    }

    async fn mirror(&self, trip: &Trip) {
        if let Err(err) = self
            .orders
            .mirror_trip_status(trip.order_id, TripMirror::from_trip(trip, false))
            .await
        {
            warn!(trip_id = %trip.id, order_id = %trip.order_id, error = %err, "order mirror skipped");
        }
    }
}
