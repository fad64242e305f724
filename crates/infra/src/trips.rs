//! Trip status state machine.
//!
//! The status change (and, on return, the return memo with its counter
//! increment) commits in one transaction. The cascade runs afterwards and
//! never undoes it.

use chrono::{DateTime, Utc};
use tracing::{info, instrument};

use haulbook_core::{Actor, OrderId, TripId};
use haulbook_trips::{Order, StatusTransition, Trip, TripMirror, TripPlan, TripStatus};

use crate::cascade::{CascadeReport, CascadeRouter};
use crate::error::{EngineError, EngineResult};
use crate::memos::mint_return_memo;
use crate::retry::retry_on_conflict;
use crate::store::{SharedStore, Transaction, load};

/// Result of a status update request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusUpdate {
    Transitioned {
        transition: StatusTransition,
        trip: Box<Trip>,
        cascade: CascadeReport,
    },
    /// Requested status equals the current one; nothing ran.
    Unchanged { trip: Box<Trip> },
}

impl StatusUpdate {
    pub fn trip(&self) -> &Trip {
        match self {
            StatusUpdate::Transitioned { trip, .. } | StatusUpdate::Unchanged { trip } => trip,
        }
    }
}

#[derive(Clone)]
pub struct TripService {
    store: SharedStore,
    cascade: CascadeRouter,
    max_attempts: u32,
}

impl TripService {
    pub fn new(store: SharedStore, cascade: CascadeRouter, max_attempts: u32) -> Self {
        Self {
            store,
            cascade,
            max_attempts,
        }
    }

    /// Create a scheduled trip against an order and add it to the order's
    /// trip summaries.
    #[instrument(skip(self, plan, actor), fields(order_id = %order_id), err)]
    pub async fn schedule_trip(
        &self,
        order_id: OrderId,
        plan: TripPlan,
        actor: Actor,
    ) -> EngineResult<Trip> {
        let trip_id = TripId::new();
        let trip = retry_on_conflict("schedule_trip", self.max_attempts, || {
            self.schedule_once(trip_id, order_id, &plan)
        })
        .await?;
        info!(%trip_id, %order_id, actor_id = %actor.id, "trip scheduled");
        Ok(trip)
    }

    async fn schedule_once(
        &self,
        trip_id: TripId,
        order_id: OrderId,
        plan: &TripPlan,
    ) -> EngineResult<Trip> {
        let at = Utc::now();
        let mut tx = Transaction::begin(&*self.store);
        let mut order = tx
            .get::<Order>(&order_id.to_string())
            .await?
            .ok_or_else(|| EngineError::not_found(format!("order {order_id}")))?;

        let trip = Trip::schedule(trip_id, &order, plan.clone(), at)?;
        order.mirror_trip(TripMirror::from_trip(&trip, false));
        tx.create(&trip)?;
        tx.set(&order)?;
        tx.commit().await?;
        Ok(trip)
    }

    pub async fn get_trip(&self, trip_id: TripId) -> EngineResult<Trip> {
        load::<Trip>(&*self.store, &trip_id.to_string())
            .await?
            .ok_or_else(|| EngineError::not_found(format!("trip {trip_id}")))
    }

    /// Move a trip to `new_status` and run the cascade.
    ///
    /// Rejections (dispatch without a memo) leave the stored trip untouched.
    /// Cascade failures are reported in the result, not as an error.
    #[instrument(
        skip(self, actor, photo_url),
        fields(trip_id = %trip_id, new_status = new_status.as_str(), actor_role = actor.role.as_str()),
        err
    )]
    pub async fn update_trip_status(
        &self,
        trip_id: TripId,
        new_status: TripStatus,
        actor: Actor,
        photo_url: Option<String>,
    ) -> EngineResult<StatusUpdate> {
        let (trip, transition, at) =
            retry_on_conflict("update_trip_status", self.max_attempts, || {
                self.transition_once(trip_id, new_status, actor, photo_url.clone())
            })
            .await?;

        if transition.is_noop() {
            return Ok(StatusUpdate::Unchanged {
                trip: Box::new(trip),
            });
        }
        info!(
            %trip_id,
            before = transition.before.as_str(),
            after = transition.after.as_str(),
            dm_number = ?trip.dm_number,
            "trip status changed"
        );

        let cascade = self.cascade.run(&trip, transition, actor, at).await;
        Ok(StatusUpdate::Transitioned {
            transition,
            trip: Box::new(trip),
            cascade,
        })
    }

    async fn transition_once(
        &self,
        trip_id: TripId,
        new_status: TripStatus,
        actor: Actor,
        photo_url: Option<String>,
    ) -> EngineResult<(Trip, StatusTransition, DateTime<Utc>)> {
        let at = Utc::now();
        let mut tx = Transaction::begin(&*self.store);
        let mut trip = tx
            .get::<Trip>(&trip_id.to_string())
            .await?
            .ok_or_else(|| EngineError::not_found(format!("trip {trip_id}")))?;

        let transition = trip.apply_status(new_status, actor, at, photo_url)?;
        if transition.is_noop() {
            return Ok((trip, transition, at));
        }
        if transition.after == TripStatus::Returned {
            mint_return_memo(&mut tx, &mut trip, at).await?;
        }
        tx.set(&trip)?;
        tx.commit().await?;
        Ok((trip, transition, at))
    }
}
