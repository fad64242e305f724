use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{info, instrument};

use haulbook_core::{OrderId, TripId};
use haulbook_trips::{Order, Trip, TripMirror};

use crate::error::{EngineError, EngineResult};
use crate::retry::retry_on_conflict;
use crate::store::{Filter, SharedStore, Transaction, find, load};

/// The order side of a trip: summary mirroring and deletion.
#[async_trait]
pub trait OrderService: Send + Sync {
    async fn get_order(&self, order_id: OrderId) -> EngineResult<Option<Order>>;

    /// Store an order as given (orders are created upstream).
    async fn register_order(&self, order: Order) -> EngineResult<()>;

    /// Copy trip fields into the order's embedded summary.
    /// Fails with not-found if the order is gone.
    async fn mirror_trip_status(&self, order_id: OrderId, mirror: TripMirror) -> EngineResult<()>;

    /// Remove the order and flag its trips. Returns how many trips were flagged.
    async fn delete_order(&self, order_id: OrderId, at: DateTime<Utc>) -> EngineResult<usize>;
}

#[derive(Clone)]
pub struct StoreOrderService {
    store: SharedStore,
    max_attempts: u32,
}

impl StoreOrderService {
    pub fn new(store: SharedStore, max_attempts: u32) -> Self {
        Self {
            store,
            max_attempts,
        }
    }

    async fn mirror_once(&self, order_id: OrderId, mirror: &TripMirror) -> EngineResult<()> {
        let mut tx = Transaction::begin(&*self.store);
        let mut order = tx
            .get::<Order>(&order_id.to_string())
            .await?
            .ok_or_else(|| EngineError::not_found(format!("order {order_id}")))?;
        order.mirror_trip(mirror.clone());
        tx.set(&order)?;
        tx.commit().await?;
        Ok(())
    }

    async fn flag_trip_once(&self, trip_id: TripId, at: DateTime<Utc>) -> EngineResult<()> {
        let mut tx = Transaction::begin(&*self.store);
        let Some(mut trip) = tx.get::<Trip>(&trip_id.to_string()).await? else {
            return Ok(());
        };
        if trip.order_deleted {
            return Ok(());
        }
        trip.mark_order_deleted(at);
        tx.set(&trip)?;
        tx.commit().await?;
        Ok(())
    }

    async fn delete_once(&self, order_id: OrderId) -> EngineResult<bool> {
        let mut tx = Transaction::begin(&*self.store);
        if tx.get::<Order>(&order_id.to_string()).await?.is_none() {
            return Ok(false);
        }
        tx.delete::<Order>(&order_id.to_string());
        tx.commit().await?;
        Ok(true)
    }
}

#[async_trait]
impl OrderService for StoreOrderService {
    async fn get_order(&self, order_id: OrderId) -> EngineResult<Option<Order>> {
        Ok(load::<Order>(&*self.store, &order_id.to_string()).await?)
    }

    #[instrument(skip(self, order), fields(order_id = %order.id), err)]
    async fn register_order(&self, order: Order) -> EngineResult<()> {
        let mut tx = Transaction::begin(&*self.store);
        tx.create(&order)?;
        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self, mirror), fields(order_id = %order_id, trip_id = %mirror.trip_id), err)]
    async fn mirror_trip_status(&self, order_id: OrderId, mirror: TripMirror) -> EngineResult<()> {
        retry_on_conflict("mirror_trip_status", self.max_attempts, || {
            self.mirror_once(order_id, &mirror)
        })
        .await
    }

    #[instrument(skip(self), fields(order_id = %order_id), err)]
    async fn delete_order(&self, order_id: OrderId, at: DateTime<Utc>) -> EngineResult<usize> {
        let trips: Vec<Trip> =
            find(&*self.store, &[Filter::eq("orderId", order_id.to_string())]).await?;

        for trip in &trips {
            retry_on_conflict("flag_trip_order_deleted", self.max_attempts, || {
                self.flag_trip_once(trip.id, at)
            })
            .await?;
        }

        let deleted = retry_on_conflict("delete_order", self.max_attempts, || {
            self.delete_once(order_id)
        })
        .await?;
        if !deleted {
            return Err(EngineError::not_found(format!("order {order_id}")));
        }

        info!(%order_id, flagged_trips = trips.len(), "order deleted, trips kept");
        Ok(trips.len())
    }
}
