//! Org-scoped loaders shared by the handlers.
//!
//! A record belonging to another organization answers exactly like a
//! missing one.

use axum::{http::StatusCode, response::Response};

use haulbook_core::{OrderId, TripId, TripWageId};
use haulbook_trips::{Order, Trip};
use haulbook_wages::TripWage;

use crate::app::errors;
use crate::app::services::AppServices;
use crate::context::RequestContext;

pub async fn trip_in_org(
    services: &AppServices,
    ctx: &RequestContext,
    trip_id: TripId,
) -> Result<Trip, Response> {
    let trip = services
        .engine
        .trips
        .get_trip(trip_id)
        .await
        .map_err(errors::engine_error_to_response)?;
    if trip.org_id != ctx.org_id() {
        return Err(not_found(format!("trip {trip_id}")));
    }
    Ok(trip)
}

pub async fn order_in_org(
    services: &AppServices,
    ctx: &RequestContext,
    order_id: OrderId,
) -> Result<Order, Response> {
    match services.engine.orders.get_order(order_id).await {
        Ok(Some(order)) if order.org_id == ctx.org_id() => Ok(order),
        Ok(_) => Err(not_found(format!("order {order_id}"))),
        Err(e) => Err(errors::engine_error_to_response(e)),
    }
}

pub async fn wage_in_org(
    services: &AppServices,
    ctx: &RequestContext,
    id: TripWageId,
) -> Result<TripWage, Response> {
    let wage = services
        .engine
        .wages
        .get_trip_wage(id)
        .await
        .map_err(errors::engine_error_to_response)?;
    if wage.org_id != ctx.org_id() {
        return Err(not_found(format!("trip wage {id}")));
    }
    Ok(wage)
}

fn not_found(what: String) -> Response {
    errors::json_error(StatusCode::NOT_FOUND, "not_found", format!("not found: {what}"))
}
