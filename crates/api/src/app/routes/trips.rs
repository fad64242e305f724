use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use haulbook_core::TripId;
use haulbook_infra::MemoOutcome;

use crate::app::routes::common;
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::RequestContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(schedule_trip))
        .route("/:id", get(get_trip))
        .route("/:id/status", post(update_status))
        .route("/:id/memo", post(generate_memo))
        .route("/:id/memo/cancel", post(cancel_memo))
}

pub async fn schedule_trip(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Json(body): Json<dto::ScheduleTripRequest>,
) -> axum::response::Response {
    if let Err(resp) = common::order_in_org(&services, &ctx, body.order_id).await {
        return resp;
    }

    match services
        .engine
        .trips
        .schedule_trip(body.order_id, body.plan, ctx.actor())
        .await
    {
        Ok(trip) => (StatusCode::CREATED, Json(trip)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn get_trip(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let trip_id = match errors::parse_id::<TripId>(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match common::trip_in_org(&services, &ctx, trip_id).await {
        Ok(trip) => (StatusCode::OK, Json(trip)).into_response(),
        Err(resp) => resp,
    }
}

/// Move a trip to a new status. Cascade failures are reported in the body;
/// the status change itself has already committed.
pub async fn update_status(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateStatusRequest>,
) -> axum::response::Response {
    let trip_id = match errors::parse_id::<TripId>(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    if let Err(resp) = common::trip_in_org(&services, &ctx, trip_id).await {
        return resp;
    }

    match services
        .engine
        .trips
        .update_trip_status(trip_id, body.status, ctx.actor(), body.photo_url)
        .await
    {
        Ok(update) => (StatusCode::OK, Json(dto::status_update_to_json(&update))).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn generate_memo(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let trip_id = match errors::parse_id::<TripId>(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    if let Err(resp) = common::trip_in_org(&services, &ctx, trip_id).await {
        return resp;
    }

    match services
        .engine
        .memos
        .generate_dispatch_memo(trip_id, ctx.actor())
        .await
    {
        Ok(outcome) => {
            let status = match outcome {
                MemoOutcome::Created { .. } => StatusCode::CREATED,
                MemoOutcome::AlreadyExists { .. } => StatusCode::OK,
            };
            (status, Json(dto::memo_outcome_to_json(&outcome))).into_response()
        }
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn cancel_memo(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::CancelMemoRequest>,
) -> axum::response::Response {
    let trip_id = match errors::parse_id::<TripId>(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    if let Err(resp) = common::trip_in_org(&services, &ctx, trip_id).await {
        return resp;
    }

    match services
        .engine
        .memos
        .cancel_memo(trip_id, body.reason, ctx.actor())
        .await
    {
        Ok(dm_id) => (
            StatusCode::OK,
            Json(serde_json::json!({ "dmId": dm_id, "status": "cancelled" })),
        )
            .into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}
