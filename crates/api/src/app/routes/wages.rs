use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use haulbook_core::TripWageId;
use haulbook_infra::NewTripWage;

use crate::app::routes::common;
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::RequestContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(record_wage))
        .route("/:id", get(get_wage))
        .route("/:id/settle", post(settle_wage))
        .route("/:id/revert", post(revert_wage))
}

pub async fn record_wage(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Json(body): Json<NewTripWage>,
) -> axum::response::Response {
    if let Err(resp) = common::trip_in_org(&services, &ctx, body.trip_id).await {
        return resp;
    }

    match services.engine.wages.record_trip_wage(body, ctx.actor()).await {
        Ok(wage) => (StatusCode::CREATED, Json(wage)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn get_wage(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let wage_id = match errors::parse_id::<TripWageId>(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match common::wage_in_org(&services, &ctx, wage_id).await {
        Ok(wage) => (StatusCode::OK, Json(wage)).into_response(),
        Err(resp) => resp,
    }
}

/// Post one ledger credit per worker and record attendance.
pub async fn settle_wage(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::SettleWageRequest>,
) -> axum::response::Response {
    let wage_id = match errors::parse_id::<TripWageId>(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    if let Err(resp) = common::wage_in_org(&services, &ctx, wage_id).await {
        return resp;
    }

    match services
        .engine
        .wages
        .settle_trip_wage(wage_id, body.payment_date, ctx.actor())
        .await
    {
        Ok(entry_ids) => (
            StatusCode::OK,
            Json(serde_json::json!({ "id": wage_id, "ledgerEntryIds": entry_ids })),
        )
            .into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

/// Undo a settlement (or clean up a partial one) and delete the record.
pub async fn revert_wage(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let wage_id = match errors::parse_id::<TripWageId>(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    if let Err(resp) = common::wage_in_org(&services, &ctx, wage_id).await {
        return resp;
    }

    match services.engine.wages.revert_trip_wage(wage_id).await {
        Ok(deleted) => (
            StatusCode::OK,
            Json(serde_json::json!({ "id": wage_id, "deletedEntries": deleted })),
        )
            .into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}
