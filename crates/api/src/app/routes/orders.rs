use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, post},
};
use chrono::Utc;

use haulbook_core::OrderId;
use haulbook_trips::Order;

use crate::app::routes::common;
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::RequestContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_order))
        .route("/:id", delete(delete_order).get(get_order))
}

/// Register an order so trips can be scheduled against it.
pub async fn create_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Json(body): Json<dto::CreateOrderRequest>,
) -> axum::response::Response {
    if body.client_name.trim().is_empty() {
        return errors::json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "client name is required",
        );
    }

    let order = Order::new(
        OrderId::new(),
        ctx.org_id(),
        body.client_id,
        body.client_name,
        body.payment_type,
        Utc::now(),
    );

    match services.engine.orders.register_order(order.clone()).await {
        Ok(()) => (StatusCode::CREATED, Json(order)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn get_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id = match errors::parse_id::<OrderId>(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match common::order_in_org(&services, &ctx, order_id).await {
        Ok(order) => (StatusCode::OK, Json(order)).into_response(),
        Err(resp) => resp,
    }
}

/// Delete an order. Its trips survive, flagged as orphaned.
pub async fn delete_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id = match errors::parse_id::<OrderId>(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    if let Err(resp) = common::order_in_org(&services, &ctx, order_id).await {
        return resp;
    }

    match services.engine.orders.delete_order(order_id, Utc::now()).await {
        Ok(flagged) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "id": order_id,
                "flaggedTrips": flagged,
            })),
        )
            .into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}
