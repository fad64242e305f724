use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use haulbook_core::FiscalYear;

use crate::app::errors;
use crate::app::services::AppServices;
use crate::context::RequestContext;

pub fn router() -> Router {
    Router::new()
        .route("/:fiscal_year", get(get_counter))
        .route("/:fiscal_year/next", post(next_number))
}

pub async fn get_counter(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Path(fiscal_year): Path<String>,
) -> axum::response::Response {
    let fiscal_year = match FiscalYear::parse(&fiscal_year) {
        Ok(fy) => fy,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services
        .engine
        .sequence
        .get_or_create_counter(ctx.org_id(), fiscal_year)
        .await
    {
        Ok(counter) => (StatusCode::OK, Json(counter)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

/// Issue the next memo number outside of any memo. Used by tooling that
/// reserves numbers for paper memos.
pub async fn next_number(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Path(fiscal_year): Path<String>,
) -> axum::response::Response {
    let fiscal_year = match FiscalYear::parse(&fiscal_year) {
        Ok(fy) => fy,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services
        .engine
        .sequence
        .increment_and_get_next(ctx.org_id(), fiscal_year)
        .await
    {
        Ok(number) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "fiscalYear": fiscal_year,
                "number": number,
            })),
        )
            .into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}
