use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use haulbook_core::DomainError;
use haulbook_infra::EngineError;
use haulbook_infra::store::StoreError;

pub fn engine_error_to_response(err: EngineError) -> axum::response::Response {
    match err {
        EngineError::Domain(e) => domain_error_to_response(e),
        EngineError::Store(StoreError::Conflict(msg)) => {
            json_error(StatusCode::CONFLICT, "conflict", msg)
        }
        EngineError::Store(e) => {
            tracing::error!(error = %e, "store failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", e.to_string())
        }
        e @ EngineError::RetriesExhausted { .. } => {
            json_error(StatusCode::CONFLICT, "retries_exhausted", e.to_string())
        }
        e @ EngineError::Notify(_) => {
            json_error(StatusCode::BAD_GATEWAY, "notify_error", e.to_string())
        }
        EngineError::PartialSettlement {
            trip_wage_id,
            created,
            source,
        } => {
            tracing::error!(%trip_wage_id, created = created.len(), error = %source, "partial settlement");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                axum::Json(json!({
                    "error": "partial_settlement",
                    "message": source.to_string(),
                    "tripWageId": trip_wage_id,
                    "createdEntryIds": created,
                })),
            )
                .into_response()
        }
    }
}

pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    match err {
        DomainError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        DomainError::InvalidId(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_id", msg),
        DomainError::NotFound(msg) => json_error(StatusCode::NOT_FOUND, "not_found", msg),
        DomainError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// Parse a path segment into a typed id, answering 400 on failure.
pub fn parse_id<T>(raw: &str) -> Result<T, axum::response::Response>
where
    T: core::str::FromStr<Err = DomainError>,
{
    raw.parse::<T>().map_err(domain_error_to_response)
}
