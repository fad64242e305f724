use axum::{
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use haulbook_core::{Actor, ActorId, ActorRole, OrgId};

use crate::app::errors;
use crate::context::RequestContext;

pub const ORG_HEADER: &str = "x-org-id";
pub const ACTOR_HEADER: &str = "x-actor-id";
pub const ROLE_HEADER: &str = "x-actor-role";

/// Derive the request context from the identity headers set by the gateway.
pub async fn context_middleware(
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, Response> {
    let ctx = extract_context(req.headers())?;
    req.extensions_mut().insert(ctx);
    Ok(next.run(req).await)
}

fn extract_context(headers: &HeaderMap) -> Result<RequestContext, Response> {
    let org_id: OrgId = parse_header(headers, ORG_HEADER)?;
    let actor_id: ActorId = parse_header(headers, ACTOR_HEADER)?;
    let role: ActorRole = parse_header(headers, ROLE_HEADER)?;
    Ok(RequestContext::new(org_id, Actor::new(actor_id, role)))
}

fn parse_header<T>(headers: &HeaderMap, name: &'static str) -> Result<T, Response>
where
    T: core::str::FromStr,
    T::Err: core::fmt::Display,
{
    let raw = headers
        .get(name)
        .ok_or_else(|| {
            errors::json_error(
                StatusCode::UNAUTHORIZED,
                "missing_context",
                format!("{name} header is required"),
            )
        })?
        .to_str()
        .map_err(|_| {
            errors::json_error(StatusCode::BAD_REQUEST, "invalid_context", format!("{name} is not ASCII"))
        })?;

    raw.trim().parse::<T>().map_err(|e| {
        errors::json_error(StatusCode::BAD_REQUEST, "invalid_context", format!("{name}: {e}"))
    })
}
