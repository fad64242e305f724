use axum::{Router, routing::get};

pub mod common;
pub mod counters;
pub mod orders;
pub mod system;
pub mod trips;
pub mod wages;

/// Router for all org-scoped endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .route("/notifications/stream", get(system::stream))
        .nest("/counters", counters::router())
        .nest("/orders", orders::router())
        .nest("/trips", trips::router())
        .nest("/trip-wages", wages::router())
}
