use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{Value, json};

use haulbook_core::{ClientId, OrderId};
use haulbook_infra::{CascadeReport, MemoOutcome, StatusUpdate};
use haulbook_trips::{PaymentType, TripPlan, TripStatus};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub client_id: ClientId,
    pub client_name: String,
    pub payment_type: PaymentType,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleTripRequest {
    pub order_id: OrderId,
    #[serde(flatten)]
    pub plan: TripPlan,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusRequest {
    pub status: TripStatus,
    pub photo_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CancelMemoRequest {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleWageRequest {
    pub payment_date: NaiveDate,
}

// -------------------------
// Response mapping
// -------------------------

pub fn cascade_to_json(report: &CascadeReport) -> Value {
    json!({
        "applied": report.applied,
        "skipped": report.skipped,
        "failed": report
            .failed
            .iter()
            .map(|(effect, message)| json!({ "effect": effect, "message": message }))
            .collect::<Vec<_>>(),
    })
}

pub fn status_update_to_json(update: &StatusUpdate) -> Value {
    match update {
        StatusUpdate::Transitioned {
            transition,
            trip,
            cascade,
        } => json!({
            "changed": true,
            "from": transition.before,
            "to": transition.after,
            "trip": trip,
            "cascade": cascade_to_json(cascade),
        }),
        StatusUpdate::Unchanged { trip } => json!({
            "changed": false,
            "from": trip.trip_status,
            "to": trip.trip_status,
            "trip": trip,
        }),
    }
}

pub fn memo_outcome_to_json(outcome: &MemoOutcome) -> Value {
    json!({
        "dmId": outcome.memo_id(),
        "dmNumber": outcome.number(),
        "created": matches!(outcome, MemoOutcome::Created { .. }),
    })
}
