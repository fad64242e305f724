use std::sync::Arc;

use haulbook_api::app::{self, services::{AppServices, notification_bus}};
use haulbook_core::{ActorId, ClientId, EmployeeId, OrgId};
use haulbook_infra::{Engine, EngineConfig, InMemoryDocumentStore};
use reqwest::StatusCode;
use serde_json::{Value, json};

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod over an in-memory store, bound to an ephemeral port.
        let (bus, notifier) = notification_bus(16);
        let engine = Engine::new(
            &EngineConfig::default(),
            Arc::new(InMemoryDocumentStore::new()),
            Arc::new(notifier),
        );
        let app = app::build_app(AppServices::new(engine, bus));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

struct Caller {
    client: reqwest::Client,
    base_url: String,
    org_id: OrgId,
    actor_id: ActorId,
}

impl Caller {
    fn new(srv: &TestServer, org_id: OrgId) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: srv.base_url.clone(),
            org_id,
            actor_id: ActorId::new(),
        }
    }

    async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        let res = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .header("x-org-id", self.org_id.to_string())
            .header("x-actor-id", self.actor_id.to_string())
            .header("x-actor-role", "manager")
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = res.status();
        (status, res.json().await.unwrap_or(Value::Null))
    }

    async fn get(&self, path: &str) -> (StatusCode, Value) {
        let res = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .header("x-org-id", self.org_id.to_string())
            .header("x-actor-id", self.actor_id.to_string())
            .header("x-actor-role", "manager")
            .send()
            .await
            .unwrap();
        let status = res.status();
        (status, res.json().await.unwrap_or(Value::Null))
    }

    async fn schedule_trip(&self, payment_type: &str) -> String {
        let (status, order) = self
            .post(
                "/orders",
                json!({
                    "clientId": ClientId::new(),
                    "clientName": "Sharma Traders",
                    "paymentType": payment_type,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, trip) = self
            .post(
                "/trips",
                json!({
                    "orderId": order["id"],
                    "vehicleNumber": "MH12AB1234",
                    "items": [{
                        "productName": "Cement",
                        "quantity": 10,
                        "unitPrice": 350,
                        "taxRateBps": 1800
                    }],
                    "scheduledDate": "2024-06-10"
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        trip["id"].as_str().unwrap().to_string()
    }
}

#[tokio::test]
async fn health_needs_no_context() {
    let srv = TestServer::spawn().await;
    let res = reqwest::get(format!("{}/health", srv.base_url)).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn context_headers_are_required_for_domain_routes() {
    let srv = TestServer::spawn().await;

    let res = reqwest::Client::new()
        .get(format!("{}/whoami", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let org_id = OrgId::new();
    let (status, body) = Caller::new(&srv, org_id).get("/whoami").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["orgId"].as_str().unwrap(), org_id.to_string());
    assert_eq!(body["role"], "manager");
}

#[tokio::test]
async fn counter_endpoint_issues_consecutive_numbers() {
    let srv = TestServer::spawn().await;
    let caller = Caller::new(&srv, OrgId::new());

    let (_, first) = caller.post("/counters/FY2425/next", json!({})).await;
    let (_, second) = caller.post("/counters/FY2425/next", json!({})).await;
    assert_eq!(first["number"], 1);
    assert_eq!(second["number"], 2);

    let (status, counter) = caller.get("/counters/FY2425").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(counter["currentNumber"], 2);

    let (status, body) = caller.get("/counters/2024").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_id");
}

#[tokio::test]
async fn dispatch_without_memo_is_rejected() {
    let srv = TestServer::spawn().await;
    let caller = Caller::new(&srv, OrgId::new());
    let trip_id = caller.schedule_trip("advance").await;

    let (status, body) = caller
        .post(&format!("/trips/{trip_id}/status"), json!({ "status": "dispatched" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");

    let (_, trip) = caller.get(&format!("/trips/{trip_id}")).await;
    assert_eq!(trip["tripStatus"], "scheduled");
}

#[tokio::test]
async fn memo_then_dispatch_then_return() {
    let srv = TestServer::spawn().await;
    let caller = Caller::new(&srv, OrgId::new());
    let trip_id = caller.schedule_trip("advance").await;

    let (status, memo) = caller.post(&format!("/trips/{trip_id}/memo"), json!({})).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(memo["dmNumber"], 1);
    assert_eq!(memo["created"], true);

    let (status, again) = caller.post(&format!("/trips/{trip_id}/memo"), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again["dmId"], memo["dmId"]);
    assert_eq!(again["created"], false);

    let (status, update) = caller
        .post(&format!("/trips/{trip_id}/status"), json!({ "status": "dispatched" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(update["changed"], true);
    assert_eq!(update["to"], "dispatched");
    assert!(update["cascade"]["failed"].as_array().unwrap().is_empty());
    assert!(update["trip"]["dispatchEntryId"].is_null());

    let (_, trip) = caller.get(&format!("/trips/{trip_id}")).await;
    assert!(trip["dispatchEntryId"].is_string());

    let (status, update) = caller
        .post(&format!("/trips/{trip_id}/status"), json!({ "status": "returned" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(update["trip"]["dmNumber"], 2);
    assert!(update["trip"]["returnDmId"].is_string());
}

#[tokio::test]
async fn memo_cancel_consumes_the_number() {
    let srv = TestServer::spawn().await;
    let caller = Caller::new(&srv, OrgId::new());
    let trip_id = caller.schedule_trip("payLater").await;

    caller.post(&format!("/trips/{trip_id}/memo"), json!({})).await;
    let (status, body) = caller
        .post(
            &format!("/trips/{trip_id}/memo/cancel"),
            json!({ "reason": "wrong vehicle" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "cancelled");

    let (_, memo) = caller.post(&format!("/trips/{trip_id}/memo"), json!({})).await;
    assert_eq!(memo["dmNumber"], 2);
}

#[tokio::test]
async fn trips_are_invisible_to_other_orgs() {
    let srv = TestServer::spawn().await;
    let owner = Caller::new(&srv, OrgId::new());
    let stranger = Caller::new(&srv, OrgId::new());
    let trip_id = owner.schedule_trip("advance").await;

    let (status, _) = stranger.get(&format!("/trips/{trip_id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = stranger.post(&format!("/trips/{trip_id}/memo"), json!({})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn wage_settle_and_revert() {
    let srv = TestServer::spawn().await;
    let caller = Caller::new(&srv, OrgId::new());
    let trip_id = caller.schedule_trip("payLater").await;
    caller.post(&format!("/trips/{trip_id}/memo"), json!({})).await;

    let (status, wage) = caller
        .post(
            "/trip-wages",
            json!({
                "tripId": trip_id,
                "loadingWorkers": [EmployeeId::new(), EmployeeId::new()],
                "unloadingWorkers": [EmployeeId::new()],
                "totalLoadingWage": 600,
                "totalUnloadingWage": 300
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let wage_id = wage["id"].as_str().unwrap().to_string();

    let (status, settled) = caller
        .post(
            &format!("/trip-wages/{wage_id}/settle"),
            json!({ "paymentDate": "2024-06-11" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(settled["ledgerEntryIds"].as_array().unwrap().len(), 3);

    let (status, body) = caller
        .post(
            &format!("/trip-wages/{wage_id}/settle"),
            json!({ "paymentDate": "2024-06-11" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");

    let (status, reverted) = caller.post(&format!("/trip-wages/{wage_id}/revert"), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reverted["deletedEntries"], 3);

    let (status, _) = caller.get(&format!("/trip-wages/{wage_id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn deleting_an_order_flags_its_trips() {
    let srv = TestServer::spawn().await;
    let caller = Caller::new(&srv, OrgId::new());
    let trip_id = caller.schedule_trip("advance").await;
    let (_, trip) = caller.get(&format!("/trips/{trip_id}")).await;
    let order_id = trip["orderId"].as_str().unwrap().to_string();

    let res = caller
        .client
        .delete(format!("{}/orders/{}", caller.base_url, order_id))
        .header("x-org-id", caller.org_id.to_string())
        .header("x-actor-id", caller.actor_id.to_string())
        .header("x-actor-role", "admin")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["flaggedTrips"], 1);

    let (_, trip) = caller.get(&format!("/trips/{trip_id}")).await;
    assert_eq!(trip["orderDeleted"], true);
}
