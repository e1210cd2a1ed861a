//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};

use api::{Backends, Services};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{Discount, Money};
use event_channel::InMemoryEventChannel;
use inventory::{InMemoryLedgerStore, ProductStock};
use metrics_exporter_prometheus::PrometheusHandle;
use notification::InMemoryOrderRepository;
use saga::InMemorySagaStore;
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

struct TestApp {
    app: axum::Router,
    services: Services,
    orders: InMemoryOrderRepository,
}

async fn setup() -> TestApp {
    let stock = InMemoryLedgerStore::with_products([
        ProductStock::new(
            "a",
            "Apple",
            Money::from_cents(1000),
            Discount::new(0.5).unwrap(),
            10,
        ),
        ProductStock::new("b", "Banana", Money::from_cents(400), Discount::none(), 2),
    ])
    .await
    .unwrap();
    let orders = InMemoryOrderRepository::new();
    let backends = Backends {
        sagas: Arc::new(InMemorySagaStore::new()),
        stock: Arc::new(stock),
        orders: Arc::new(orders.clone()),
    };

    let services = api::start_services(backends, InMemoryEventChannel::new()).await;
    let app = api::create_app(services.state.clone(), get_metrics_handle());
    TestApp {
        app,
        services,
        orders,
    }
}

impl TestApp {
    async fn request(&self, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if body.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null)
        };
        (status, json)
    }

    async fn get(&self, uri: &str) -> (StatusCode, serde_json::Value) {
        self.request(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }

    async fn post(&self, uri: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
        self.request(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    async fn settle(&self) {
        self.services.state.channel.wait_idle().await;
    }
}

#[tokio::test]
async fn test_health_check() {
    let app = setup().await;
    let (status, json) = app.get("/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_submit_order_runs_saga_to_completion() {
    let app = setup().await;

    let (status, json) = app
        .post(
            "/orders",
            serde_json::json!({
                "userId": "user-1",
                "items": [{"productId": "a", "quantity": 3}]
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["orderStatus"], "PENDING");
    assert_eq!(json["estimatedTotal"], 500);
    assert_eq!(json["available"][0]["productId"], "a");
    let order_id = json["orderId"].as_str().unwrap().to_string();
    let saga_id = json["sagaId"].as_str().unwrap().to_string();

    app.settle().await;

    let (status, json) = app
        .get(&format!("/orders/{order_id}/status?userId=user-1"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["orderStatus"], "CREATED");

    let (status, json) = app.get(&format!("/sagas/{saga_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "COMPLETED");
    assert_eq!(json["orderId"], order_id.as_str());

    let (status, json) = app.get(&format!("/orders/{order_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["totalPrice"], 500);
    assert_eq!(json["items"][0]["quantity"], 3);

    let (_, json) = app.get("/users/user-1/orders").await;
    assert_eq!(json.as_array().unwrap().len(), 1);
    let (_, json) = app.get("/users/someone-else/orders").await;
    assert!(json.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_unavailable_order_is_bad_request() {
    let app = setup().await;

    let (status, json) = app
        .post(
            "/orders",
            serde_json::json!({
                "userId": "user-1",
                "items": [{"productId": "b", "quantity": 5}]
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["orderStatus"], "FAILED");
    assert!(json.get("sagaId").is_none());
    assert_eq!(json["unavailable"][0]["reason"], "INSUFFICIENT_QUANTITY");
    assert_eq!(json["unavailable"][0]["requestedQuantity"], 5);
    assert_eq!(json["unavailable"][0]["availableQuantity"], 2);
}

#[tokio::test]
async fn test_invalid_submissions_rejected() {
    let app = setup().await;

    let (status, json) = app
        .post("/orders", serde_json::json!({"userId": "user-1", "items": []}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("no items"));

    let (status, _) = app
        .post(
            "/orders",
            serde_json::json!({"userId": " ", "items": [{"productId": "a", "quantity": 1}]}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_failed_materialization_reports_failed() {
    let app = setup().await;
    app.orders.set_fail_on_save(true);

    let (_, json) = app
        .post(
            "/orders",
            serde_json::json!({
                "userId": "user-1",
                "items": [{"productId": "a", "quantity": 6}]
            }),
        )
        .await;
    let order_id = json["orderId"].as_str().unwrap().to_string();
    let saga_id = json["sagaId"].as_str().unwrap().to_string();
    app.settle().await;

    let (_, json) = app
        .get(&format!("/orders/{order_id}/status?userId=user-1"))
        .await;
    assert_eq!(json["orderStatus"], "FAILED");

    let (_, json) = app.get(&format!("/sagas/{saga_id}")).await;
    assert_eq!(json["status"], "COMPENSATED");

    let (_, json) = app
        .post(
            "/availability",
            serde_json::json!({"items": [{"productId": "a", "quantity": 10}]}),
        )
        .await;
    assert_eq!(json["available"][0]["availableQuantity"], 10);
}

#[tokio::test]
async fn test_status_lookup_needs_matching_user() {
    let app = setup().await;
    let (_, json) = app
        .post(
            "/orders",
            serde_json::json!({
                "userId": "user-1",
                "items": [{"productId": "a", "quantity": 1}]
            }),
        )
        .await;
    let order_id = json["orderId"].as_str().unwrap().to_string();
    app.settle().await;

    let (status, _) = app
        .get(&format!("/orders/{order_id}/status?userId=user-2"))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.get(&format!("/orders/{order_id}/status")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_availability_partitions() {
    let app = setup().await;
    let (status, json) = app
        .post(
            "/availability",
            serde_json::json!({"items": [
                {"productId": "a", "quantity": 3},
                {"productId": "ghost", "quantity": 1}
            ]}),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["available"][0]["name"], "Apple");
    assert_eq!(json["available"][0]["price"], 1000);
    assert_eq!(json["available"][0]["discount"], 0.5);
    assert_eq!(json["unavailable"][0]["reason"], "NOT_FOUND");
}

#[tokio::test]
async fn test_missing_resources_are_not_found() {
    let app = setup().await;

    let (status, json) = app.get("/sagas/does-not-exist").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"].as_str().unwrap().contains("does-not-exist"));

    let (status, _) = app.get("/orders/does-not-exist").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, json) = app.get("/orders").await;
    assert_eq!(status, StatusCode::OK);
    assert!(json.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = setup().await;
    app.post(
        "/orders",
        serde_json::json!({
            "userId": "user-1",
            "items": [{"productId": "a", "quantity": 1}]
        }),
    )
    .await;
    app.settle().await;

    let response = app
        .app
        .clone()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("saga_started_total"));
}
