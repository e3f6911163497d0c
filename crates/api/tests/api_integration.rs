//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use api::{AppState, Backends, ServiceKind};
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use event_bus::InMemoryEventBus;
use hub::HubHandle;
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Value, json};
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
    app: Router,
    state: AppState,
    bus: InMemoryEventBus,
}

impl TestApp {
    async fn start(service: ServiceKind) -> Self {
        let bus = InMemoryEventBus::new();
        let (hub, _task) = HubHandle::spawn(16);
        let state = api::start(service, Backends::in_memory(Arc::new(bus.clone())), hub)
            .await
            .unwrap();
        let app = api::create_app(&state, get_metrics_handle());
        Self { app, state, bus }
    }

    async fn send(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    /// Waits until the saga has no events left in flight.
    async fn settle(&self) {
        let mut quiet_rounds = 0;
        for _ in 0..50 {
            self.state.publisher.flush().await;
            assert!(self.bus.wait_until_idle(Duration::from_secs(5)).await);
            if self.state.publisher.pending() == 0 {
                quiet_rounds += 1;
                if quiet_rounds == 2 {
                    return;
                }
            } else {
                quiet_rounds = 0;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("saga did not settle");
    }

    async fn create_order(&self, quantity: i64) -> Value {
        let (status, body) = self
            .send(
                "POST",
                "/orders",
                Some(json!({
                    "customer_id": "cust-1",
                    "item_name": "Widget",
                    "quantity": quantity,
                    "total_price": 20.0
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        body["data"].clone()
    }
}

#[tokio::test]
async fn test_health_check() {
    let app = TestApp::start(ServiceKind::All).await;

    let (status, json) = app.send("GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["service"], "all");
    assert_eq!(json["ws_clients"], 0);
}

#[tokio::test]
async fn test_create_and_get_order() {
    let app = TestApp::start(ServiceKind::All).await;

    let created = app.create_order(2).await;
    assert_eq!(created["status"], "PENDING");
    assert_eq!(created["total_price"], 20.0);
    let order_id = created["id"].as_str().unwrap();

    let (status, json) = app.send("GET", &format!("/orders/{order_id}"), None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "success");
    assert_eq!(json["data"]["id"], order_id);
    assert_eq!(json["data"]["quantity"], 2);
}

#[tokio::test]
async fn test_create_order_validation_error() {
    let app = TestApp::start(ServiceKind::All).await;

    let (status, json) = app
        .send(
            "POST",
            "/orders",
            Some(json!({
                "customer_id": "cust-1",
                "item_name": "Widget",
                "quantity": 0,
                "total_price": 20.0
            })),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["status"], "error");
    assert!(json["message"].as_str().unwrap().contains("quantity"));
}

#[tokio::test]
async fn test_malformed_body_is_bad_request() {
    let app = TestApp::start(ServiceKind::All).await;

    let (status, json) = app
        .send("POST", "/orders", Some(json!({ "customer_id": "cust-1" })))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["status"], "error");
}

#[tokio::test]
async fn test_get_nonexistent_order() {
    let app = TestApp::start(ServiceKind::All).await;
    let missing = common::OrderId::new();

    let (status, json) = app.send("GET", &format!("/orders/{missing}"), None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["status"], "error");
}

#[tokio::test]
async fn test_invalid_order_id_format() {
    let app = TestApp::start(ServiceKind::All).await;

    let (status, _) = app.send("GET", "/orders/not-a-uuid", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.send("GET", "/products/abc", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_create_and_list_products() {
    let app = TestApp::start(ServiceKind::All).await;

    for name in ["Widget", "Gadget", "Gizmo"] {
        let (status, _) = app
            .send("POST", "/products", Some(json!({ "name": name, "stock": 5 })))
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, json) = app.send("GET", "/products?limit=2&offset=1", None).await;
    assert_eq!(status, StatusCode::OK);
    let products = json["data"].as_array().unwrap();
    assert_eq!(products.len(), 2);

    let id = products[0]["id"].as_u64().unwrap();
    let (status, json) = app.send("GET", &format!("/products/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["stock"], 5);
}

#[tokio::test]
async fn test_duplicate_product_name_conflicts() {
    let app = TestApp::start(ServiceKind::All).await;
    let body = json!({ "name": "Widget", "stock": 5 });

    let (status, _) = app.send("POST", "/products", Some(body.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = app.send("POST", "/products", Some(body)).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_payment_confirmation_completes_the_saga() {
    let app = TestApp::start(ServiceKind::All).await;
    app.send("POST", "/products", Some(json!({ "name": "Widget", "stock": 5 })))
        .await;

    let order = app.create_order(2).await;
    let order_id = order["id"].as_str().unwrap().to_string();
    app.settle().await;

    let (status, json) = app
        .send("GET", &format!("/payments/order/{order_id}"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["status"], "PENDING");
    let payment_id = json["data"]["id"].as_u64().unwrap();

    let (status, json) = app
        .send("POST", "/payments", Some(json!({ "payment_id": payment_id })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["status"], "COMPLETED");
    app.settle().await;

    let (_, json) = app.send("GET", &format!("/orders/{order_id}"), None).await;
    assert_eq!(json["data"]["status"], "PAID");

    let (status, json) = app
        .send("GET", &format!("/shipments/order/{order_id}"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["courier_name"], "Auto-Assigned");

    let (_, json) = app.send("GET", "/products?limit=10", None).await;
    assert_eq!(json["data"][0]["stock"], 3);

    // A second confirmation is an invalid transition.
    let (status, _) = app
        .send("POST", "/payments", Some(json!({ "payment_id": payment_id })))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_failed_payment_cancels_order() {
    let app = TestApp::start(ServiceKind::All).await;
    app.send("POST", "/products", Some(json!({ "name": "Widget", "stock": 5 })))
        .await;
    let order = app.create_order(2).await;
    let order_id = order["id"].as_str().unwrap().to_string();
    app.settle().await;

    let (_, json) = app
        .send("GET", &format!("/payments/order/{order_id}"), None)
        .await;
    let payment_id = json["data"]["id"].as_u64().unwrap();

    let (status, json) = app
        .send(
            "POST",
            &format!("/payments/{payment_id}/fail"),
            Some(json!({ "reason": "card declined" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["status"], "FAILED");
    app.settle().await;

    let (_, json) = app.send("GET", &format!("/orders/{order_id}"), None).await;
    assert_eq!(json["data"]["status"], "CANCELLED");
    let (_, json) = app.send("GET", "/products", None).await;
    assert_eq!(json["data"][0]["stock"], 5);
}

#[tokio::test]
async fn test_update_order_status() {
    let app = TestApp::start(ServiceKind::All).await;
    app.send("POST", "/products", Some(json!({ "name": "Widget", "stock": 5 })))
        .await;
    let order = app.create_order(1).await;
    let order_id = order["id"].as_str().unwrap().to_string();
    app.settle().await;

    let uri = format!("/orders/{order_id}/status");
    let (status, _) = app
        .send("PATCH", &uri, Some(json!({ "status": "SHIPPED" })))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app
        .send("PATCH", &uri, Some(json!({ "status": "LOST" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, json) = app
        .send("PATCH", &uri, Some(json!({ "status": "CANCELLED" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["status"], "CANCELLED");
}

#[tokio::test]
async fn test_customer_orders() {
    let app = TestApp::start(ServiceKind::All).await;
    app.create_order(1).await;
    app.create_order(2).await;

    let (status, json) = app.send("GET", "/orders/customer/cust-1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"].as_array().unwrap().len(), 2);

    let (_, json) = app.send("GET", "/orders/customer/nobody", None).await;
    assert!(json["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_logs_record_saga_events() {
    let app = TestApp::start(ServiceKind::All).await;
    app.send("POST", "/products", Some(json!({ "name": "Widget", "stock": 5 })))
        .await;
    let order = app.create_order(1).await;
    let order_id = order["id"].as_str().unwrap().to_string();
    app.settle().await;

    let (status, json) = app
        .send("GET", &format!("/logs/order/{order_id}"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let types: Vec<&str> = json["data"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|log| log["event_type"].as_str())
        .collect();
    assert!(types.contains(&"order.created"));
    assert!(types.contains(&"stock.reserved"));

    let (_, json) = app.send("GET", "/logs?limit=1", None).await;
    assert_eq!(json["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_shipment_updates() {
    let app = TestApp::start(ServiceKind::All).await;
    app.send("POST", "/products", Some(json!({ "name": "Widget", "stock": 5 })))
        .await;
    let order = app.create_order(1).await;
    let order_id = order["id"].as_str().unwrap().to_string();
    app.settle().await;
    let (_, json) = app
        .send("GET", &format!("/payments/order/{order_id}"), None)
        .await;
    let payment_id = json["data"]["id"].as_u64().unwrap();
    app.send("POST", "/payments", Some(json!({ "payment_id": payment_id })))
        .await;
    app.settle().await;

    let (_, json) = app
        .send("GET", &format!("/shipments/order/{order_id}"), None)
        .await;
    let shipment_id = json["data"]["id"].as_u64().unwrap();

    let (status, json) = app
        .send(
            "PATCH",
            &format!("/shipments/{shipment_id}/location"),
            Some(json!({ "lat": 52.52, "long": 13.405 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["current_lat"], 52.52);

    let (status, _) = app
        .send(
            "PATCH",
            &format!("/shipments/{shipment_id}/location"),
            Some(json!({ "lat": 91.0, "long": 0.0 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, json) = app
        .send(
            "PATCH",
            &format!("/shipments/{shipment_id}/status"),
            Some(json!({ "status": "ON_THE_WAY" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["status"], "ON_THE_WAY");
}

#[tokio::test]
async fn test_routes_follow_selected_service() {
    let app = TestApp::start(ServiceKind::Payment).await;

    let (status, json) = app.send("GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["service"], "payment");

    let (status, _) = app.send("GET", "/products", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app.send("GET", "/logs", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = TestApp::start(ServiceKind::All).await;
    app.create_order(1).await;

    let response = app
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()["content-type"].to_str().unwrap();
    assert!(content_type.starts_with("text/plain"));
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("saga_orders_created_total"));
}
