//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};

use api::config::Config;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{Requester, Role};
use domain::RecordingNotifier;
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Value, json};
use store::{Cart, InMemoryStore, LineItem, Money, Product, Store, UserId};
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
    store: InMemoryStore,
}

impl TestApp {
    fn new() -> Self {
        let store = InMemoryStore::new();
        let config = Config {
            default_page_size: 2,
            notify_max_attempts: 1,
            ..Config::default()
        };
        let state =
            api::create_default_state(store.clone(), &config, Arc::new(RecordingNotifier::new()));
        Self {
            app: api::create_app(state, get_metrics_handle()),
            store,
        }
    }

    async fn send(
        &self,
        method: &str,
        uri: &str,
        requester: Option<Requester>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(requester) = requester {
            builder = builder
                .header("x-user-id", requester.user_id.to_string())
                .header("x-user-role", requester.role.as_str());
        }
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(serde_json::to_vec(&json).unwrap())
            }
            None => Body::empty(),
        };

        let response = self
            .app
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    /// Seeds a cart with a taxable 2 x 10.00 line and an exempt 1 x 5.00 line.
    async fn seed_cart(&self) -> (Cart, Vec<LineItem>) {
        let cart = Cart::new();
        let chair = Product::new("Chair", Money::from_cents(1000), true, 10).with_brand("Oak");
        let bread = Product::new("Bread", Money::from_cents(500), false, 10);
        self.store.insert_product(chair.clone()).await.unwrap();
        self.store.insert_product(bread.clone()).await.unwrap();
        let lines = vec![
            LineItem::for_product(cart.id, &chair, 0, 2),
            LineItem::for_product(cart.id, &bread, 1, 1),
        ];
        self.store
            .insert_cart(cart.clone(), lines.clone())
            .await
            .unwrap();
        (cart, lines)
    }

    async fn place(&self, requester: Requester) -> (String, Vec<LineItem>) {
        let (cart, lines) = self.seed_cart().await;
        let (status, json) = self
            .send(
                "POST",
                "/orders",
                Some(requester),
                Some(json!({ "cartId": cart.id, "total": 2700 })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{json}");
        (json["order"]["id"].as_str().unwrap().to_string(), lines)
    }

    async fn stock(&self, line: &LineItem) -> i64 {
        self.store
            .get_product(line.product_id)
            .await
            .unwrap()
            .unwrap()
            .quantity
    }
}

fn customer() -> Requester {
    Requester::customer(UserId::new())
}

fn admin() -> Requester {
    Requester::admin(UserId::new())
}

#[tokio::test]
async fn test_health_check() {
    let app = TestApp::new();
    let (status, json) = app.send("GET", "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["message"], "ok");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = TestApp::new();
    let response = app
        .app
        .clone()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_missing_identity_is_bad_request() {
    let app = TestApp::new();
    let (status, json) = app.send("GET", "/orders/mine", None, None).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["success"], false);
    assert!(json["message"].as_str().unwrap().contains("x-user-id"));
}

#[tokio::test]
async fn test_place_and_get_order_with_tax() {
    let app = TestApp::new();
    let owner = customer();
    let (order_id, _) = app.place(owner).await;

    let (status, json) = app
        .send("GET", &format!("/orders/{order_id}"), Some(owner), None)
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    let order = &json["order"];
    assert_eq!(order["status"], "Open");
    assert_eq!(order["tax"]["taxBase"], 2000);
    assert_eq!(order["tax"]["taxAmount"], 200);
    assert_eq!(order["tax"]["grandTotal"], 2700);
    assert_eq!(order["lines"][0]["productName"], "Chair");
    assert_eq!(order["lines"][0]["brand"], "Oak");
}

#[tokio::test]
async fn test_place_rejects_bad_payloads() {
    let app = TestApp::new();
    let (cart, _) = app.seed_cart().await;

    let (status, json) = app
        .send("POST", "/orders", Some(customer()), Some(json!({ "cartId": "nope" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["success"], false);

    let (status, _) = app
        .send(
            "POST",
            "/orders",
            Some(customer()),
            Some(json!({ "cartId": cart.id, "total": -5 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .send(
            "POST",
            "/orders",
            Some(customer()),
            Some(json!({ "cartId": UserId::new(), "total": 0 })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_second_order_on_same_cart_is_rejected() {
    let app = TestApp::new();
    let (cart, _) = app.seed_cart().await;
    let body = json!({ "cartId": cart.id, "total": 2700 });

    let (first, _) = app
        .send("POST", "/orders", Some(customer()), Some(body.clone()))
        .await;
    let (second, json) = app
        .send("POST", "/orders", Some(customer()), Some(body))
        .await;

    assert_eq!(first, StatusCode::CREATED);
    assert_eq!(second, StatusCode::BAD_REQUEST);
    assert_eq!(json["success"], false);
}

#[tokio::test]
async fn test_get_order_of_someone_else_is_not_found() {
    let app = TestApp::new();
    let (order_id, _) = app.place(customer()).await;
    let uri = format!("/orders/{order_id}");

    let (status, json) = app.send("GET", &uri, Some(customer()), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["success"], false);

    let merchant = Requester::new(UserId::new(), Role::Merchant);
    let (status, _) = app.send("GET", &uri, Some(merchant), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.send("GET", &uri, Some(admin()), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_invalid_order_id_format() {
    let app = TestApp::new();
    let (status, json) = app
        .send("GET", "/orders/not-a-uuid", Some(customer()), None)
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["success"], false);
}

#[tokio::test]
async fn test_list_all_requires_admin() {
    let app = TestApp::new();
    let alice = customer();
    let bob = customer();
    app.place(alice).await;
    app.place(alice).await;
    app.place(bob).await;

    let (status, _) = app.send("GET", "/orders", Some(alice), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, json) = app.send("GET", "/orders?page=1", Some(admin()), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["totalCount"], 3);
    assert_eq!(json["pageSize"], 2);
    assert_eq!(json["pageCount"], 2);
    assert_eq!(json["orders"].as_array().unwrap().len(), 2);

    let (_, json) = app
        .send(
            "GET",
            &format!("/orders?owner={}", bob.user_id),
            Some(admin()),
            None,
        )
        .await;
    assert_eq!(json["totalCount"], 1);
}

#[tokio::test]
async fn test_list_mine_is_scoped_and_paged() {
    let app = TestApp::new();
    let alice = customer();
    app.place(alice).await;
    app.place(alice).await;
    app.place(alice).await;
    app.place(customer()).await;

    let (status, json) = app
        .send("GET", "/orders/mine?page=2&page_size=2", Some(alice), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["totalCount"], 3);
    assert_eq!(json["page"], 2);
    assert_eq!(json["orders"].as_array().unwrap().len(), 1);

    let (status, _) = app
        .send("GET", "/orders/mine?page=0", Some(alice), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_search_with_malformed_id_is_empty() {
    let app = TestApp::new();
    let owner = customer();
    let (order_id, _) = app.place(owner).await;

    let (status, json) = app
        .send("GET", "/orders/search?id=garbage", Some(owner), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert!(json["orders"].as_array().unwrap().is_empty());

    let (_, json) = app
        .send(
            "GET",
            &format!("/orders/search?id={order_id}"),
            Some(owner),
            None,
        )
        .await;
    assert_eq!(json["orders"][0]["id"], order_id.as_str());
}

#[tokio::test]
async fn test_cancel_items_until_order_is_gone() {
    let app = TestApp::new();
    let owner = customer();
    let (order_id, lines) = app.place(owner).await;
    let status_uri = |line: &LineItem| format!("/orders/{order_id}/items/{}/status", line.id);

    let (status, json) = app
        .send(
            "PUT",
            &status_uri(&lines[0]),
            Some(owner),
            Some(json!({ "status": "Cancelled" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["restockedQuantity"], 2);
    assert_eq!(json["orderCancelled"], false);
    assert_eq!(app.stock(&lines[0]).await, 12);

    let (_, json) = app
        .send(
            "PUT",
            &status_uri(&lines[0]),
            Some(owner),
            Some(json!({ "status": "cancelled" })),
        )
        .await;
    assert_eq!(json["alreadyResolved"], true);
    assert_eq!(app.stock(&lines[0]).await, 12);

    let (_, json) = app
        .send(
            "PUT",
            &status_uri(&lines[1]),
            Some(owner),
            Some(json!({ "status": "Cancelled" })),
        )
        .await;
    assert_eq!(json["orderCancelled"], true);

    let (status, _) = app
        .send("GET", &format!("/orders/{order_id}"), Some(owner), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cancel_order_restocks_everything() {
    let app = TestApp::new();
    let owner = customer();
    let (order_id, lines) = app.place(owner).await;

    let (status, json) = app
        .send("DELETE", &format!("/orders/{order_id}"), Some(owner), None)
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["restocked"].as_array().unwrap().len(), 2);
    assert_eq!(app.stock(&lines[0]).await, 12);
    assert_eq!(app.stock(&lines[1]).await, 11);
    assert_eq!(app.store.order_count().await, 0);
}

#[tokio::test]
async fn test_store_failure_is_reported_generically() {
    let app = TestApp::new();
    let owner = customer();
    let (order_id, _) = app.place(owner).await;
    app.store.set_fail_on_stock_credit(true).await;

    let (status, json) = app
        .send("DELETE", &format!("/orders/{order_id}"), Some(owner), None)
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["success"], false);
    assert_eq!(json["message"], api::error::RETRY_MESSAGE);
    assert_eq!(app.store.order_count().await, 1);
}

#[tokio::test]
async fn test_fulfillment_status_requires_staff() {
    let app = TestApp::new();
    let owner = customer();
    let (order_id, lines) = app.place(owner).await;
    let uri = format!("/orders/{order_id}/items/{}/status", lines[0].id);
    let body = json!({ "status": "Shipped" });

    let (status, _) = app
        .send("PUT", &uri, Some(owner), Some(body.clone()))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let merchant = Requester::new(UserId::new(), Role::Merchant);
    let (status, json) = app.send("PUT", &uri, Some(merchant), Some(body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "Shipped");

    let (status, _) = app
        .send(
            "PUT",
            &uri,
            Some(merchant),
            Some(json!({ "status": "Teleported" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
