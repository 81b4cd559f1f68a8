//! Integration Tests for API Endpoints
//!
//! Tests full request/response cycle for each endpoint against an in-memory
//! SQLite database.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use shopvault::{create_router, AppState, CacheManager, Database};
use tower::ServiceExt;

// == Helper Functions ==

async fn create_test_app() -> Router {
    let db = Database::open_in_memory().await.unwrap();
    db.init_schema().await.unwrap();
    let cache = Arc::new(CacheManager::sqlite(db.clone()));
    create_router(AppState::new(db, cache))
}

async fn body_to_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    (status, body_to_json(response.into_body()).await)
}

/// Registers Alice, funds her with 1000 WL and stocks two dirt seeds.
async fn seeded_app() -> Router {
    let app = create_test_app().await;

    let (status, _) = send(
        &app,
        json_request("POST", "/users", json!({"discord_id": "42", "growid": "Alice"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = send(
        &app,
        json_request("POST", "/deposit", json!({"discord_id": "42", "wl": 1000})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/products",
            json!({"code": "DIRT", "name": "Dirt Seed", "price": 150}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    for content in ["seed-a", "seed-b"] {
        let (status, _) = send(
            &app,
            json_request(
                "POST",
                "/products/DIRT/stock",
                json!({"content": content, "added_by": "admin"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    app
}

// == Cache Endpoint Tests ==

#[tokio::test]
async fn test_set_and_get_cache_value() {
    let app = create_test_app().await;

    let (status, json) = send(
        &app,
        json_request(
            "PUT",
            "/cache",
            json!({"key": "balance_Alice", "value": {"wl": 100}, "ttl": 30, "durable": true}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["message"].as_str().unwrap().contains("balance_Alice"));
    assert_eq!(json["durable_written"], true);

    let (status, json) = send(&app, empty_request("GET", "/cache/balance_Alice")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["key"], "balance_Alice");
    assert_eq!(json["value"], json!({"wl": 100}));
}

#[tokio::test]
async fn test_get_cache_not_found() {
    let app = create_test_app().await;

    let (status, json) = send(&app, empty_request("GET", "/cache/nonexistent_key")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"].as_str().unwrap().contains("nonexistent_key"));
}

#[tokio::test]
async fn test_delete_cache_is_idempotent() {
    let app = create_test_app().await;

    send(
        &app,
        json_request("PUT", "/cache", json!({"key": "flag", "value": true})),
    )
    .await;

    for _ in 0..2 {
        let (status, json) = send(&app, empty_request("DELETE", "/cache/flag")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], true);
    }

    let (status, _) = send(&app, empty_request("GET", "/cache/flag")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_clear_cache_flushes_everything() {
    let app = create_test_app().await;

    for key in ["a", "b"] {
        send(
            &app,
            json_request("PUT", "/cache", json!({"key": key, "value": 1, "durable": true})),
        )
        .await;
    }

    let (status, json) = send(&app, empty_request("DELETE", "/cache")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);

    let (_, stats) = send(&app, empty_request("GET", "/cache/stats")).await;
    assert_eq!(stats["cache"]["memory"]["entries"]["total"], 0);
    assert_eq!(stats["cache"]["durable"]["total"], 0);
}

#[tokio::test]
async fn test_cleanup_endpoint_reports_counts() {
    let app = create_test_app().await;

    let (status, json) = send(&app, empty_request("POST", "/cache/cleanup")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["memory_removed"], 0);
    assert_eq!(json["durable_removed"], 0);
}

#[tokio::test]
async fn test_stats_endpoint_lists_lock_registries() {
    let app = create_test_app().await;

    send(
        &app,
        json_request("PUT", "/cache", json!({"key": "k", "value": "v"})),
    )
    .await;
    send(&app, empty_request("GET", "/cache/k")).await;
    send(&app, empty_request("GET", "/cache/missing")).await;

    let (status, json) = send(&app, empty_request("GET", "/cache/stats")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["cache"]["memory"]["hits"], 1);
    assert_eq!(json["cache"]["memory"]["misses"], 1);
    for owner in ["balance", "product", "requests", "transaction"] {
        assert!(json["locks"].get(owner).is_some(), "missing {}", owner);
    }
}

#[tokio::test]
async fn test_invalid_json_request() {
    let app = create_test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/cache")
                .header("content-type", "application/json")
                .body(Body::from("not valid json"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn test_empty_key_request() {
    let app = create_test_app().await;

    let (status, json) = send(
        &app,
        json_request("PUT", "/cache", json!({"key": "", "value": "x"})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("empty"));
}

// == Health Endpoint Tests ==

#[tokio::test]
async fn test_health_endpoint() {
    let app = create_test_app().await;

    let (status, json) = send(&app, empty_request("GET", "/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert!(json.get("timestamp").is_some());
}

// == User Endpoint Tests ==

#[tokio::test]
async fn test_register_and_read_balance() {
    let app = seeded_app().await;

    let (status, json) = send(&app, empty_request("GET", "/users/Alice/balance")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["growid"], "Alice");
    assert_eq!(json["total_wl"], 1000);
    assert_eq!(json["formatted"], "10 DL");
}

#[tokio::test]
async fn test_register_growid_taken_by_other_user() {
    let app = seeded_app().await;

    let (status, json) = send(
        &app,
        json_request("POST", "/users", json!({"discord_id": "7", "growid": "alice"})),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert!(json.get("error").is_some());
}

#[tokio::test]
async fn test_balance_for_unknown_user() {
    let app = create_test_app().await;

    let (status, _) = send(&app, empty_request("GET", "/users/Nobody/balance")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

// == Money Endpoint Tests ==

#[tokio::test]
async fn test_withdraw_and_history() {
    let app = seeded_app().await;

    let (status, json) = send(
        &app,
        json_request("POST", "/withdraw", json!({"discord_id": "42", "dl": 2})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total_wl"], 800);

    let (status, json) = send(
        &app,
        empty_request("GET", "/users/Alice/transactions?limit=5"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let history = json.as_array().unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0]["type"], "WITHDRAW");
    assert_eq!(history[1]["type"], "DEPOSIT");
}

#[tokio::test]
async fn test_withdraw_more_than_balance() {
    let app = seeded_app().await;

    let (status, json) = send(
        &app,
        json_request("POST", "/withdraw", json!({"discord_id": "42", "bgl": 1})),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(json["error"].as_str().unwrap().contains("Insufficient"));
}

#[tokio::test]
async fn test_deposit_rejects_zero_amount() {
    let app = seeded_app().await;

    let (status, _) = send(
        &app,
        json_request("POST", "/deposit", json!({"discord_id": "42"})),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_deposit_for_unregistered_user() {
    let app = create_test_app().await;

    let (status, _) = send(
        &app,
        json_request("POST", "/deposit", json!({"discord_id": "99", "wl": 5})),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_repeated_request_id_is_answered_once() {
    let app = seeded_app().await;

    let deposit = || {
        Request::builder()
            .method("POST")
            .uri("/deposit")
            .header("content-type", "application/json")
            .header("x-request-id", "deposit-1")
            .body(Body::from(json!({"discord_id": "42", "wl": 50}).to_string()))
            .unwrap()
    };

    let (status, json) = send(&app, deposit()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total_wl"], 1050);

    let (status, _) = send(&app, deposit()).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, json) = send(&app, empty_request("GET", "/users/Alice/balance")).await;
    assert_eq!(json["total_wl"], 1050);
}

// == Product Endpoint Tests ==

#[tokio::test]
async fn test_product_lookup_ignores_case() {
    let app = seeded_app().await;

    let (status, json) = send(&app, empty_request("GET", "/products/dirt")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["code"], "DIRT");
    assert_eq!(json["price"], 150);
}

#[tokio::test]
async fn test_list_products() {
    let app = seeded_app().await;

    let (status, json) = send(&app, empty_request("GET", "/products")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_duplicate_product_and_stock() {
    let app = seeded_app().await;

    let (status, _) = send(
        &app,
        json_request("POST", "/products", json!({"code": "dirt", "name": "x", "price": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/products/DIRT/stock",
            json!({"content": "seed-a", "added_by": "admin"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_stock_for_missing_product() {
    let app = create_test_app().await;

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/products/NOPE/stock",
            json!({"content": "x", "added_by": "admin"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_world_info_round_trip() {
    let app = create_test_app().await;

    let (status, _) = send(&app, empty_request("GET", "/world")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        json_request(
            "PUT",
            "/world",
            json!({"world": "SHOPWORLD", "owner": "Admin", "bot": "ShopBot"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = send(&app, empty_request("GET", "/world")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["world"], "SHOPWORLD");
}

// == Purchase Endpoint Tests ==

#[tokio::test]
async fn test_purchase_delivers_stock_and_debits() {
    let app = seeded_app().await;

    let (status, json) = send(
        &app,
        json_request(
            "POST",
            "/purchase",
            json!({"discord_id": "42", "product_code": "dirt", "quantity": 2}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total_paid"], 300);
    assert_eq!(json["contents"].as_array().unwrap().len(), 2);

    let (_, balance) = send(&app, empty_request("GET", "/users/Alice/balance")).await;
    assert_eq!(balance["total_wl"], 700);
}

#[tokio::test]
async fn test_purchase_more_than_stock() {
    let app = seeded_app().await;

    let (status, json) = send(
        &app,
        json_request(
            "POST",
            "/purchase",
            json!({"discord_id": "42", "product_code": "DIRT", "quantity": 3}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(json["error"].as_str().unwrap().contains("stock"));

    let (_, balance) = send(&app, empty_request("GET", "/users/Alice/balance")).await;
    assert_eq!(balance["total_wl"], 1000);
}

#[tokio::test]
async fn test_purchase_quantity_out_of_range() {
    let app = seeded_app().await;

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/purchase",
            json!({"discord_id": "42", "product_code": "DIRT", "quantity": 0}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}
