//! End-to-end HTTP tests for the purchase flow.
//!
//! Drives the router with an in-memory SQLite repository and the mock
//! Lightning gateway and RGB distributor.
//!
//! This test requires the `sqlite` feature flag.

#![cfg(feature = "sqlite")]

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use http_body_util::BodyExt;
use mint_hex::outbound::rgb::MOCK_CONSIGNMENT_HEADER;
use mint_hex::outbound::{MockDistributor, MockGateway};
use mint_hex::{MintConfig, MintService, inbound::HttpServer};
use mint_repo::SqliteRepo;
use serde_json::{Value, json};
use tower::ServiceExt;

const WALLET: &str = "bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq";
const RGB: &str = "rgb:2bFVTT$W-utxob:egXsFnw-5Eud7WKYn-7DVQvcPbc-rR69YmgmG-veacwmUFo";
const SESSION: &str = "3f0c2a9e-5b1d-4e8a-9c7f-1a2b3c4d5e6f";

struct TestApp {
    router: Router,
    gateway: Arc<MockGateway>,
}

async fn create_test_app() -> TestApp {
    let repo = SqliteRepo::new("sqlite::memory:").await.unwrap();
    let gateway = Arc::new(MockGateway::new());
    let service = MintService::new(
        repo,
        gateway.clone(),
        Arc::new(MockDistributor::new()),
        MintConfig::default(),
    );
    let server = HttpServer::with_rate_limit(Arc::new(service), 1_000);
    TestApp {
        router: server.router(),
        gateway,
    }
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn with_key(mut request: Request<Body>, api_key: &str) -> Request<Body> {
    request.headers_mut().insert(
        header::AUTHORIZATION,
        format!("Bearer {}", api_key).parse().unwrap(),
    );
    request
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

async fn tier_pass(app: &Router) -> String {
    let (status, body) = send(
        app,
        post_json(
            "/api/game/score",
            json!({ "session_id": SESSION, "score": 21, "duration_secs": 30 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["tier"], "silver");
    body["tier_pass"].as_str().unwrap().to_string()
}

async fn create_invoice(app: &Router, batches: i64) -> Value {
    let pass = tier_pass(app).await;
    let (status, body) = send(
        app,
        post_json(
            "/api/invoices",
            json!({
                "wallet_address": WALLET,
                "rgb_invoice": RGB,
                "batch_count": batches,
                "tier_pass": pass,
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "unexpected body: {}", body);
    body
}

async fn bootstrap(app: &Router) -> String {
    let (status, body) = send(app, post_json("/api/bootstrap", json!({ "name": "ops" }))).await;
    assert_eq!(status, StatusCode::CREATED);
    body["api_key"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_purchase_flow() {
    let app = create_test_app().await;
    let router = &app.router;

    let (status, quote) = send(router, get("/api/sale/quote?batches=5")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(quote["total_sats"], 10_000);
    assert_eq!(quote["total_tokens"], 3_500);

    let invoice = create_invoice(router, 5).await;
    assert_eq!(invoice["status"], "pending");
    assert_eq!(invoice["amount_sats"], 10_000);
    assert_eq!(invoice["consignment_available"], false);
    let id = invoice["id"].as_str().unwrap().to_string();
    let hash = invoice["payment_hash"].as_str().unwrap().to_string();

    let (status, _) = send(router, get(&format!("/api/invoices/{}/consignment", id))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    assert!(app.gateway.settle(&hash));
    let (status, checked) = send(
        router,
        post_json(&format!("/api/invoices/{}/check", id), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(checked["status"], "delivered");
    assert_eq!(checked["consignment_available"], true);

    let response = router
        .clone()
        .oneshot(get(&format!("/api/invoices/{}/consignment", id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/octet-stream"
    );
    let disposition = response.headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.contains("lightcat_consignment_"));
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert!(bytes.starts_with(MOCK_CONSIGNMENT_HEADER));

    let (status, history) = send(router, get(&format!("/api/wallets/{}/invoices", WALLET))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history["batches_purchased"], 5);
    assert_eq!(history["tokens_delivered"], 3_500);

    let (_, stats) = send(router, get("/api/sale/stats")).await;
    assert_eq!(stats["batches_sold"], 5);
    assert_eq!(stats["batches_reserved"], 0);
    assert_eq!(stats["unique_buyers"], 1);
}

#[tokio::test]
async fn test_webhook_settles_invoice() {
    let app = create_test_app().await;
    let router = &app.router;
    let invoice = create_invoice(router, 2).await;

    let (status, ack) = send(
        router,
        post_json(
            "/webhooks/lightning",
            json!({ "payment_hash": invoice["payment_hash"], "status": "paid" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["received"], true);
    assert_eq!(ack["outcome"], "applied");

    let (_, stored) = send(
        router,
        get(&format!("/api/invoices/{}", invoice["id"].as_str().unwrap())),
    )
    .await;
    assert_eq!(stored["status"], "delivered");
    assert!(stored["transfer_id"].as_str().is_some());
}

#[tokio::test]
async fn test_create_invoice_without_tier_pass_is_forbidden() {
    let app = create_test_app().await;

    let (status, body) = send(
        &app.router,
        post_json(
            "/api/invoices",
            json!({ "wallet_address": WALLET, "rgb_invoice": RGB, "batch_count": 1 }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], 403);
}

#[tokio::test]
async fn test_invoice_lookup_errors() {
    let app = create_test_app().await;

    let (status, _) = send(&app.router, get("/api/invoices/not-a-uuid")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app.router,
        get("/api/invoices/00000000-0000-4000-8000-000000000000"),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], 404);
}

#[tokio::test]
async fn test_admin_routes_require_api_key() {
    let app = create_test_app().await;

    let (status, body) = send(&app.router, get("/api/admin/invoices")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], 401);

    let (status, _) = send(
        &app.router,
        with_key(get("/api/admin/invoices"), "sk_not_a_real_key"),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Public routes stay open
    let (status, _) = send(&app.router, get("/api/sale/stats")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_bootstrap_only_once() {
    let app = create_test_app().await;
    bootstrap(&app.router).await;

    let (status, _) = send(
        &app.router,
        post_json("/api/bootstrap", json!({ "name": "again" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_admin_closes_and_reopens_mint() {
    let app = create_test_app().await;
    let router = &app.router;
    let key = bootstrap(router).await;

    let (status, state) = send(
        router,
        with_key(post_json("/api/admin/mint/close", json!({})), &key),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(state["mint_closed"], true);

    let pass = tier_pass(router).await;
    let (status, _) = send(
        router,
        post_json(
            "/api/invoices",
            json!({
                "wallet_address": WALLET,
                "rgb_invoice": RGB,
                "batch_count": 1,
                "tier_pass": pass,
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, stats) = send(router, get("/api/sale/stats")).await;
    assert_eq!(stats["mint_closed"], true);

    let (_, state) = send(
        router,
        with_key(post_json("/api/admin/mint/open", json!({})), &key),
    )
    .await;
    assert_eq!(state["mint_closed"], false);
    create_invoice(router, 1).await;
}

#[tokio::test]
async fn test_admin_list_and_refund() {
    let app = create_test_app().await;
    let router = &app.router;
    let key = bootstrap(router).await;

    let invoice = create_invoice(router, 3).await;
    let id = invoice["id"].as_str().unwrap().to_string();
    app.gateway
        .settle(invoice["payment_hash"].as_str().unwrap());
    send(
        router,
        post_json(&format!("/api/invoices/{}/check", id), json!({})),
    )
    .await;

    let (status, listed) = send(
        router,
        with_key(get("/api/admin/invoices?status=delivered"), &key),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["id"], id.as_str());

    let (status, _) = send(
        router,
        with_key(
            post_json(&format!("/api/admin/invoices/{}/retry", id), json!({})),
            &key,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, refunded) = send(
        router,
        with_key(
            post_json(
                &format!("/api/admin/invoices/{}/refund", id),
                json!({ "reason": "Buyer sent the wrong RGB invoice" }),
            ),
            &key,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(refunded["status"], "refunded");
    assert_eq!(refunded["refund_reason"], "Buyer sent the wrong RGB invoice");
}

#[tokio::test]
async fn test_api_key_management() {
    let app = create_test_app().await;
    let router = &app.router;
    let key = bootstrap(router).await;

    let (status, created) = send(
        router,
        with_key(post_json("/api/keys", json!({ "name": "dashboard" })), &key),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(created["api_key"].as_str().unwrap().starts_with("sk_"));

    let (_, keys) = send(router, with_key(get("/api/keys"), &key)).await;
    let keys = keys.as_array().unwrap().clone();
    assert_eq!(keys.len(), 2);
    let dashboard = keys.iter().find(|k| k["name"] == "dashboard").unwrap();

    let delete = Request::builder()
        .method(Method::DELETE)
        .uri(format!("/api/keys/{}", dashboard["id"].as_str().unwrap()))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(router, with_key(delete, &key)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, keys) = send(router, with_key(get("/api/keys"), &key)).await;
    assert_eq!(keys.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_health_and_openapi() {
    let app = create_test_app().await;

    let (status, health) = send(&app.router, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "healthy");

    let (status, doc) = send(&app.router, get("/api-docs/openapi.json")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(doc["paths"]["/api/invoices"].is_object());
}

#[tokio::test]
async fn test_malformed_input_is_a_json_error() {
    let app = create_test_app().await;

    let (status, body) = send(&app.router, get("/api/sale/quote?batches=abc")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 400);
    assert!(body["error"].is_string());

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/invoices")
        .header("Content-Type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 400);

    // Missing fields are rejected the same way.
    let (status, body) = send(
        &app.router,
        post_json("/api/game/score", json!({ "session_id": SESSION })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 400);
}

#[tokio::test]
async fn test_leaderboard() {
    let app = create_test_app().await;
    for score in [12, 30] {
        let (status, _) = send(
            &app.router,
            post_json(
                "/api/game/score",
                json!({ "session_id": SESSION, "score": score, "duration_secs": 30 }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, board) = send(&app.router, get("/api/game/leaderboard?period=all_time")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(board["period"], "all_time");
    let entries = board["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["rank"], 1);
    assert_eq!(entries[0]["score"], 30);
    assert!(entries[0].get("session_id").is_none());

    let (status, body) = send(&app.router, get("/api/game/leaderboard?period=monthly")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 400);
}

#[tokio::test]
async fn test_score_submissions_throttled_by_forwarded_address() {
    let repo = SqliteRepo::new("sqlite::memory:").await.unwrap();
    let config = MintConfig {
        score_submissions_per_hour: 2,
        ..Default::default()
    };
    let service = MintService::new(
        repo,
        Arc::new(MockGateway::new()),
        Arc::new(MockDistributor::new()),
        config,
    );
    let router = HttpServer::with_rate_limit(Arc::new(service), 1_000).router();

    let score = |ip: &str| {
        let mut request = post_json(
            "/api/game/score",
            json!({ "session_id": SESSION, "score": 21, "duration_secs": 30 }),
        );
        request
            .headers_mut()
            .insert("x-forwarded-for", ip.parse().unwrap());
        request
    };

    for _ in 0..2 {
        let (status, _) = send(&router, score("203.0.113.9")).await;
        assert_eq!(status, StatusCode::CREATED);
    }
    let (status, body) = send(&router, score("203.0.113.9")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["code"], 429);

    let (status, _) = send(&router, score("198.51.100.4")).await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_banned_wallet_is_forbidden() {
    let app = create_test_app().await;
    let router = &app.router;
    let key = bootstrap(router).await;
    let ban_uri = format!("/api/admin/wallets/{}/ban", WALLET);

    let (status, ban) = send(
        router,
        with_key(post_json(&ban_uri, json!({ "reason": "Chargeback abuse" })), &key),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ban["wallet_address"], WALLET);

    let pass = tier_pass(router).await;
    let (status, body) = send(
        router,
        post_json(
            "/api/invoices",
            json!({
                "wallet_address": WALLET,
                "rgb_invoice": RGB,
                "batch_count": 1,
                "tier_pass": pass,
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], 403);

    let (status, bans) = send(router, with_key(get("/api/admin/wallets/banned"), &key)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bans.as_array().unwrap().len(), 1);

    let unban = |uri: &str| {
        with_key(
            Request::builder()
                .method(Method::DELETE)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
            &key,
        )
    };
    let (status, _) = send(router, unban(&ban_uri)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(router, unban(&ban_uri)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    create_invoice(router, 1).await;
}

#[tokio::test]
async fn test_export_purchases() {
    let app = create_test_app().await;
    let router = &app.router;
    let key = bootstrap(router).await;
    let invoice = create_invoice(router, 2).await;

    let (status, records) = send(
        router,
        with_key(get("/api/admin/export/purchases"), &key),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let records = records.as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["reference"], invoice["reference"]);

    let response = router
        .clone()
        .oneshot(with_key(
            get("/api/admin/export/purchases?format=csv"),
            &key,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
    assert!(content_type.starts_with("text/csv"));
    let disposition = response.headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.contains(".csv"));

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(body.to_vec()).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[1].contains(invoice["reference"].as_str().unwrap()));

    // Export is an operator route.
    let (status, _) = send(router, get("/api/admin/export/purchases")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
