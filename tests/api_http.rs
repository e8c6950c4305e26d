// tests/api_http.rs
//
// HTTP-level tests for the public API Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.
//
// Covered:
// - GET /health
// - GET /feed, POST /monitor/arm, POST /monitor/disarm
// - PUT /monitor/criteria and POST /monitor/arm (ceiling validation)
// - POST /acquire/{id} (202 / 404 / 409), DELETE /acquire
// - POST /session/login, DELETE /session
// - POST /analyze (fallback result, unknown listing, bad input)

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use serde_json::Value as Json;
use shuttle_axum::axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use tower::ServiceExt as _; // for `oneshot`

use snipe_monitor::api::{self, AppState};
use snipe_monitor::config::MonitorConfig;
use snipe_monitor::ingest::providers::demo::DisabledProvider;
use snipe_monitor::notify::DisabledChannel;
use snipe_monitor::{Condition, Listing, Monitor};

const BODY_LIMIT: usize = 1024 * 1024;

/// Build the same Router the binary uses, over an offline monitor.
fn test_state() -> AppState {
    let monitor = Monitor::new(
        &MonitorConfig::default(),
        Arc::new(DisabledProvider),
        Arc::new(DisabledChannel),
    );
    AppState::new(monitor)
}

fn seeded(state: &AppState, id: &str) {
    state.monitor.feed.merge(vec![Listing {
        id: id.to_string(),
        title: "Ralph Lauren Cable Knit".into(),
        brand: "Ralph Lauren".into(),
        size: "M".into(),
        price: 22.0,
        currency: "EUR".into(),
        condition: Condition::VeryGood,
        discovered_at: Utc::now(),
        source_link: Some(format!("https://www.vinted.fr/items/{id}")),
        is_exceptional: true,
    }]);
}

async fn call(app: Router, method: &str, uri: &str, body: Option<Json>) -> (StatusCode, Json) {
    let mut req = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(v) => {
            req = req.header("content-type", "application/json");
            Body::from(v.to_string())
        }
        None => Body::empty(),
    };
    let resp = app
        .oneshot(req.body(body).expect("build request"))
        .await
        .expect("oneshot");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body")
        .to_vec();
    let v = serde_json::from_slice(&bytes).unwrap_or(Json::Null);
    (status, v)
}

#[tokio::test]
async fn api_health_returns_200_and_ok_body() {
    let app = api::router(test_state());

    let req = Request::builder()
        .method("GET")
        .uri("/health")
        .body(Body::empty())
        .expect("build GET /health");

    let resp = app.oneshot(req).await.expect("oneshot /health");
    assert_eq!(resp.status(), StatusCode::OK, "health should be 200");

    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body")
        .to_vec();
    assert_eq!(String::from_utf8(bytes).expect("utf8").trim(), "OK");
}

#[tokio::test]
async fn feed_lists_newest_first() {
    let state = test_state();
    seeded(&state, "a");
    seeded(&state, "b");

    let (status, v) = call(api::router(state), "GET", "/feed", None).await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = v
        .as_array()
        .expect("feed is an array")
        .iter()
        .filter_map(|l| l["id"].as_str())
        .collect();
    assert_eq!(ids, vec!["b", "a"]);
}

#[tokio::test]
async fn arm_and_disarm_toggle_status() {
    let state = test_state();
    let app = api::router(state.clone());

    let criteria = json!({
        "brands": ["Nike"],
        "categories": ["Hoodie"],
        "sizes": ["L"],
        "price_ceiling": 30.0
    });
    let (status, v) = call(app.clone(), "POST", "/monitor/arm", Some(criteria)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["armed"], json!(true));
    assert_eq!(v["criteria"]["price_ceiling"], json!(30.0));
    assert!(state.monitor.scheduler.is_armed());

    let (status, v) = call(app.clone(), "POST", "/monitor/disarm", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["armed"], json!(false));

    // Without a body the stored criteria are reused.
    let (_, v) = call(app, "POST", "/monitor/arm", None).await;
    assert_eq!(v["armed"], json!(true));
    assert_eq!(v["criteria"]["brands"], json!(["Nike"]));
    state.monitor.scheduler.disarm();
}

#[tokio::test]
async fn criteria_update_rejects_negative_ceiling() {
    let state = test_state();
    let app = api::router(state.clone());

    let bad = json!({ "price_ceiling": -1.0 });
    let (status, v) = call(app.clone(), "PUT", "/monitor/criteria", Some(bad)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(v["error"].is_string());

    let ok = json!({ "brands": ["Stussy"], "price_ceiling": 40.0 });
    let (status, v) = call(app, "PUT", "/monitor/criteria", Some(ok)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["armed"], json!(false), "update alone does not arm");
    assert_eq!(state.monitor.scheduler.criteria().price_ceiling, 40.0);
}

#[tokio::test]
async fn arm_rejects_negative_ceiling_and_stays_idle() {
    let state = test_state();
    let app = api::router(state.clone());

    let bad = json!({ "brands": ["Nike"], "price_ceiling": -50.0 });
    let (status, v) = call(app, "POST", "/monitor/arm", Some(bad)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(v["error"].as_str().unwrap_or_default().contains("price_ceiling"));
    assert!(!state.monitor.scheduler.is_armed());
    assert_eq!(state.monitor.scheduler.criteria().price_ceiling, 30.0);
}

#[tokio::test]
async fn acquire_unknown_listing_is_404() {
    let app = api::router(test_state());
    let (status, v) = call(app, "POST", "/acquire/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(v["error"].as_str().unwrap_or_default().contains("nope"));
}

#[tokio::test]
async fn acquire_is_single_flight() {
    let state = test_state();
    seeded(&state, "a");
    seeded(&state, "b");
    let app = api::router(state.clone());

    let (status, v) = call(app.clone(), "POST", "/acquire/a", None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(v["listing_id"], json!("a"));

    let (status, _) = call(app.clone(), "POST", "/acquire/b", None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, v) = call(app.clone(), "GET", "/acquire", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["listing_id"], json!("a"));
    assert_eq!(v["steps_total"], json!(8));

    let (_, v) = call(app.clone(), "DELETE", "/acquire", None).await;
    assert_eq!(v["cancelled"], json!(true));
    let (_, v) = call(app.clone(), "GET", "/acquire", None).await;
    assert_eq!(v["phase"], json!("inactive"));

    let (status, _) = call(app, "POST", "/acquire/b", None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    state.monitor.sequencer.cancel_active();
}

#[tokio::test]
async fn session_login_and_logout() {
    let app = api::router(test_state());

    let (status, _) = call(app.clone(), "POST", "/session/login", Some(json!({ "username": "  " }))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, v) = call(app.clone(), "POST", "/session/login", Some(json!({ "username": "alice" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["username"], json!("alice"));
    assert_eq!(v["stats"]["items_sniped"], json!(24));

    let (_, v) = call(app.clone(), "DELETE", "/session", None).await;
    assert!(v["username"].is_null());

    let (_, v) = call(app, "GET", "/session", None).await;
    assert!(v["last_settlement"].is_null());
}

#[tokio::test]
async fn notifications_enable_reports_permission() {
    let app = api::router(test_state());
    let (status, v) = call(app.clone(), "POST", "/notifications/enable", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["opted_in"], json!(false), "disabled channel never grants");

    let (_, v) = call(app, "POST", "/notifications/disable", None).await;
    assert_eq!(v["opted_in"], json!(false));
}

#[tokio::test]
async fn analyze_without_backend_returns_failure_result() {
    let app = api::router(test_state());
    let body = json!({ "description": "Carhartt Detroit jacket", "price": 45.0 });
    let (status, v) = call(app, "POST", "/analyze", Some(body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["score"], json!(0));
    assert_eq!(v["estimated_value"], json!(0.0));
    assert_eq!(v["is_good_deal"], json!(false));
    assert_eq!(v["reasoning"], json!("Analysis failed. Try again."));
    assert_eq!(v["search_links"], json!([]));
}

#[tokio::test]
async fn analyze_resolves_feed_listings() {
    let state = test_state();
    seeded(&state, "a");
    let app = api::router(state);

    let (status, v) = call(app.clone(), "POST", "/analyze", Some(json!({ "listing_id": "a" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["score"], json!(0));

    let (status, v) = call(app, "POST", "/analyze", Some(json!({ "listing_id": "zz" }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(v["error"].as_str().unwrap_or_default().contains("zz"));
}

#[tokio::test]
async fn analyze_rejects_blank_description_or_bad_price() {
    let app = api::router(test_state());
    let (status, _) = call(app.clone(), "POST", "/analyze", Some(json!({ "description": "  ", "price": 10.0 }))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = call(app.clone(), "POST", "/analyze", Some(json!({ "description": "Levi's 501" }))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = call(app, "POST", "/analyze", Some(json!({ "description": "Levi's 501", "price": -3.0 }))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}
