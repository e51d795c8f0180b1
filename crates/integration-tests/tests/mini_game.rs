//! Integration tests for the lucky wheel API.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use chrono::NaiveDate;
use reqwest::StatusCode;
use serde_json::{Value, json};
use spoke_integration_tests::{
    FakeBackend, ManualClock, Reply, TestApp, TestOptions, spin_result,
};

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, d).unwrap()
}

#[tokio::test]
async fn test_wheel_reports_not_played() {
    let app = TestApp::spawn(FakeBackend::default()).await;

    let resp = app.get("/api/mini-game/wheel").await;
    assert_eq!(resp.status(), StatusCode::OK);

    let wheel: Value = resp.json().await.unwrap();
    assert_eq!(wheel["hasPlayed"], false);
    assert_eq!(wheel["prizes"].as_array().unwrap().len(), 4);
    assert_eq!(wheel["prizes"][1]["type"], "freeship");
}

#[tokio::test]
async fn test_spin_then_second_spin_rejected() {
    let backend = FakeBackend::default().with_spins([Reply::ok(spin_result("p-gift", "gift"))]);
    let app = TestApp::spawn(backend).await;

    let resp = app.post("/api/mini-game/spin", &json!({})).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let outcome: Value = resp.json().await.unwrap();
    assert_eq!(outcome["result"]["prize"]["id"], "p-gift");
    assert_eq!(outcome["result"]["coupon"]["code"], "SPIN-7Q2X");
    assert!(outcome["celebrateForMs"].as_u64().unwrap() > 0);

    // Third of four segments rests at 135 degrees
    let rotation = outcome["rotationDegrees"].as_f64().unwrap();
    assert!(rotation >= 360.0);
    assert!((rotation % 360.0 - 135.0).abs() < f64::EPSILON);

    let resp = app.post("/api/mini-game/spin", &json!({})).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "already_played");

    // Rejected locally, not by the backend
    assert_eq!(app.backend.spin_calls.load(Ordering::SeqCst), 1);

    let wheel: Value = app.get("/api/mini-game/wheel").await.json().await.unwrap();
    assert_eq!(wheel["hasPlayed"], true);
    // A reload shows today's prize again
    assert_eq!(wheel["result"]["prize"]["id"], "p-gift");
}

#[tokio::test]
async fn test_failed_spin_keeps_allowance() {
    let backend = FakeBackend::default().with_spins([
        Reply::status(500, "wheel jammed"),
        Reply::ok(spin_result("p-10", "discount")),
    ]);
    let app = TestApp::spawn(backend).await;

    let resp = app.post("/api/mini-game/spin", &json!({})).await;
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "backend_unavailable");

    let wheel: Value = app.get("/api/mini-game/wheel").await.json().await.unwrap();
    assert_eq!(wheel["hasPlayed"], false);

    let resp = app.post("/api/mini-game/spin", &json!({})).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let outcome: Value = resp.json().await.unwrap();
    assert_eq!(outcome["result"]["prize"]["id"], "p-10");
}

#[tokio::test]
async fn test_losing_prize_hides_coupon() {
    let backend = FakeBackend::default().with_spins([Reply::ok(spin_result("p-none", "none"))]);
    let app = TestApp::spawn(backend).await;

    let outcome: Value = app
        .post("/api/mini-game/spin", &json!({}))
        .await
        .json()
        .await
        .unwrap();

    assert_eq!(outcome["result"]["prize"]["type"], "none");
    assert!(outcome["result"].get("coupon").is_none());
    assert!(outcome.get("celebrateForMs").is_none());

    // Last of four segments rests at 45 degrees
    let rotation = outcome["rotationDegrees"].as_f64().unwrap();
    assert!((rotation % 360.0 - 45.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_new_day_allows_spin() {
    let clock = ManualClock::new(day(17));
    let backend = FakeBackend::default().with_spins([
        Reply::ok(spin_result("p-ship", "freeship")),
        Reply::ok(spin_result("p-10", "discount")),
    ]);
    let app = TestApp::spawn_with(
        backend,
        TestOptions {
            clock: Arc::new(clock.clone()),
            ..TestOptions::default()
        },
    )
    .await;

    let resp = app.post("/api/mini-game/spin", &json!({})).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let wheel: Value = app.get("/api/mini-game/wheel").await.json().await.unwrap();
    assert_eq!(wheel["hasPlayed"], true);

    clock.set(day(18));

    let wheel: Value = app.get("/api/mini-game/wheel").await.json().await.unwrap();
    assert_eq!(wheel["hasPlayed"], false);

    let resp = app.post("/api/mini-game/spin", &json!({})).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(app.backend.spin_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_concurrent_spins_conflict() {
    let backend = FakeBackend::default().with_spins([
        Reply::ok(spin_result("p-gift", "gift")),
        Reply::ok(spin_result("p-10", "discount")),
    ]);
    let app = TestApp::spawn_with(
        backend,
        TestOptions {
            reveal_delay: Duration::from_millis(300),
            ..TestOptions::default()
        },
    )
    .await;

    // Page load sets the session cookie both spins share
    let resp = app.get("/api/mini-game/wheel").await;
    assert_eq!(resp.status(), StatusCode::OK);

    let empty_body = json!({});
    let first = app.post("/api/mini-game/spin", &empty_body);
    let second = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        app.post("/api/mini-game/spin", &json!({})).await
    };
    let (first, second) = tokio::join!(first, second);

    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(second.status(), StatusCode::CONFLICT);
    let body: Value = second.json().await.unwrap();
    assert_eq!(body["error"], "already_spinning");

    assert_eq!(app.backend.spin_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_date_only_coupon_expiry_is_revealed() {
    let mut result = spin_result("p-ship", "freeship");
    result["coupon"]["validUntil"] = json!("2026-10-24");
    let backend = FakeBackend::default().with_spins([Reply::ok(result)]);
    let app = TestApp::spawn(backend).await;

    let resp = app.post("/api/mini-game/spin", &json!({})).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let outcome: Value = resp.json().await.unwrap();
    assert_eq!(outcome["result"]["coupon"]["validUntil"], "2026-10-24");

    let wheel: Value = app.get("/api/mini-game/wheel").await.json().await.unwrap();
    assert_eq!(wheel["hasPlayed"], true);
}

#[tokio::test]
async fn test_spin_hammering_is_rate_limited() {
    let backend = FakeBackend::default().with_spins([Reply::ok(spin_result("p-10", "discount"))]);
    let app = TestApp::spawn(backend).await;

    let mut statuses = Vec::new();
    for _ in 0..3 {
        statuses.push(app.post("/api/mini-game/spin", &json!({})).await.status());
    }
    assert_eq!(
        statuses,
        [StatusCode::OK, StatusCode::CONFLICT, StatusCode::CONFLICT]
    );

    let resp = app.post("/api/mini-game/spin", &json!({})).await;
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "rate_limited");
    assert_eq!(app.backend.spin_calls.load(Ordering::SeqCst), 1);
}
