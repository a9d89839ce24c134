//! End-to-end session tests: the real ticker on a paused tokio clock,
//! observed through the snapshot stream and the HTTP surface.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use humanfly::dashboard::build_router;
use humanfly::engine::{EngineConfig, GameHandle, RoundEngine, ScriptedCrashPoints};
use humanfly::types::{RoundState, StakeId, StakeRequest};

fn game(balance: Decimal, points: &[Decimal]) -> Arc<GameHandle> {
    Arc::new(GameHandle::new(RoundEngine::new(
        EngineConfig::default(),
        balance,
        Box::new(ScriptedCrashPoints::new(points.iter().copied())),
    )))
}

async fn json_body(resp: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(resp.into_body(), 100_000).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_observers_see_monotonic_flight_then_crash_then_idle() {
    let game = game(dec!(100), &[dec!(2.00)]);
    let mut updates = game.subscribe();

    game.start(StakeRequest::new(dec!(10), None), StakeRequest::none())
        .await
        .unwrap();

    let mut last = Decimal::ZERO;
    let mut saw_crash = false;
    loop {
        updates.changed().await.unwrap();
        let snap = updates.borrow_and_update().clone();
        match snap.state {
            RoundState::Flying => {
                assert!(snap.multiplier >= last, "{} < {}", snap.multiplier, last);
                assert!(snap.multiplier < dec!(2.00));
                last = snap.multiplier;
            }
            RoundState::Crashed => {
                assert_eq!(snap.multiplier, dec!(2.00));
                saw_crash = true;
            }
            RoundState::Idle => break,
        }
    }

    assert!(saw_crash);
    assert!(last > dec!(1.50));
    assert_eq!(game.balance().await, dec!(90));
    assert_eq!(game.history().await, vec![dec!(2.00)]);
}

#[tokio::test(start_paused = true)]
async fn test_auto_cash_out_fires_without_caller() {
    let game = game(dec!(1000), &[dec!(25.00)]);
    game.start(StakeRequest::new(dec!(10), Some(dec!(20.00))), StakeRequest::none())
        .await
        .unwrap();

    // 20.00x is reached near t = 37.5s and 25.00x near t = 44.9s.
    tokio::time::sleep(Duration::from_secs(40)).await;
    let status = game.status().await;
    assert_eq!(status.snapshot.state, RoundState::Flying);
    assert!(status.balance >= dec!(1190));
    assert!(status.message.starts_with("Bet 1 auto-cashed out at"));

    // A manual request afterwards has nothing left to settle.
    assert_eq!(game.request_cash_out(StakeId::One).await, Decimal::ZERO);
    game.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_freezes_balance_mid_flight() {
    let game = game(dec!(100), &[dec!(50)]);
    game.start(StakeRequest::new(dec!(40), None), StakeRequest::none())
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;

    game.shutdown().await;
    game.shutdown().await;
    assert!(game.is_shut_down());

    let frozen = game.snapshot().await;
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(game.snapshot().await, frozen);
    assert_eq!(game.request_cash_out(StakeId::One).await, Decimal::ZERO);
    assert_eq!(game.balance().await, dec!(60));
}

#[tokio::test(start_paused = true)]
async fn test_http_round_trip_through_a_full_round() {
    let game = game(dec!(100), &[dec!(1.50)]);
    let app = build_router(Arc::clone(&game));

    let start = Request::builder()
        .method("POST")
        .uri("/api/start")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            r#"{"one": {"amount": 10}, "two": {"amount": 5, "auto_cash_out": 1.2}}"#,
        ))
        .unwrap();
    let resp = app.clone().oneshot(start).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_body(resp).await["balance"].as_f64().unwrap(), 85.0);

    // Second start while flying is a conflict.
    let again = Request::builder()
        .method("POST")
        .uri("/api/start")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"one": {"amount": 1}}"#))
        .unwrap();
    let resp = app.clone().oneshot(again).await.unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    // Let the flight run past 1.50x (t ≈ 1.85s).
    tokio::time::sleep(Duration::from_secs(2)).await;

    let resp = app
        .clone()
        .oneshot(Request::builder().uri("/api/last-round").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let report = json_body(resp).await;
    assert_eq!(report["crash_point"].as_f64().unwrap(), 1.5);
    assert_eq!(report["outcomes"][0]["kind"], "lost");
    assert_eq!(report["outcomes"][1]["kind"], "won");
    assert_eq!(report["total_won"].as_f64().unwrap(), 6.0);

    let resp = app
        .clone()
        .oneshot(Request::builder().uri("/api/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = json_body(resp).await;
    assert_eq!(status["snapshot"]["state"], "Crashed");
    assert_eq!(status["crash_point"].as_f64().unwrap(), 1.5);
    assert_eq!(status["balance"].as_f64().unwrap(), 91.0);

    // After the cooldown the engine accepts a new round.
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(game.snapshot().await.state, RoundState::Idle);

    let resp = app
        .oneshot(Request::builder().uri("/api/history").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let history = json_body(resp).await;
    assert_eq!(history.as_array().unwrap().len(), 1);

    game.shutdown().await;
}
