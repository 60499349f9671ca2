mod common;

use std::sync::Arc;
use std::time::Duration;

use alert_dispatch::config::DispatchConfig;
use alert_dispatch::models::{RunSummary, WaitPolicy};
use alert_dispatch::server::{router, AppState};
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use common::{slow_strategy, static_strategy, Harness};
use tower::ServiceExt;

const SECRET: &str = "cron-s3cret";

fn app(harness: &Harness, secret: Option<&str>) -> Router {
    app_with(harness, DispatchConfig::default(), secret)
}

fn app_with(harness: &Harness, config: DispatchConfig, secret: Option<&str>) -> Router {
    let dispatcher = harness.dispatcher(config);
    router(Arc::new(AppState::new(dispatcher, secret.map(str::to_string))))
}

fn cron(method: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri("/api/cron");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn health_check_needs_no_credentials() {
    let harness = Harness::new().await;
    let response = app(&harness, Some(SECRET))
        .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn bad_or_missing_token_is_unauthorized() {
    let harness = Harness::new().await;
    let user = harness.user("owner@example.com").await;
    harness
        .due_alert(user, "Untouched", static_strategy(&["https://example.com/x"]), WaitPolicy::Count(1))
        .await;

    for token in [None, Some("wrong"), Some("cron-s3cre")] {
        let response = app(&harness, Some(SECRET)).oneshot(cron("POST", token)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    // No configured secret refuses everything.
    let response = app(&harness, None).oneshot(cron("GET", Some(SECRET))).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    assert_eq!(harness.scraper.fetch_count(), 0);
}

#[tokio::test]
async fn authorized_trigger_returns_the_summary() {
    let harness = Harness::new().await;
    let user = harness.user("owner@example.com").await;
    let alert = harness
        .due_alert(user, "Triggered", static_strategy(&["https://example.com/x"]), WaitPolicy::Count(1))
        .await;
    harness.repository.insert_subscription(user, alert, None).await.unwrap();

    for method in ["GET", "POST"] {
        let response = app(&harness, Some(SECRET)).oneshot(cron(method, Some(SECRET))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let summary: RunSummary = serde_json::from_slice(&body).unwrap();
        if method == "GET" {
            assert_eq!(summary.alerts_found, 1);
            assert_eq!(summary.succeeded, 1);
        } else {
            assert_eq!(summary.alerts_found, 0);
        }
    }
    assert_eq!(harness.recorder.sent_to("owner@example.com").len(), 1);
}

#[tokio::test]
async fn overlapping_trigger_conflicts() {
    let harness = Harness::new().await;
    let user = harness.user("owner@example.com").await;
    harness
        .due_alert(
            user,
            "Slow",
            slow_strategy(&["https://example.com/slow"], Duration::from_millis(500)),
            WaitPolicy::Count(1),
        )
        .await;

    let app = app(&harness, Some(SECRET));
    let (first, second) = tokio::join!(
        app.clone().oneshot(cron("POST", Some(SECRET))),
        app.oneshot(cron("POST", Some(SECRET))),
    );
    let mut statuses = [first.unwrap().status(), second.unwrap().status()];
    statuses.sort();
    assert_eq!(statuses, [StatusCode::OK, StatusCode::CONFLICT]);
}

#[tokio::test]
async fn cycle_deadline_fails_the_request_but_not_the_server() {
    let harness = Harness::new().await;
    let user = harness.user("owner@example.com").await;
    harness
        .due_alert(
            user,
            "Stuck",
            slow_strategy(&["https://example.com/stuck"], Duration::from_secs(10)),
            WaitPolicy::Count(1),
        )
        .await;

    let config = DispatchConfig {
        cycle_timeout_secs: 1,
        ..DispatchConfig::default()
    };
    let app = app_with(&harness, config, Some(SECRET));

    let response = app.clone().oneshot(cron("POST", Some(SECRET))).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert!(String::from_utf8_lossy(&body).contains("exceeded"));

    // The lock was released and the router keeps answering.
    let health = app
        .clone()
        .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(health.status(), StatusCode::OK);
    let retry = app.oneshot(cron("GET", Some(SECRET))).await.unwrap();
    assert_eq!(retry.status(), StatusCode::INTERNAL_SERVER_ERROR);
}
