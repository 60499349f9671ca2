//! HTTP trigger for the dispatch cycle, meant to be hit by an external cron.
//!
//! A cycle that blows its global deadline is fatal for that cycle only: the
//! trigger answers 500 with the timeout and the server stays up for the next
//! tick. The `run` command is the one-shot mode that exits non-zero instead.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tokio::sync::Mutex;

use crate::dispatcher::Dispatcher;
use crate::error::{AppError, Result};

pub struct AppState {
    dispatcher: Dispatcher,
    cron_secret: Option<String>,
    running: Mutex<()>,
}

impl AppState {
    pub fn new(dispatcher: Dispatcher, cron_secret: Option<String>) -> Self {
        Self {
            dispatcher,
            cron_secret,
            running: Mutex::new(()),
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/cron", get(trigger).post(trigger))
        .route("/healthz", get(health))
        .with_state(state)
}

pub async fn serve(state: Arc<AppState>, addr: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "cron trigger listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn trigger(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if !authorized(&headers, state.cron_secret.as_deref()) {
        tracing::warn!("rejected cron trigger with bad or missing credentials");
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let Ok(_guard) = state.running.try_lock() else {
        return (StatusCode::CONFLICT, "a dispatch cycle is already running").into_response();
    };

    match state.dispatcher.run_cycle().await {
        Ok(summary) => Json(summary).into_response(),
        Err(e @ AppError::CycleTimeout(_)) => {
            tracing::error!(error = %e, "dispatch cycle aborted, waiting for the next trigger");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "dispatch cycle failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// Without a configured secret every request is refused.
fn authorized(headers: &HeaderMap, secret: Option<&str>) -> bool {
    let Some(secret) = secret.filter(|s| !s.is_empty()) else {
        return false;
    };
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .is_some_and(|token| constant_time_eq(token.as_bytes(), secret.as_bytes()))
}

/// Compares every byte regardless of where the first mismatch is. Only the
/// length leaks.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn constant_time_comparison() {
        assert!(constant_time_eq(b"secret", b"secret"));
        assert!(!constant_time_eq(b"secret", b"secreT"));
        assert!(!constant_time_eq(b"secret", b"secret2"));
        assert!(constant_time_eq(b"", b""));
    }

    #[test]
    fn bearer_token_must_match() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer s3cret"));

        assert!(authorized(&headers, Some("s3cret")));
        assert!(!authorized(&headers, Some("other")));
        assert!(!authorized(&headers, None));
        assert!(!authorized(&headers, Some("")));
        assert!(!authorized(&HeaderMap::new(), Some("s3cret")));
    }
}
