//! Control API for the alert checker.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use pricealert_alerts::{AlertChecker, LifecycleOutcome, StatsSnapshot};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::error;

#[derive(Debug, Serialize)]
struct StatusResponse {
    status: &'static str,
    running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stats: Option<StatsSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl StatusResponse {
    fn new(status: &'static str, running: bool) -> Self {
        Self {
            status,
            running,
            stats: None,
            error: None,
        }
    }
}

/// Create the control router.
pub fn create_router(checker: Arc<AlertChecker>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/alert-checker/start", post(start_handler))
        .route("/api/v1/alert-checker/stop", post(stop_handler))
        .route("/api/v1/alert-checker/status", get(status_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .with_state(checker)
}

/// Health check handler.
async fn health_handler() -> &'static str {
    "OK"
}

async fn start_handler(State(checker): State<Arc<AlertChecker>>) -> Response {
    match checker.start().await {
        Ok(outcome) => Json(StatusResponse::new(outcome.as_str(), true)).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to start alert checker");
            let mut body = StatusResponse::new("error", checker.is_running());
            body.error = Some(e.to_string());
            (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
        }
    }
}

async fn stop_handler(State(checker): State<Arc<AlertChecker>>) -> Json<StatusResponse> {
    let outcome: LifecycleOutcome = checker.stop().await;
    Json(StatusResponse::new(outcome.as_str(), false))
}

async fn status_handler(State(checker): State<Arc<AlertChecker>>) -> Json<StatusResponse> {
    let running = checker.is_running();
    let mut body = StatusResponse::new(if running { "running" } else { "stopped" }, running);
    body.stats = Some(checker.engine().stats().snapshot());
    Json(body)
}
