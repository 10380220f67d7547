//! REST API endpoints.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use super::metrics;
use crate::query::{AskRequest, QueryService};
use crate::storage::VectorIndex;
use crate::sync::SyncEngine;
use crate::watcher::DebouncerHandle;
use crate::Error;

/// Shared state of the HTTP handlers.
pub struct AppState {
    pub query: QueryService,
    pub index: Arc<dyn VectorIndex>,
    pub engine: Arc<SyncEngine>,
    pub debouncer: DebouncerHandle,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub index: String,
}

/// JSON error body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Error returned by handlers.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    /// Blank questions are the caller's fault; everything else means a
    /// collaborator is down.
    fn from_ask(error: &Error) -> Self {
        let status = match error {
            Error::Config(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::SERVICE_UNAVAILABLE,
        };
        Self {
            status,
            message: error.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

/// Create REST API router.
pub fn create_rest_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ask", post(ask))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_endpoint))
        .route("/api/v1/status", get(status))
        .route("/api/v1/sync", post(trigger_sync))
        .with_state(state)
}

/// Answer a question from the indexed documents.
async fn ask(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AskRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let start = Instant::now();
    let result = state.query.ask(&request.question).await.map_err(|e| {
        let error = ApiError::from_ask(&e);
        if error.status == StatusCode::BAD_REQUEST {
            tracing::debug!(error = %e, "Rejected question");
        } else {
            tracing::warn!(error = %e, "Question could not be answered");
        }
        error
    });

    let status = result.as_ref().map_or_else(|e| e.status, |_| StatusCode::OK);
    metrics::record_request("ask", status.as_u16(), start.elapsed().as_secs_f64());

    result.map(Json)
}

/// Health check endpoint.
async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let index_status = match state.index.health_check().await {
        Ok(()) => "ok",
        Err(e) => {
            tracing::warn!(error = %e, "Index health check failed");
            "error"
        }
    };

    let response = HealthResponse {
        status: if index_status == "ok" {
            "healthy"
        } else {
            "unhealthy"
        }
        .to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        index: index_status.to_string(),
    };

    let status_code = if index_status == "ok" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    tracing::debug!(status = ?status_code, index = %index_status, "Health check");

    (status_code, Json(response))
}

/// Prometheus metrics endpoint.
async fn metrics_endpoint() -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        metrics::gather_text(),
    )
}

/// Status endpoint with statistics.
async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let documents = match state.index.count().await {
        Ok(count) => Some(count),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to count documents");
            None
        }
    };

    Json(serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "index": state.index.name(),
        "documents": documents,
        "docs_dir": state.engine.docs_dir().display().to_string(),
        "cycles": state.engine.cycles(),
        "debouncer": state.debouncer.status(),
        "last_report": state.engine.last_report(),
    }))
}

/// Queue a reconciliation through the debouncer.
async fn trigger_sync(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.debouncer.notify() {
        tracing::info!("Manual sync queued");
        (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({ "queued": true })),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "queued": false, "error": "sync worker stopped" })),
        )
    }
}
