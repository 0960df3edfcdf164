//! Health check endpoints.
//!
//! `/readyz` only reports ready once the framework has registered with the
//! cluster manager.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::state::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct HealthResponse {
    /// "ok" or "degraded".
    pub status: String,
    pub service: String,
    pub version: String,
    /// Current timestamp (RFC 3339).
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub framework_id: Option<String>,
}

impl HealthResponse {
    fn new(ok: bool, framework_id: Option<String>) -> Self {
        Self {
            status: if ok { "ok" } else { "degraded" }.to_string(),
            service: "keel-scheduler".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: Utc::now().to_rfc3339(),
            framework_id,
        }
    }
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/livez", get(livez))
}

async fn healthz() -> impl IntoResponse {
    Json(HealthResponse::new(true, None))
}

/// Returns 503 until the framework is registered.
async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let framework_id = state.scheduler().lock().await.framework_id();
    let ready = framework_id.is_some();
    let response = HealthResponse::new(ready, framework_id.map(|id| id.to_string()));

    if ready {
        (StatusCode::OK, Json(response))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}

async fn livez() -> impl IntoResponse {
    StatusCode::OK
}
