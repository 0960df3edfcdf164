//! Event ingestion endpoints, mounted in dev mode only.
//!
//! They stand in for the cluster-manager connection: each request is turned
//! into a [`SchedulerEvent`] and queued for the scheduler worker.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{post, put},
    Json, Router,
};
use keel_cluster::{Offer, TaskStatus};
use serde::Serialize;
use tracing::debug;

use crate::api::error::ApiError;
use crate::spec::ServiceSpec;
use crate::state::AppState;
use crate::worker::SchedulerEvent;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/offers", post(post_offers))
        .route("/status", post(post_status))
        .route("/spec", put(put_spec))
}

#[derive(Debug, Serialize)]
pub struct QueuedResponse {
    pub queued: &'static str,
}

/// POST /v1/offers
async fn post_offers(
    State(state): State<AppState>,
    Json(offers): Json<Vec<Offer>>,
) -> Result<Response, ApiError> {
    debug!(offers = offers.len(), "Queueing offer batch");
    enqueue(&state, SchedulerEvent::Offers(offers), "offers").await
}

/// POST /v1/status
async fn post_status(
    State(state): State<AppState>,
    Json(status): Json<TaskStatus>,
) -> Result<Response, ApiError> {
    debug!(task_id = %status.task_id, state = %status.state, "Queueing task status");
    enqueue(&state, SchedulerEvent::Status(status), "status").await
}

/// PUT /v1/spec
///
/// The body is a TOML service spec.
async fn put_spec(State(state): State<AppState>, body: String) -> Result<Response, ApiError> {
    let spec = ServiceSpec::from_toml(&body)
        .map_err(|e| ApiError::bad_request("invalid_spec", e.to_string()))?;
    enqueue(&state, SchedulerEvent::SpecUpdated(Box::new(spec)), "spec").await
}

async fn enqueue(
    state: &AppState,
    event: SchedulerEvent,
    kind: &'static str,
) -> Result<Response, ApiError> {
    state.events().send(event).await.map_err(|_| {
        ApiError::service_unavailable("worker_unavailable", "scheduler worker is not running")
    })?;
    Ok((StatusCode::ACCEPTED, Json(QueuedResponse { queued: kind })).into_response())
}
