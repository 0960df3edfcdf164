//! Pod instance status and restart endpoints.
//!
//! A pod instance is addressed as `{pod_type}-{index}`. Restarting kills its
//! tasks and leaves the relaunch to the recovery plan; replacing also flags
//! them as permanently failed so they come back on new resources.

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use keel_cluster::TaskState;
use keel_id::TaskId;
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::plan::RecoveryType;
use crate::scheduler::PodTask;
use crate::state::AppState;
use crate::store::GoalOverrideStatus;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_pods))
        .route("/{name}/status", get(get_pod_status))
        .route("/{name}/restart", post(restart_pod))
        .route("/{name}/replace", post(replace_pod))
}

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct PodStatusResponse {
    pub name: String,
    pub tasks: Vec<PodTaskResponse>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PodTaskResponse {
    pub name: String,
    pub id: TaskId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<TaskState>,
    pub goal_override: GoalOverrideStatus,
    #[serde(default)]
    pub permanently_failed: bool,
}

impl From<PodTask> for PodTaskResponse {
    fn from(task: PodTask) -> Self {
        Self {
            name: task.info.name,
            id: task.info.task_id,
            state: task.status.map(|s| s.state),
            goal_override: task.goal_override,
            permanently_failed: task.info.permanently_failed,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PodRestartResponse {
    pub pod: String,
    pub tasks: Vec<String>,
}

// =============================================================================
// Handlers
// =============================================================================

/// GET /v1/pods
async fn list_pods(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    let scheduler = state.scheduler().lock().await;
    let pods = scheduler.pods().map_err(|e| {
        tracing::error!(error = %e, "Failed to list pods");
        ApiError::internal("internal_error", "Failed to list pods")
    })?;
    Ok(Json(pods.into_keys().collect()))
}

/// GET /v1/pods/{name}/status
async fn get_pod_status(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<PodStatusResponse>, ApiError> {
    let scheduler = state.scheduler().lock().await;
    let tasks = scheduler
        .pod_tasks(&name)
        .map_err(|e| {
            tracing::error!(error = %e, pod = %name, "Failed to load pod");
            ApiError::internal("internal_error", "Failed to load pod")
        })?
        .ok_or_else(|| ApiError::pod_not_found(&name))?;
    Ok(Json(PodStatusResponse {
        name,
        tasks: tasks.into_iter().map(PodTaskResponse::from).collect(),
    }))
}

/// POST /v1/pods/{name}/restart
async fn restart_pod(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<PodRestartResponse>, ApiError> {
    restart(state, name, RecoveryType::Transient).await
}

/// POST /v1/pods/{name}/replace
async fn replace_pod(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<PodRestartResponse>, ApiError> {
    restart(state, name, RecoveryType::Permanent).await
}

async fn restart(
    state: AppState,
    name: String,
    recovery_type: RecoveryType,
) -> Result<Json<PodRestartResponse>, ApiError> {
    let mut scheduler = state.scheduler().lock().await;
    let tasks = scheduler
        .restart_pod(&name, recovery_type)
        .map_err(|e| {
            tracing::error!(error = %e, pod = %name, ?recovery_type, "Failed to restart pod");
            ApiError::internal("internal_error", "Failed to restart pod")
        })?
        .ok_or_else(|| ApiError::pod_not_found(&name))?;
    Ok(Json(PodRestartResponse { pod: name, tasks }))
}
