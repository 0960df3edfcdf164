//! Plan status and control endpoints.
//!
//! Reads answer 200 when the plan is complete and 503 while it still has
//! work left. Commands answer 208 when the plan is already in the requested
//! state. Phases and steps are addressed by ID or by name.

use std::collections::BTreeMap;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::error::ApiError;
use crate::plan::{Element, Plan, PlanInfo, Status, StepAddr};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_plans))
        .route("/{name}", get(get_plan))
        .route("/{name}/status", get(get_plan_status))
        .route("/{name}/start", post(start_plan))
        .route("/{name}/stop", post(stop_plan))
        .route("/{name}/continue", post(continue_plan))
        .route("/{name}/interrupt", post(interrupt_plan))
        .route("/{name}/forceComplete", post(force_complete))
        .route("/{name}/restart", post(restart))
}

// =============================================================================
// Request/Response Types
// =============================================================================

/// Optional phase/step selector for commands.
#[derive(Debug, Default, Deserialize)]
pub struct Selector {
    pub phase: Option<String>,
    pub step: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CommandResult {
    pub message: String,
}

impl CommandResult {
    fn received(command: impl std::fmt::Display) -> Json<Self> {
        Json(Self {
            message: format!("Received cmd: {command}"),
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PlanStatusResponse {
    pub name: String,
    pub status: Status,
    pub strategy: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

// =============================================================================
// Handlers
// =============================================================================

/// GET /v1/plans
async fn list_plans(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.scheduler().lock().await.plan_names())
}

/// GET /v1/plans/{name}
async fn get_plan(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    let scheduler = state.scheduler().lock().await;
    let plan = scheduler
        .plan(&name)
        .ok_or_else(|| ApiError::plan_not_found(&name))?;
    Ok((completion_status(plan), Json(PlanInfo::from_plan(plan))).into_response())
}

/// GET /v1/plans/{name}/status
async fn get_plan_status(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    let scheduler = state.scheduler().lock().await;
    let plan = scheduler
        .plan(&name)
        .ok_or_else(|| ApiError::plan_not_found(&name))?;
    let summary = PlanStatusResponse {
        name: plan.name().to_string(),
        status: plan.status(),
        strategy: plan.strategy_name().to_string(),
        errors: plan.all_errors(),
    };
    Ok((completion_status(plan), Json(summary)).into_response())
}

/// POST /v1/plans/{name}/start
///
/// Restarts a complete plan, then lets it proceed. The optional JSON body
/// maps environment variable names to values handed to launched tasks.
async fn start_plan(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let parameters = parse_parameters(&body)?;

    let mut scheduler = state.scheduler().lock().await;
    let plan = scheduler
        .plan_mut(&name)
        .ok_or_else(|| ApiError::plan_not_found(&name))?;
    plan.update_parameters(&parameters);
    if plan.is_complete() {
        plan.restart();
    }
    plan.proceed();
    scheduler.plans_changed();

    info!(plan = %name, ?parameters, "Started plan by operator request");
    Ok(CommandResult::received(format!("start {name}")).into_response())
}

/// POST /v1/plans/{name}/stop
async fn stop_plan(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    let mut scheduler = state.scheduler().lock().await;
    let plan = scheduler
        .plan_mut(&name)
        .ok_or_else(|| ApiError::plan_not_found(&name))?;
    plan.interrupt();
    plan.restart();
    scheduler.plans_changed();

    info!(plan = %name, "Stopped plan by operator request");
    Ok(CommandResult::received("stop").into_response())
}

/// POST /v1/plans/{name}/continue?phase=
async fn continue_plan(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(selector): Query<Selector>,
) -> Result<Response, ApiError> {
    let mut scheduler = state.scheduler().lock().await;
    let plan = scheduler
        .plan_mut(&name)
        .ok_or_else(|| ApiError::plan_not_found(&name))?;

    match selector.phase.as_deref() {
        Some(phase) => {
            let phases = select_phases(plan, phase)?;
            let settled = |check: fn(&crate::plan::Phase) -> bool| {
                phases.iter().all(|&i| check(&plan.phases()[i]))
            };
            if settled(|p| p.status().is_running()) || settled(|p| p.is_complete()) {
                return Ok(StatusCode::ALREADY_REPORTED.into_response());
            }
            for i in phases {
                plan.phases_mut()[i].proceed();
            }
        }
        None => {
            if plan.status().is_running() || plan.is_complete() {
                return Ok(StatusCode::ALREADY_REPORTED.into_response());
            }
            plan.proceed();
        }
    }
    scheduler.plans_changed();

    info!(plan = %name, phase = ?selector.phase, "Continued plan by operator request");
    Ok(CommandResult::received("continue").into_response())
}

/// POST /v1/plans/{name}/interrupt?phase=
async fn interrupt_plan(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(selector): Query<Selector>,
) -> Result<Response, ApiError> {
    let mut scheduler = state.scheduler().lock().await;
    let plan = scheduler
        .plan_mut(&name)
        .ok_or_else(|| ApiError::plan_not_found(&name))?;

    match selector.phase.as_deref() {
        Some(phase) => {
            let phases = select_phases(plan, phase)?;
            let settled = |check: fn(&crate::plan::Phase) -> bool| {
                phases.iter().all(|&i| check(&plan.phases()[i]))
            };
            if settled(|p| p.is_interrupted()) || settled(|p| p.is_complete()) {
                return Ok(StatusCode::ALREADY_REPORTED.into_response());
            }
            for i in phases {
                plan.phases_mut()[i].interrupt();
            }
        }
        None => {
            if plan.is_interrupted() || plan.is_complete() {
                return Ok(StatusCode::ALREADY_REPORTED.into_response());
            }
            plan.interrupt();
        }
    }
    scheduler.plans_changed();

    info!(plan = %name, phase = ?selector.phase, "Interrupted plan by operator request");
    Ok(CommandResult::received("interrupt").into_response())
}

/// POST /v1/plans/{name}/forceComplete?phase=&step=
async fn force_complete(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(selector): Query<Selector>,
) -> Result<Response, ApiError> {
    let (Some(phase), Some(step)) = (selector.phase.as_deref(), selector.step.as_deref()) else {
        return Err(ApiError::bad_request(
            "bad_request",
            "forceComplete requires both phase and step",
        ));
    };

    let mut scheduler = state.scheduler().lock().await;
    let plan = scheduler
        .plan_mut(&name)
        .ok_or_else(|| ApiError::plan_not_found(&name))?;
    let phases = select_phases(plan, phase)?;
    let addr = select_step(plan, &phases, step)?;
    let Some(target) = plan.step_mut(addr) else {
        return Err(ApiError::step_not_found(step));
    };
    if target.is_complete() {
        return Ok(StatusCode::ALREADY_REPORTED.into_response());
    }
    target.force_complete();
    scheduler.plans_changed();

    info!(plan = %name, phase, step, "Force-completed step by operator request");
    Ok(CommandResult::received("forceComplete").into_response())
}

/// POST /v1/plans/{name}/restart?phase=&step=
async fn restart(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(selector): Query<Selector>,
) -> Result<Response, ApiError> {
    let mut scheduler = state.scheduler().lock().await;
    let plan = scheduler
        .plan_mut(&name)
        .ok_or_else(|| ApiError::plan_not_found(&name))?;

    match (selector.phase.as_deref(), selector.step.as_deref()) {
        (None, None) => {
            plan.restart();
            plan.proceed();
        }
        (Some(phase), None) => {
            for i in select_phases(plan, phase)? {
                let phase = &mut plan.phases_mut()[i];
                phase.restart();
                phase.proceed();
            }
        }
        (Some(phase), Some(step)) => {
            let phases = select_phases(plan, phase)?;
            let addr = select_step(plan, &phases, step)?;
            let Some(target) = plan.step_mut(addr) else {
                return Err(ApiError::step_not_found(step));
            };
            target.restart();
            target.proceed();
        }
        (None, Some(_)) => {
            return Err(ApiError::bad_request(
                "bad_request",
                "restarting a step requires its phase",
            ));
        }
    }
    scheduler.plans_changed();

    info!(plan = %name, phase = ?selector.phase, step = ?selector.step, "Restarted by operator request");
    Ok(CommandResult::received("restart").into_response())
}

// =============================================================================
// Helpers
// =============================================================================

fn completion_status(plan: &Plan) -> StatusCode {
    if plan.is_complete() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

fn select_phases(plan: &Plan, phase: &str) -> Result<Vec<usize>, ApiError> {
    let phases = plan.find_phases(phase);
    if phases.is_empty() {
        return Err(ApiError::phase_not_found(phase));
    }
    Ok(phases)
}

/// The single step named `step` across `phases`.
fn select_step(plan: &Plan, phases: &[usize], step: &str) -> Result<StepAddr, ApiError> {
    let matches: Vec<StepAddr> = phases
        .iter()
        .flat_map(|&phase| {
            plan.phases()[phase]
                .find_steps(step)
                .into_iter()
                .map(move |step| StepAddr { phase, step })
        })
        .collect();
    match matches.as_slice() {
        [addr] => Ok(*addr),
        _ => Err(ApiError::step_not_found(step)),
    }
}

fn parse_parameters(body: &[u8]) -> Result<BTreeMap<String, String>, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(BTreeMap::new());
    }
    let parameters: BTreeMap<String, String> = serde_json::from_slice(body).map_err(|e| {
        ApiError::bad_request("invalid_parameter", format!("Couldn't parse parameters: {e}"))
    })?;
    if let Some(key) = parameters.keys().find(|k| !is_env_var_name(k)) {
        return Err(ApiError::bad_request(
            "invalid_parameter",
            format!("Couldn't parse parameters: {key} is not a valid environment variable name"),
        ));
    }
    Ok(parameters)
}

/// Matches `[A-Za-z_][A-Za-z0-9_]*`.
fn is_env_var_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
