//! Scheduler control handlers: start, stop, status, statistics, run.

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::{SchedulerControlResponse, StartSchedulerRequest, StatisticsParams};
use crate::app_state::AppState;
use crate::domain::JobStatistics;
use crate::error::{ErrorResponse, ServiceError};
use crate::service::{CycleReport, SchedulerStatus};

/// `POST /scheduler/start`: Start the monitoring loop.
///
/// # Errors
///
/// Returns [`ServiceError::InvalidRequest`] for a zero interval.
#[utoipa::path(
    post,
    path = "/api/v1/scheduler/start",
    tag = "Scheduler",
    summary = "Start the monitoring scheduler",
    description = "Runs one cycle immediately and then one per interval. A no-op when already running.",
    request_body = StartSchedulerRequest,
    responses(
        (status = 200, description = "Run-state after the request", body = SchedulerControlResponse),
        (status = 400, description = "Invalid interval", body = ErrorResponse),
    )
)]
pub async fn start_scheduler(
    State(state): State<AppState>,
    Json(req): Json<StartSchedulerRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let interval = req.interval_minutes.unwrap_or(state.default_interval_minutes);
    let changed = state.scheduler.start(interval).await?;
    Ok(Json(SchedulerControlResponse {
        changed,
        status: state.scheduler.status(),
    }))
}

/// `POST /scheduler/stop`: Stop future cycles.
#[utoipa::path(
    post,
    path = "/api/v1/scheduler/stop",
    tag = "Scheduler",
    summary = "Stop the monitoring scheduler",
    description = "Prevents future cycles. A cycle already executing runs to completion.",
    responses(
        (status = 200, description = "Run-state after the request", body = SchedulerControlResponse),
    )
)]
pub async fn stop_scheduler(State(state): State<AppState>) -> impl IntoResponse {
    let changed = state.scheduler.stop().await;
    Json(SchedulerControlResponse {
        changed,
        status: state.scheduler.status(),
    })
}

/// `GET /scheduler/status`: Current run-state.
#[utoipa::path(
    get,
    path = "/api/v1/scheduler/status",
    tag = "Scheduler",
    summary = "Scheduler status",
    responses(
        (status = 200, description = "Current run-state", body = SchedulerStatus),
    )
)]
pub async fn scheduler_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.scheduler.status())
}

/// `GET /scheduler/statistics`: Aggregates over the job run log.
///
/// # Errors
///
/// Returns [`ServiceError::InvalidRequest`] for an out-of-range window.
#[utoipa::path(
    get,
    path = "/api/v1/scheduler/statistics",
    tag = "Scheduler",
    summary = "Cycle statistics",
    params(StatisticsParams),
    responses(
        (status = 200, description = "Aggregated cycle counts", body = JobStatistics),
        (status = 400, description = "Invalid window", body = ErrorResponse),
    )
)]
pub async fn scheduler_statistics(
    State(state): State<AppState>,
    Query(params): Query<StatisticsParams>,
) -> Result<impl IntoResponse, ServiceError> {
    let stats = state.scheduler.statistics(params.days).await?;
    Ok(Json(stats))
}

/// `POST /scheduler/run`: Run one cycle now.
///
/// # Errors
///
/// Returns [`ServiceError::CycleInProgress`] if a cycle is executing.
#[utoipa::path(
    post,
    path = "/api/v1/scheduler/run",
    tag = "Scheduler",
    summary = "Run a cycle on demand",
    responses(
        (status = 200, description = "Cycle report", body = CycleReport),
        (status = 409, description = "A cycle is already running", body = ErrorResponse),
    )
)]
pub async fn run_cycle(State(state): State<AppState>) -> Result<impl IntoResponse, ServiceError> {
    let report = state.scheduler.run_cycle_now().await?;
    Ok(Json(report))
}

/// Scheduler routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/scheduler/start", post(start_scheduler))
        .route("/scheduler/stop", post(stop_scheduler))
        .route("/scheduler/status", get(scheduler_status))
        .route("/scheduler/statistics", get(scheduler_statistics))
        .route("/scheduler/run", post(run_cycle))
}
