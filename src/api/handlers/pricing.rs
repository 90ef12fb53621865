//! Pricing handlers: Buy Box match, history, rollback points.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::{
    ApplyRollbackRequest, CreateRollbackPointRequest, HistoryParams, PriceMatchBody,
    RollbackPointsParams,
};
use crate::app_state::AppState;
use crate::domain::{PriceHistoryRecord, RollbackPoint, RollbackPointId};
use crate::error::{ErrorResponse, ServiceError};
use crate::marketplace::FeedFailureKind;
use crate::service::{PriceMatchOutcome, PriceMatchRequest};

/// HTTP status carrying a price change outcome.
fn outcome_status(outcome: &PriceMatchOutcome) -> StatusCode {
    match outcome {
        PriceMatchOutcome::Submitted(_) => StatusCode::OK,
        PriceMatchOutcome::MarginRejected { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        PriceMatchOutcome::SubmissionFailed(failure) => match failure.kind {
            FeedFailureKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            FeedFailureKind::InvalidRequest => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::BAD_GATEWAY,
        },
    }
}

/// `POST /pricing/match`: Submit a Buy Box price match.
///
/// # Errors
///
/// Returns [`ServiceError`] for invalid input, missing credentials, missing
/// classification or an unknown record.
#[utoipa::path(
    post,
    path = "/api/v1/pricing/match",
    tag = "Pricing",
    summary = "Match the Buy Box price",
    description = "Validates the margin, submits the price through the feed rate limiter and records history and audit rows. Margin rejections and categorized submission failures are returned as outcomes.",
    request_body = PriceMatchBody,
    responses(
        (status = 200, description = "Price accepted by the marketplace", body = PriceMatchOutcome),
        (status = 422, description = "Rejected by the margin gate or the marketplace", body = PriceMatchOutcome),
        (status = 429, description = "Marketplace throttled the feed", body = PriceMatchOutcome),
        (status = 502, description = "Marketplace failure", body = PriceMatchOutcome),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 404, description = "Unknown record", body = ErrorResponse),
        (status = 503, description = "Marketplace credentials missing", body = ErrorResponse),
    )
)]
pub async fn price_match(
    State(state): State<AppState>,
    Json(body): Json<PriceMatchBody>,
) -> Result<impl IntoResponse, ServiceError> {
    let request = PriceMatchRequest::from(body);
    let outcome = state.price_updates.request_price_match(&request).await?;
    Ok((outcome_status(&outcome), Json(outcome)))
}

/// `GET /pricing/history`: Price history for a SKU, newest first.
///
/// # Errors
///
/// Returns [`ServiceError::InvalidRequest`] for an empty SKU.
#[utoipa::path(
    get,
    path = "/api/v1/pricing/history",
    tag = "Pricing",
    summary = "Price history",
    params(HistoryParams),
    responses(
        (status = 200, description = "History rows", body = Vec<PriceHistoryRecord>),
        (status = 400, description = "Invalid request", body = ErrorResponse),
    )
)]
pub async fn price_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Result<impl IntoResponse, ServiceError> {
    let rows = state
        .price_updates
        .price_history(&params.sku, params.limit)
        .await?;
    Ok(Json(rows))
}

/// `POST /pricing/rollback-points`: Snapshot the current price of a SKU.
///
/// # Errors
///
/// Returns [`ServiceError::RecordNotFound`] for an unknown SKU.
#[utoipa::path(
    post,
    path = "/api/v1/pricing/rollback-points",
    tag = "Pricing",
    summary = "Create a rollback point",
    request_body = CreateRollbackPointRequest,
    responses(
        (status = 201, description = "Rollback point created", body = RollbackPoint),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 404, description = "Unknown SKU", body = ErrorResponse),
    )
)]
pub async fn create_rollback_point(
    State(state): State<AppState>,
    Json(req): Json<CreateRollbackPointRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let point = state
        .price_updates
        .create_rollback_point(&req.sku, &req.reason, &req.actor)
        .await?;
    Ok((StatusCode::CREATED, Json(point)))
}

/// `GET /pricing/rollback-points`: Rollback points for a SKU.
///
/// # Errors
///
/// Returns [`ServiceError::Persistence`] if the ledger cannot be read.
#[utoipa::path(
    get,
    path = "/api/v1/pricing/rollback-points",
    tag = "Pricing",
    summary = "List rollback points",
    params(RollbackPointsParams),
    responses(
        (status = 200, description = "Rollback points, newest first", body = Vec<RollbackPoint>),
    )
)]
pub async fn list_rollback_points(
    State(state): State<AppState>,
    Query(params): Query<RollbackPointsParams>,
) -> Result<impl IntoResponse, ServiceError> {
    let points = state.price_updates.list_rollback_points(&params.sku).await?;
    Ok(Json(points))
}

/// `POST /pricing/rollback-points/{id}/apply`: Restore a snapshot price.
///
/// # Errors
///
/// Returns [`ServiceError::RollbackPointNotFound`] or
/// [`ServiceError::RollbackPointUsed`], plus the errors of a price match.
#[utoipa::path(
    post,
    path = "/api/v1/pricing/rollback-points/{id}/apply",
    tag = "Pricing",
    summary = "Apply a rollback point",
    params(
        ("id" = uuid::Uuid, Path, description = "Rollback point UUID"),
    ),
    request_body = ApplyRollbackRequest,
    responses(
        (status = 200, description = "Snapshot price accepted", body = PriceMatchOutcome),
        (status = 404, description = "Rollback point not found", body = ErrorResponse),
        (status = 409, description = "Rollback point already used", body = ErrorResponse),
    )
)]
pub async fn apply_rollback(
    State(state): State<AppState>,
    Path(id): Path<uuid::Uuid>,
    Json(req): Json<ApplyRollbackRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let outcome = state
        .price_updates
        .apply_rollback(RollbackPointId::from_uuid(id), &req.actor, req.override_margin)
        .await?;
    Ok((outcome_status(&outcome), Json(outcome)))
}

/// Pricing routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/pricing/match", post(price_match))
        .route("/pricing/history", get(price_history))
        .route(
            "/pricing/rollback-points",
            post(create_rollback_point).get(list_rollback_points),
        )
        .route("/pricing/rollback-points/{id}/apply", post(apply_rollback))
}
