//! Manual single-ASIN check.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};

use crate::api::dto::ManualCheckRequest;
use crate::app_state::AppState;
use crate::error::{ErrorResponse, ServiceError};
use crate::service::ManualCheckResult;

/// `POST /monitoring/check`: Check one ASIN synchronously.
///
/// # Errors
///
/// Returns [`ServiceError::ConfigNotFound`] for an unknown `(asin, owner)`.
#[utoipa::path(
    post,
    path = "/api/v1/monitoring/check",
    tag = "Monitoring",
    summary = "Manual check",
    description = "Fetches pricing for one monitored ASIN, evaluates it and dispatches any alerts.",
    request_body = ManualCheckRequest,
    responses(
        (status = 200, description = "Check result", body = ManualCheckResult),
        (status = 400, description = "Missing identifiers", body = ErrorResponse),
        (status = 404, description = "No such monitoring configuration", body = ErrorResponse),
    )
)]
pub async fn manual_check(
    State(state): State<AppState>,
    Json(req): Json<ManualCheckRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let result = state.scheduler.run_manual_check(&req.asin, &req.owner).await?;
    Ok(Json(result))
}

/// Monitoring routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/monitoring/check", post(manual_check))
}
