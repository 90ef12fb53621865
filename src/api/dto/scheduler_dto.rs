//! Scheduler control DTOs.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::service::SchedulerStatus;

/// Request body for `POST /scheduler/start`.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct StartSchedulerRequest {
    /// Minutes between cycles. Defaults to `SCHEDULER_INTERVAL_MINUTES`.
    #[serde(default)]
    pub interval_minutes: Option<u64>,
}

/// Response for start and stop requests.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SchedulerControlResponse {
    /// Whether the request changed the run-state.
    pub changed: bool,
    /// Run-state after the request.
    pub status: SchedulerStatus,
}

/// Query parameters for `GET /scheduler/statistics`.
#[derive(Debug, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StatisticsParams {
    /// Window length in days (1 to 365). Defaults to 7.
    #[serde(default = "default_days")]
    pub days: u32,
}

fn default_days() -> u32 {
    7
}
