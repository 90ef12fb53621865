//! Manual monitoring check DTO.

use serde::Deserialize;
use utoipa::ToSchema;

/// Request body for `POST /monitoring/check`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ManualCheckRequest {
    /// ASIN to check.
    pub asin: String,
    /// Owner of the monitoring configuration.
    pub owner: String,
}
