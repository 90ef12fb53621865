//! Price submission, history and rollback DTOs.
//!
//! Prices are decimal strings on the wire (`"13.49"`); plain JSON numbers
//! are accepted on input.

use rust_decimal::Decimal;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

use crate::service::PriceMatchRequest;

/// Request body for `POST /pricing/match`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct PriceMatchBody {
    /// Marketplace ASIN.
    pub asin: String,
    /// Seller SKU.
    pub sku: String,
    /// Price to submit.
    #[schema(value_type = String, example = "13.49")]
    pub target_price: Decimal,
    /// Catalog record holding the canonical price.
    pub record_id: String,
    /// Actor requesting the change.
    pub owner: String,
    /// Skip the margin safety gate.
    #[serde(default)]
    pub override_margin: bool,
}

impl From<PriceMatchBody> for PriceMatchRequest {
    fn from(body: PriceMatchBody) -> Self {
        Self {
            asin: body.asin,
            sku: body.sku,
            target_price: body.target_price,
            record_id: body.record_id,
            owner: body.owner,
            override_margin: body.override_margin,
        }
    }
}

/// Query parameters for `GET /pricing/history`.
#[derive(Debug, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct HistoryParams {
    /// Seller SKU.
    pub sku: String,
    /// Maximum rows (default 50, max 500).
    #[serde(default)]
    pub limit: Option<u32>,
}

/// Request body for `POST /pricing/rollback-points`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateRollbackPointRequest {
    /// Seller SKU whose current price is snapshotted.
    pub sku: String,
    /// Why the snapshot is taken.
    #[serde(default)]
    pub reason: String,
    /// Actor creating the point.
    pub actor: String,
}

/// Query parameters for `GET /pricing/rollback-points`.
#[derive(Debug, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RollbackPointsParams {
    /// Seller SKU.
    pub sku: String,
}

/// Request body for `POST /pricing/rollback-points/{id}/apply`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ApplyRollbackRequest {
    /// Actor applying the point.
    pub actor: String,
    /// Skip the margin safety gate.
    #[serde(default)]
    pub override_margin: bool,
}
