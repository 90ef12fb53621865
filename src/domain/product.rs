//! Product pricing records and the feed classification they require.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Marker written next to the canonical price when this service changed it.
pub const BUY_BOX_MATCH_SOURCE: &str = "buy_box_match";

/// Marker written when a rollback point was applied.
pub const ROLLBACK_SOURCE: &str = "rollback";

/// Price-independent costs plus the commission rate applied to a price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CostBasis {
    /// Base cost, packaging, shipping, VAT and other price-independent costs.
    pub fixed_operating_cost: Decimal,
    /// Marketplace commission as a fraction of the selling price.
    pub variable_fee_rate: Decimal,
}

/// The seller's canonical price and cost data for one catalog record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ProductPricingRecord {
    /// Catalog record identifier.
    pub record_id: String,
    /// Seller SKU.
    pub sku: String,
    /// Marketplace ASIN.
    pub asin: String,
    /// Canonical current price. Only changed after a successful submission.
    pub current_price: Option<Decimal>,
    /// Base cost, packaging, shipping, VAT and other price-independent costs.
    pub fixed_operating_cost: Option<Decimal>,
    /// Marketplace commission as a fraction of the selling price.
    pub variable_fee_rate: Option<Decimal>,
    /// When the canonical price last changed.
    pub last_price_update: Option<DateTime<Utc>>,
    /// What changed the canonical price last.
    pub price_update_source: Option<String>,
}

impl ProductPricingRecord {
    /// Returns the cost basis when both cost inputs are known.
    #[must_use]
    pub fn cost_basis(&self) -> Option<CostBasis> {
        match (self.fixed_operating_cost, self.variable_fee_rate) {
            (Some(fixed_operating_cost), Some(variable_fee_rate)) => Some(CostBasis {
                fixed_operating_cost,
                variable_fee_rate,
            }),
            _ => None,
        }
    }
}

/// Listing metadata the marketplace feed format requires per SKU.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Classification {
    /// Marketplace product type (e.g. `"HOME_BED_AND_BATH"`).
    pub product_type: String,
    /// Marketplace the listing lives in.
    pub marketplace_id: String,
}
