//! Monitoring inputs and outputs: configurations, pricing snapshots, alerts.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::ConfigId;

/// A seller's request to watch one ASIN.
///
/// Unique per `(asin, owner)`. Created by the configuration UI; this service
/// only advances `last_checked` and `check_count`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MonitoringConfig {
    /// Row identifier.
    pub id: ConfigId,
    /// Monitored ASIN.
    pub asin: String,
    /// Seller account that owns this configuration.
    pub owner: String,
    /// Higher values are checked first in each cycle.
    pub priority: i32,
    /// Inactive configurations are never loaded by the scheduler.
    pub is_active: bool,
    /// When the ASIN was last checked.
    pub last_checked: Option<DateTime<Utc>>,
    /// How many times the ASIN has been checked.
    pub check_count: i64,
}

impl MonitoringConfig {
    /// Creates an active configuration that has never been checked.
    #[must_use]
    pub fn new(asin: impl Into<String>, owner: impl Into<String>, priority: i32) -> Self {
        Self {
            id: ConfigId::new(),
            asin: asin.into(),
            owner: owner.into(),
            priority,
            is_active: true,
            last_checked: None,
            check_count: 0,
        }
    }
}

/// Competitive pricing for one ASIN at a point in time.
///
/// Transient: consumed immediately by alert evaluation and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PricingSnapshot {
    /// ASIN the snapshot belongs to.
    pub asin: String,
    /// The seller's own listing price, when they have an offer.
    #[serde(default)]
    pub our_price: Option<Decimal>,
    /// Current Buy Box price.
    #[serde(default)]
    pub buy_box_price: Option<Decimal>,
    /// Seller currently holding the Buy Box.
    #[serde(default)]
    pub buy_box_seller_id: Option<String>,
    /// Whether the seller holds the Buy Box, when the marketplace reports it.
    #[serde(default)]
    pub is_buy_box_winner: Option<bool>,
    /// Landed prices of competing offers.
    #[serde(default)]
    pub competitor_prices: Vec<Decimal>,
    /// Total number of offers on the listing.
    #[serde(default)]
    pub offer_count: u32,
    /// When the data was fetched.
    pub fetched_at: DateTime<Utc>,
}

impl PricingSnapshot {
    /// Returns the cheapest competing offer, if any.
    #[must_use]
    pub fn lowest_competitor_price(&self) -> Option<Decimal> {
        self.competitor_prices.iter().copied().min()
    }
}

/// Kind of competitive event an [`Alert`] reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// Another seller holds the Buy Box.
    BuyBoxLost,
    /// A competitor offers the listing below the seller's price.
    PriceUndercut,
}

/// How urgently an alert needs attention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    /// Informational.
    Info,
    /// Worth a look.
    Warning,
    /// Revenue at risk.
    Critical,
}

/// Result of evaluating one configuration against a pricing snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Alert {
    /// Alert identifier.
    #[schema(value_type = String, format = Uuid)]
    pub id: uuid::Uuid,
    /// ASIN the alert is about.
    pub asin: String,
    /// Owner of the monitoring configuration.
    pub owner: String,
    /// What happened.
    pub kind: AlertKind,
    /// How urgent it is.
    pub severity: AlertSeverity,
    /// Human-readable summary.
    pub message: String,
    /// Seller's price at evaluation time.
    pub our_price: Option<Decimal>,
    /// Competing price that triggered the alert.
    pub competitor_price: Option<Decimal>,
    /// When the alert was raised.
    pub created_at: DateTime<Utc>,
}
