//! Append-only ledger rows: price history, rollback points, audit entries.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::RollbackPointId;

/// One row per attempted price change, successful or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PriceHistoryRecord {
    /// Row identifier.
    #[schema(value_type = String, format = Uuid)]
    pub id: uuid::Uuid,
    /// Seller SKU.
    pub sku: String,
    /// Marketplace ASIN.
    pub asin: String,
    /// Catalog record the change targeted.
    pub record_id: String,
    /// Canonical price before the attempt.
    pub old_price: Option<Decimal>,
    /// Price that was submitted.
    pub new_price: Decimal,
    /// Why the change was requested (e.g. `"buy_box_match"`).
    pub reason: String,
    /// Margin validation outcome at submission time.
    pub validation_results: serde_json::Value,
    /// Actor that requested the change.
    pub updated_by: String,
    /// Whether the marketplace acknowledged the submission.
    pub success: bool,
    /// Failure description when `success` is false.
    pub error_message: Option<String>,
    /// Marketplace feed identifier when acknowledged.
    pub external_update_id: Option<String>,
    /// When the attempt was recorded.
    pub created_at: DateTime<Utc>,
}

/// Immutable price snapshot taken before a risky change.
///
/// Only `is_active`, `used_at` and `used_by` ever change, and only once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RollbackPoint {
    /// Row identifier.
    pub id: RollbackPointId,
    /// Seller SKU.
    pub sku: String,
    /// Marketplace ASIN.
    pub asin: String,
    /// Canonical price at snapshot time.
    pub snapshot_price: Decimal,
    /// Caller-supplied reason.
    pub reason: String,
    /// Actor that created the point.
    pub created_by: String,
    /// When the point was created.
    pub created_at: DateTime<Utc>,
    /// False once the point has been consumed.
    pub is_active: bool,
    /// When the point was consumed.
    pub used_at: Option<DateTime<Utc>>,
    /// Actor that consumed the point.
    pub used_by: Option<String>,
}

impl RollbackPoint {
    /// Creates an active, unused rollback point.
    #[must_use]
    pub fn new(
        sku: impl Into<String>,
        asin: impl Into<String>,
        snapshot_price: Decimal,
        reason: impl Into<String>,
        created_by: impl Into<String>,
    ) -> Self {
        Self {
            id: RollbackPointId::new(),
            sku: sku.into(),
            asin: asin.into(),
            snapshot_price,
            reason: reason.into(),
            created_by: created_by.into(),
            created_at: Utc::now(),
            is_active: true,
            used_at: None,
            used_by: None,
        }
    }
}

/// Action recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// A price change was submitted to the marketplace.
    PriceUpdateSubmitted,
    /// A price change submission failed.
    PriceUpdateFailed,
    /// A rollback point was created.
    RollbackPointCreated,
    /// A rollback point was applied.
    RollbackApplied,
}

impl AuditAction {
    /// Returns the action as stored in the database.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::PriceUpdateSubmitted => "price_update_submitted",
            Self::PriceUpdateFailed => "price_update_failed",
            Self::RollbackPointCreated => "rollback_point_created",
            Self::RollbackApplied => "rollback_applied",
        }
    }
}

/// Append-only audit row, written regardless of business outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AuditLogEntry {
    /// Row identifier.
    #[schema(value_type = String, format = Uuid)]
    pub id: uuid::Uuid,
    /// Who performed the action.
    pub actor_id: String,
    /// What was done.
    pub action: AuditAction,
    /// Kind of resource touched (e.g. `"product_pricing"`).
    pub resource_type: String,
    /// Identifier of the resource touched.
    pub resource_id: String,
    /// Full request/response payload.
    pub details: serde_json::Value,
    /// When the action happened.
    pub created_at: DateTime<Utc>,
}

impl AuditLogEntry {
    /// Creates an entry stamped with the current time.
    #[must_use]
    pub fn new(
        actor_id: impl Into<String>,
        action: AuditAction,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            actor_id: actor_id.into(),
            action,
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
            details,
            created_at: Utc::now(),
        }
    }
}
