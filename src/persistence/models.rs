//! Database row models and their conversions into domain types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::{
    AuditAction, AuditLogEntry, Classification, ConfigId, JobRun, JobRunMetadata, JobStatus,
    MonitoringConfig, PriceHistoryRecord, ProductPricingRecord, RollbackPoint, RollbackPointId,
};
use crate::error::ServiceError;

/// A row from the `monitoring_configs` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MonitoringConfigRow {
    /// Row ID.
    pub id: Uuid,
    /// Monitored ASIN.
    pub asin: String,
    /// Owning seller account.
    pub owner_id: String,
    /// Check priority.
    pub priority: i32,
    /// Active flag.
    pub is_active: bool,
    /// Last check timestamp.
    pub last_checked: Option<DateTime<Utc>>,
    /// Number of checks.
    pub check_count: i64,
}

impl From<MonitoringConfigRow> for MonitoringConfig {
    fn from(row: MonitoringConfigRow) -> Self {
        Self {
            id: ConfigId::from_uuid(row.id),
            asin: row.asin,
            owner: row.owner_id,
            priority: row.priority,
            is_active: row.is_active,
            last_checked: row.last_checked,
            check_count: row.check_count,
        }
    }
}

/// A row from the `product_pricing` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProductPricingRow {
    /// Catalog record ID.
    pub record_id: String,
    /// Seller SKU.
    pub sku: String,
    /// Marketplace ASIN.
    pub asin: String,
    /// Canonical price.
    pub current_price: Option<Decimal>,
    /// Price-independent costs.
    pub fixed_operating_cost: Option<Decimal>,
    /// Commission rate.
    pub variable_fee_rate: Option<Decimal>,
    /// Last canonical price change.
    pub last_price_update: Option<DateTime<Utc>>,
    /// Source of the last change.
    pub price_update_source: Option<String>,
}

impl From<ProductPricingRow> for ProductPricingRecord {
    fn from(row: ProductPricingRow) -> Self {
        Self {
            record_id: row.record_id,
            sku: row.sku,
            asin: row.asin,
            current_price: row.current_price,
            fixed_operating_cost: row.fixed_operating_cost,
            variable_fee_rate: row.variable_fee_rate,
            last_price_update: row.last_price_update,
            price_update_source: row.price_update_source,
        }
    }
}

/// A row from the `product_classifications` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ClassificationRow {
    /// Marketplace product type.
    pub product_type: String,
    /// Marketplace ID.
    pub marketplace_id: String,
}

impl From<ClassificationRow> for Classification {
    fn from(row: ClassificationRow) -> Self {
        Self {
            product_type: row.product_type,
            marketplace_id: row.marketplace_id,
        }
    }
}

/// A row from the `job_run_log` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct JobRunRow {
    /// Row ID.
    pub id: Uuid,
    /// Status discriminator (e.g. `"cycle_completed"`).
    pub status: String,
    /// JSONB metadata.
    pub metadata: serde_json::Value,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl TryFrom<JobRunRow> for JobRun {
    type Error = ServiceError;

    fn try_from(row: JobRunRow) -> Result<Self, Self::Error> {
        let status: JobStatus = row.status.parse().map_err(ServiceError::Persistence)?;
        let metadata: JobRunMetadata = serde_json::from_value(row.metadata)
            .map_err(|e| ServiceError::Persistence(format!("job run metadata: {e}")))?;
        Ok(Self {
            id: row.id,
            status,
            metadata,
            created_at: row.created_at,
        })
    }
}

/// A row from the `price_history` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PriceHistoryRow {
    /// Row ID.
    pub id: Uuid,
    /// Seller SKU.
    pub sku: String,
    /// Marketplace ASIN.
    pub asin: String,
    /// Catalog record ID.
    pub record_id: String,
    /// Price before the attempt.
    pub old_price: Option<Decimal>,
    /// Submitted price.
    pub new_price: Decimal,
    /// Change reason.
    pub reason: String,
    /// JSONB validation results.
    pub validation_results: serde_json::Value,
    /// Requesting actor.
    pub updated_by: String,
    /// Whether the feed was accepted.
    pub success: bool,
    /// Failure description.
    pub error_message: Option<String>,
    /// Feed ID.
    pub external_update_id: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl From<PriceHistoryRow> for PriceHistoryRecord {
    fn from(row: PriceHistoryRow) -> Self {
        Self {
            id: row.id,
            sku: row.sku,
            asin: row.asin,
            record_id: row.record_id,
            old_price: row.old_price,
            new_price: row.new_price,
            reason: row.reason,
            validation_results: row.validation_results,
            updated_by: row.updated_by,
            success: row.success,
            error_message: row.error_message,
            external_update_id: row.external_update_id,
            created_at: row.created_at,
        }
    }
}

/// A row from the `rollback_points` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RollbackPointRow {
    /// Row ID.
    pub id: Uuid,
    /// Seller SKU.
    pub sku: String,
    /// Marketplace ASIN.
    pub asin: String,
    /// Price at snapshot time.
    pub snapshot_price: Decimal,
    /// Caller-supplied reason.
    pub reason: String,
    /// Creating actor.
    pub created_by: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Active flag.
    pub is_active: bool,
    /// When the point was used.
    pub used_at: Option<DateTime<Utc>>,
    /// Who used the point.
    pub used_by: Option<String>,
}

impl From<RollbackPointRow> for RollbackPoint {
    fn from(row: RollbackPointRow) -> Self {
        Self {
            id: RollbackPointId::from_uuid(row.id),
            sku: row.sku,
            asin: row.asin,
            snapshot_price: row.snapshot_price,
            reason: row.reason,
            created_by: row.created_by,
            created_at: row.created_at,
            is_active: row.is_active,
            used_at: row.used_at,
            used_by: row.used_by,
        }
    }
}

/// Column values for an `audit_log` insert.
#[derive(Debug)]
pub struct AuditLogInsert<'a> {
    /// Row ID.
    pub id: Uuid,
    /// Actor.
    pub actor_id: &'a str,
    /// Action discriminator.
    pub action: &'static str,
    /// Resource kind.
    pub resource_type: &'a str,
    /// Resource ID.
    pub resource_id: &'a str,
    /// JSONB details.
    pub details: &'a serde_json::Value,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl<'a> From<&'a AuditLogEntry> for AuditLogInsert<'a> {
    fn from(entry: &'a AuditLogEntry) -> Self {
        Self {
            id: entry.id,
            actor_id: &entry.actor_id,
            action: AuditAction::as_str(&entry.action),
            resource_type: &entry.resource_type,
            resource_id: &entry.resource_id,
            details: &entry.details,
            created_at: entry.created_at,
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn job_run_row_converts() {
        let row = JobRunRow {
            id: Uuid::new_v4(),
            status: "cycle_completed".to_string(),
            metadata: serde_json::json!({"processed": 12, "alerts": 3, "batches": 2}),
            created_at: Utc::now(),
        };
        let Ok(run) = JobRun::try_from(row) else {
            panic!("conversion failed");
        };
        assert_eq!(run.status, JobStatus::CycleCompleted);
        assert_eq!(run.metadata.processed, 12);
        assert_eq!(run.metadata.duration_ms, 0);
    }

    #[test]
    fn job_run_row_with_unknown_status_fails() {
        let row = JobRunRow {
            id: Uuid::new_v4(),
            status: "exploded".to_string(),
            metadata: serde_json::json!({}),
            created_at: Utc::now(),
        };
        assert!(matches!(
            JobRun::try_from(row),
            Err(ServiceError::Persistence(_))
        ));
    }
}
