//! PostgreSQL implementation of the persistence layer.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use super::models::{
    AuditLogInsert, ClassificationRow, JobRunRow, MonitoringConfigRow, PriceHistoryRow,
    ProductPricingRow, RollbackPointRow,
};
use crate::config::ServiceConfig;
use crate::domain::{
    AuditLogEntry, Classification, ConfigId, JobRun, MonitoringConfig, PriceHistoryRecord,
    ProductPricingRecord, RollbackPoint, RollbackPointId,
};
use crate::error::ServiceError;
use crate::ports::{JobLog, MonitoringConfigStore, PriceLedger, ProductStore};

const PRODUCT_COLUMNS: &str = "record_id, sku, asin, current_price, fixed_operating_cost, \
     variable_fee_rate, last_price_update, price_update_source";

const ROLLBACK_COLUMNS: &str = "id, sku, asin, snapshot_price, reason, created_by, created_at, \
     is_active, used_at, used_by";

/// PostgreSQL-backed persistence layer using `sqlx::PgPool`.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new persistence layer with the given connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a connection pool sized from the service configuration.
    ///
    /// # Errors
    ///
    /// Returns a [`ServiceError::Persistence`] if the database is unreachable.
    pub async fn connect(config: &ServiceConfig) -> Result<Self, ServiceError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .min_connections(config.database_min_connections)
            .acquire_timeout(Duration::from_secs(config.database_connect_timeout_secs))
            .connect(&config.database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Applies the embedded schema migrations.
    ///
    /// # Errors
    ///
    /// Returns a [`ServiceError::Persistence`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), ServiceError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| ServiceError::Persistence(e.to_string()))
    }
}

#[async_trait]
impl MonitoringConfigStore for PostgresStore {
    async fn list_active(&self) -> Result<Vec<MonitoringConfig>, ServiceError> {
        let rows = sqlx::query_as::<_, MonitoringConfigRow>(
            "SELECT id, asin, owner_id, priority, is_active, last_checked, check_count \
             FROM monitoring_configs WHERE is_active = TRUE \
             ORDER BY priority DESC, last_checked ASC NULLS FIRST",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(MonitoringConfig::from).collect())
    }

    async fn find(
        &self,
        asin: &str,
        owner: &str,
    ) -> Result<Option<MonitoringConfig>, ServiceError> {
        let row = sqlx::query_as::<_, MonitoringConfigRow>(
            "SELECT id, asin, owner_id, priority, is_active, last_checked, check_count \
             FROM monitoring_configs WHERE asin = $1 AND owner_id = $2",
        )
        .bind(asin)
        .bind(owner)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(MonitoringConfig::from))
    }

    async fn touch(&self, id: ConfigId, checked_at: DateTime<Utc>) -> Result<(), ServiceError> {
        sqlx::query(
            "UPDATE monitoring_configs \
             SET last_checked = $2, check_count = check_count + 1 WHERE id = $1",
        )
        .bind(*id.as_uuid())
        .bind(checked_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl JobLog for PostgresStore {
    async fn record(&self, run: &JobRun) -> Result<(), ServiceError> {
        let metadata = serde_json::to_value(&run.metadata)
            .map_err(|e| ServiceError::Internal(e.to_string()))?;
        sqlx::query(
            "INSERT INTO job_run_log (id, status, metadata, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(run.id)
        .bind(run.status.as_str())
        .bind(metadata)
        .bind(run.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn runs_since(&self, since: DateTime<Utc>) -> Result<Vec<JobRun>, ServiceError> {
        let rows = sqlx::query_as::<_, JobRunRow>(
            "SELECT id, status, metadata, created_at FROM job_run_log \
             WHERE created_at >= $1 ORDER BY created_at ASC",
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(JobRun::try_from).collect()
    }
}

#[async_trait]
impl ProductStore for PostgresStore {
    async fn load_record(
        &self,
        record_id: &str,
    ) -> Result<Option<ProductPricingRecord>, ServiceError> {
        let row = sqlx::query_as::<_, ProductPricingRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM product_pricing WHERE record_id = $1"
        ))
        .bind(record_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(ProductPricingRecord::from))
    }

    async fn find_by_sku(&self, sku: &str) -> Result<Option<ProductPricingRecord>, ServiceError> {
        let row = sqlx::query_as::<_, ProductPricingRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM product_pricing WHERE sku = $1 LIMIT 1"
        ))
        .bind(sku)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(ProductPricingRecord::from))
    }

    async fn cached_classification(
        &self,
        sku: &str,
    ) -> Result<Option<Classification>, ServiceError> {
        let row = sqlx::query_as::<_, ClassificationRow>(
            "SELECT product_type, marketplace_id FROM product_classifications WHERE sku = $1",
        )
        .bind(sku)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Classification::from))
    }

    async fn cache_classification(
        &self,
        sku: &str,
        classification: &Classification,
    ) -> Result<(), ServiceError> {
        sqlx::query(
            "INSERT INTO product_classifications (sku, product_type, marketplace_id, cached_at) \
             VALUES ($1, $2, $3, NOW()) \
             ON CONFLICT (sku) DO UPDATE SET product_type = EXCLUDED.product_type, \
             marketplace_id = EXCLUDED.marketplace_id, cached_at = EXCLUDED.cached_at",
        )
        .bind(sku)
        .bind(&classification.product_type)
        .bind(&classification.marketplace_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_current_price(
        &self,
        record_id: &str,
        price: Decimal,
        source: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        let result = sqlx::query(
            "UPDATE product_pricing \
             SET current_price = $2, last_price_update = $3, price_update_source = $4 \
             WHERE record_id = $1",
        )
        .bind(record_id)
        .bind(price)
        .bind(updated_at)
        .bind(source)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ServiceError::RecordNotFound(record_id.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl PriceLedger for PostgresStore {
    async fn append_history(&self, record: &PriceHistoryRecord) -> Result<(), ServiceError> {
        sqlx::query(
            "INSERT INTO price_history (id, sku, asin, record_id, old_price, new_price, reason, \
             validation_results, updated_by, success, error_message, external_update_id, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        )
        .bind(record.id)
        .bind(&record.sku)
        .bind(&record.asin)
        .bind(&record.record_id)
        .bind(record.old_price)
        .bind(record.new_price)
        .bind(&record.reason)
        .bind(&record.validation_results)
        .bind(&record.updated_by)
        .bind(record.success)
        .bind(&record.error_message)
        .bind(&record.external_update_id)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn history_for(
        &self,
        sku: &str,
        limit: u32,
    ) -> Result<Vec<PriceHistoryRecord>, ServiceError> {
        let rows = sqlx::query_as::<_, PriceHistoryRow>(
            "SELECT id, sku, asin, record_id, old_price, new_price, reason, validation_results, \
             updated_by, success, error_message, external_update_id, created_at \
             FROM price_history WHERE sku = $1 ORDER BY created_at DESC LIMIT $2",
        )
        .bind(sku)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(PriceHistoryRecord::from).collect())
    }

    async fn append_audit(&self, entry: &AuditLogEntry) -> Result<(), ServiceError> {
        let row = AuditLogInsert::from(entry);
        sqlx::query(
            "INSERT INTO audit_log (id, actor_id, action, resource_type, resource_id, details, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(row.id)
        .bind(row.actor_id)
        .bind(row.action)
        .bind(row.resource_type)
        .bind(row.resource_id)
        .bind(row.details)
        .bind(row.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_rollback_point(&self, point: &RollbackPoint) -> Result<(), ServiceError> {
        sqlx::query(&format!(
            "INSERT INTO rollback_points ({ROLLBACK_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
        ))
        .bind(*point.id.as_uuid())
        .bind(&point.sku)
        .bind(&point.asin)
        .bind(point.snapshot_price)
        .bind(&point.reason)
        .bind(&point.created_by)
        .bind(point.created_at)
        .bind(point.is_active)
        .bind(point.used_at)
        .bind(&point.used_by)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_rollback_point(
        &self,
        id: RollbackPointId,
    ) -> Result<Option<RollbackPoint>, ServiceError> {
        let row = sqlx::query_as::<_, RollbackPointRow>(&format!(
            "SELECT {ROLLBACK_COLUMNS} FROM rollback_points WHERE id = $1"
        ))
        .bind(*id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(RollbackPoint::from))
    }

    async fn list_rollback_points(&self, sku: &str) -> Result<Vec<RollbackPoint>, ServiceError> {
        let rows = sqlx::query_as::<_, RollbackPointRow>(&format!(
            "SELECT {ROLLBACK_COLUMNS} FROM rollback_points WHERE sku = $1 ORDER BY created_at DESC"
        ))
        .bind(sku)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(RollbackPoint::from).collect())
    }

    async fn mark_rollback_point_used(
        &self,
        id: RollbackPointId,
        used_by: &str,
        used_at: DateTime<Utc>,
    ) -> Result<bool, ServiceError> {
        let result = sqlx::query(
            "UPDATE rollback_points SET is_active = FALSE, used_at = $2, used_by = $3 \
             WHERE id = $1 AND is_active = TRUE",
        )
        .bind(*id.as_uuid())
        .bind(used_at)
        .bind(used_by)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn release_rollback_point(
        &self,
        id: RollbackPointId,
        used_at: DateTime<Utc>,
    ) -> Result<bool, ServiceError> {
        let result = sqlx::query(
            "UPDATE rollback_points SET is_active = TRUE, used_at = NULL, used_by = NULL \
             WHERE id = $1 AND is_active = FALSE AND used_at = $2",
        )
        .bind(*id.as_uuid())
        .bind(used_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
