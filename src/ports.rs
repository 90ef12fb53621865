//! Collaborator interfaces consumed by the scheduler and the submitter.
//!
//! Each trait has one statically chosen implementation wired at startup:
//! PostgreSQL or in-memory stores from [`crate::persistence`], the HTTP
//! client from [`crate::marketplace`], and the defaults in
//! [`crate::notify`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::{
    Alert, AuditLogEntry, Classification, ConfigId, JobRun, MonitoringConfig, PriceHistoryRecord,
    PricingSnapshot, ProductPricingRecord, RollbackPoint, RollbackPointId,
};
use crate::error::ServiceError;
use crate::marketplace::{FeedAck, FeedError, FeedPriceUpdate, ProviderError};

/// Source of monitoring configurations.
#[async_trait]
pub trait MonitoringConfigStore: Send + Sync {
    /// Active configurations ordered by priority, highest first.
    async fn list_active(&self) -> Result<Vec<MonitoringConfig>, ServiceError>;

    /// The configuration for an ASIN and owner, active or not.
    async fn find(&self, asin: &str, owner: &str)
    -> Result<Option<MonitoringConfig>, ServiceError>;

    /// Advances `last_checked` to `checked_at` and increments `check_count`.
    async fn touch(&self, id: ConfigId, checked_at: DateTime<Utc>) -> Result<(), ServiceError>;
}

/// Competitive pricing source.
#[async_trait]
pub trait PricingProvider: Send + Sync {
    /// Fetches snapshots for `asins` in one request. May return fewer
    /// entries than requested; an empty result is retryable.
    async fn fetch_batch(&self, asins: &[String]) -> Result<Vec<PricingSnapshot>, ProviderError>;
}

/// Turns a configuration and fresh pricing into alerts.
#[async_trait]
pub trait AlertDetector: Send + Sync {
    /// Evaluates one configuration against its snapshot.
    async fn evaluate(
        &self,
        config: &MonitoringConfig,
        snapshot: &PricingSnapshot,
    ) -> anyhow::Result<Vec<Alert>>;
}

/// Delivers alerts to the seller.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    /// Forwards alerts raised for `config`. Fire-and-forget for callers.
    async fn dispatch(&self, alerts: &[Alert], config: &MonitoringConfig) -> anyhow::Result<()>;
}

/// Marketplace catalog metadata.
#[async_trait]
pub trait CatalogLookup: Send + Sync {
    /// Classification for a SKU, or `None` when the catalog has none.
    async fn get_classification(&self, sku: &str) -> Result<Option<Classification>, ProviderError>;
}

/// Marketplace feed endpoint.
#[async_trait]
pub trait FeedSubmitter: Send + Sync {
    /// Whether credentials are available to submit feeds at all.
    fn is_configured(&self) -> bool;

    /// Submits one price change. Success means the feed was accepted.
    async fn submit(&self, update: &FeedPriceUpdate) -> Result<FeedAck, FeedError>;
}

/// Append-only scheduler run log (`job_run_log`).
#[async_trait]
pub trait JobLog: Send + Sync {
    /// Appends a run row.
    async fn record(&self, run: &JobRun) -> Result<(), ServiceError>;

    /// Rows written at or after `since`, oldest first.
    async fn runs_since(&self, since: DateTime<Utc>) -> Result<Vec<JobRun>, ServiceError>;
}

/// Canonical product prices, costs and cached classifications.
#[async_trait]
pub trait ProductStore: Send + Sync {
    /// Loads a pricing record by catalog record ID.
    async fn load_record(&self, record_id: &str)
    -> Result<Option<ProductPricingRecord>, ServiceError>;

    /// Loads a pricing record by SKU.
    async fn find_by_sku(&self, sku: &str) -> Result<Option<ProductPricingRecord>, ServiceError>;

    /// Locally cached classification for a SKU.
    async fn cached_classification(&self, sku: &str)
    -> Result<Option<Classification>, ServiceError>;

    /// Caches a classification fetched from the catalog.
    async fn cache_classification(
        &self,
        sku: &str,
        classification: &Classification,
    ) -> Result<(), ServiceError>;

    /// Sets the canonical price. Only called after an accepted submission.
    async fn update_current_price(
        &self,
        record_id: &str,
        price: Decimal,
        source: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<(), ServiceError>;
}

/// Price history, audit log and rollback points.
#[async_trait]
pub trait PriceLedger: Send + Sync {
    /// Appends a price history row.
    async fn append_history(&self, record: &PriceHistoryRecord) -> Result<(), ServiceError>;

    /// Most recent history rows for a SKU, newest first.
    async fn history_for(
        &self,
        sku: &str,
        limit: u32,
    ) -> Result<Vec<PriceHistoryRecord>, ServiceError>;

    /// Appends an audit row.
    async fn append_audit(&self, entry: &AuditLogEntry) -> Result<(), ServiceError>;

    /// Inserts a new rollback point. Never overwrites.
    async fn insert_rollback_point(&self, point: &RollbackPoint) -> Result<(), ServiceError>;

    /// Loads a rollback point.
    async fn get_rollback_point(
        &self,
        id: RollbackPointId,
    ) -> Result<Option<RollbackPoint>, ServiceError>;

    /// Rollback points for a SKU, newest first.
    async fn list_rollback_points(&self, sku: &str) -> Result<Vec<RollbackPoint>, ServiceError>;

    /// Marks an active point used. Returns `false` when the point was not
    /// active (already used or missing), leaving it untouched.
    async fn mark_rollback_point_used(
        &self,
        id: RollbackPointId,
        used_by: &str,
        used_at: DateTime<Utc>,
    ) -> Result<bool, ServiceError>;

    /// Reactivates a point claimed at `used_at`. Returns `false` when the
    /// point is active or was claimed at another instant.
    async fn release_rollback_point(
        &self,
        id: RollbackPointId,
        used_at: DateTime<Utc>,
    ) -> Result<bool, ServiceError>;
}
