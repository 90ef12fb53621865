//! In-memory implementation of every store trait.
//!
//! Used when `PERSISTENCE_ENABLED=false` and throughout the test suite.
//! Each table is a `tokio::sync::RwLock`-protected collection; rows are only
//! ever appended, except the fields the traits explicitly allow to change.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::RwLock;

use crate::domain::{
    AuditLogEntry, Classification, ConfigId, JobRun, MonitoringConfig, PriceHistoryRecord,
    ProductPricingRecord, RollbackPoint, RollbackPointId,
};
use crate::error::ServiceError;
use crate::ports::{JobLog, MonitoringConfigStore, PriceLedger, ProductStore};

/// Process-local store backing all persistence traits.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    configs: RwLock<Vec<MonitoringConfig>>,
    products: RwLock<HashMap<String, ProductPricingRecord>>,
    classifications: RwLock<HashMap<String, Classification>>,
    job_runs: RwLock<Vec<JobRun>>,
    history: RwLock<Vec<PriceHistoryRecord>>,
    audit: RwLock<Vec<AuditLogEntry>>,
    rollback_points: RwLock<Vec<RollbackPoint>>,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the configuration for its `(asin, owner)` pair.
    pub async fn upsert_config(&self, config: MonitoringConfig) {
        let mut configs = self.configs.write().await;
        configs.retain(|c| !(c.asin == config.asin && c.owner == config.owner));
        configs.push(config);
    }

    /// Adds or replaces a product pricing record.
    pub async fn upsert_product(&self, record: ProductPricingRecord) {
        self.products
            .write()
            .await
            .insert(record.record_id.clone(), record);
    }

    /// Snapshot of every configuration.
    pub async fn configs(&self) -> Vec<MonitoringConfig> {
        self.configs.read().await.clone()
    }

    /// Snapshot of the job run log, oldest first.
    pub async fn job_runs(&self) -> Vec<JobRun> {
        self.job_runs.read().await.clone()
    }

    /// Snapshot of the price history, oldest first.
    pub async fn history(&self) -> Vec<PriceHistoryRecord> {
        self.history.read().await.clone()
    }

    /// Snapshot of the audit log, oldest first.
    pub async fn audit_entries(&self) -> Vec<AuditLogEntry> {
        self.audit.read().await.clone()
    }
}

#[async_trait]
impl MonitoringConfigStore for InMemoryStore {
    async fn list_active(&self) -> Result<Vec<MonitoringConfig>, ServiceError> {
        let mut active: Vec<MonitoringConfig> = self
            .configs
            .read()
            .await
            .iter()
            .filter(|c| c.is_active)
            .cloned()
            .collect();
        active.sort_by(|a, b| b.priority.cmp(&a.priority));
        Ok(active)
    }

    async fn find(
        &self,
        asin: &str,
        owner: &str,
    ) -> Result<Option<MonitoringConfig>, ServiceError> {
        Ok(self
            .configs
            .read()
            .await
            .iter()
            .find(|c| c.asin == asin && c.owner == owner)
            .cloned())
    }

    async fn touch(&self, id: ConfigId, checked_at: DateTime<Utc>) -> Result<(), ServiceError> {
        let mut configs = self.configs.write().await;
        if let Some(config) = configs.iter_mut().find(|c| c.id == id) {
            config.last_checked = Some(checked_at);
            config.check_count = config.check_count.saturating_add(1);
        }
        Ok(())
    }
}

#[async_trait]
impl JobLog for InMemoryStore {
    async fn record(&self, run: &JobRun) -> Result<(), ServiceError> {
        self.job_runs.write().await.push(run.clone());
        Ok(())
    }

    async fn runs_since(&self, since: DateTime<Utc>) -> Result<Vec<JobRun>, ServiceError> {
        Ok(self
            .job_runs
            .read()
            .await
            .iter()
            .filter(|r| r.created_at >= since)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ProductStore for InMemoryStore {
    async fn load_record(
        &self,
        record_id: &str,
    ) -> Result<Option<ProductPricingRecord>, ServiceError> {
        Ok(self.products.read().await.get(record_id).cloned())
    }

    async fn find_by_sku(&self, sku: &str) -> Result<Option<ProductPricingRecord>, ServiceError> {
        Ok(self
            .products
            .read()
            .await
            .values()
            .find(|p| p.sku == sku)
            .cloned())
    }

    async fn cached_classification(
        &self,
        sku: &str,
    ) -> Result<Option<Classification>, ServiceError> {
        Ok(self.classifications.read().await.get(sku).cloned())
    }

    async fn cache_classification(
        &self,
        sku: &str,
        classification: &Classification,
    ) -> Result<(), ServiceError> {
        self.classifications
            .write()
            .await
            .insert(sku.to_string(), classification.clone());
        Ok(())
    }

    async fn update_current_price(
        &self,
        record_id: &str,
        price: Decimal,
        source: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        let mut products = self.products.write().await;
        let record = products
            .get_mut(record_id)
            .ok_or_else(|| ServiceError::RecordNotFound(record_id.to_string()))?;
        record.current_price = Some(price);
        record.last_price_update = Some(updated_at);
        record.price_update_source = Some(source.to_string());
        Ok(())
    }
}

#[async_trait]
impl PriceLedger for InMemoryStore {
    async fn append_history(&self, record: &PriceHistoryRecord) -> Result<(), ServiceError> {
        self.history.write().await.push(record.clone());
        Ok(())
    }

    async fn history_for(
        &self,
        sku: &str,
        limit: u32,
    ) -> Result<Vec<PriceHistoryRecord>, ServiceError> {
        Ok(self
            .history
            .read()
            .await
            .iter()
            .rev()
            .filter(|h| h.sku == sku)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn append_audit(&self, entry: &AuditLogEntry) -> Result<(), ServiceError> {
        self.audit.write().await.push(entry.clone());
        Ok(())
    }

    async fn insert_rollback_point(&self, point: &RollbackPoint) -> Result<(), ServiceError> {
        let mut points = self.rollback_points.write().await;
        if points.iter().any(|p| p.id == point.id) {
            return Err(ServiceError::Persistence(format!(
                "rollback point {} already exists",
                point.id
            )));
        }
        points.push(point.clone());
        Ok(())
    }

    async fn get_rollback_point(
        &self,
        id: RollbackPointId,
    ) -> Result<Option<RollbackPoint>, ServiceError> {
        Ok(self
            .rollback_points
            .read()
            .await
            .iter()
            .find(|p| p.id == id)
            .cloned())
    }

    async fn list_rollback_points(&self, sku: &str) -> Result<Vec<RollbackPoint>, ServiceError> {
        Ok(self
            .rollback_points
            .read()
            .await
            .iter()
            .rev()
            .filter(|p| p.sku == sku)
            .cloned()
            .collect())
    }

    async fn mark_rollback_point_used(
        &self,
        id: RollbackPointId,
        used_by: &str,
        used_at: DateTime<Utc>,
    ) -> Result<bool, ServiceError> {
        let mut points = self.rollback_points.write().await;
        match points.iter_mut().find(|p| p.id == id && p.is_active) {
            Some(point) => {
                point.is_active = false;
                point.used_at = Some(used_at);
                point.used_by = Some(used_by.to_string());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn release_rollback_point(
        &self,
        id: RollbackPointId,
        used_at: DateTime<Utc>,
    ) -> Result<bool, ServiceError> {
        let mut points = self.rollback_points.write().await;
        match points
            .iter_mut()
            .find(|p| p.id == id && !p.is_active && p.used_at == Some(used_at))
        {
            Some(point) => {
                point.is_active = true;
                point.used_at = None;
                point.used_by = None;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn list_active_orders_by_priority_and_skips_inactive() {
        let store = InMemoryStore::new();
        store.upsert_config(MonitoringConfig::new("B01", "s1", 1)).await;
        store.upsert_config(MonitoringConfig::new("B02", "s1", 9)).await;
        let mut inactive = MonitoringConfig::new("B03", "s1", 100);
        inactive.is_active = false;
        store.upsert_config(inactive).await;

        let Ok(active) = store.list_active().await else {
            panic!("list_active failed");
        };
        let asins: Vec<&str> = active.iter().map(|c| c.asin.as_str()).collect();
        assert_eq!(asins, vec!["B02", "B01"]);
    }

    #[tokio::test]
    async fn upsert_replaces_same_asin_and_owner() {
        let store = InMemoryStore::new();
        store.upsert_config(MonitoringConfig::new("B01", "s1", 1)).await;
        store.upsert_config(MonitoringConfig::new("B01", "s1", 5)).await;
        store.upsert_config(MonitoringConfig::new("B01", "s2", 5)).await;
        assert_eq!(store.configs().await.len(), 2);
    }

    #[tokio::test]
    async fn touch_advances_check_metadata() {
        let store = InMemoryStore::new();
        let config = MonitoringConfig::new("B01", "s1", 1);
        let id = config.id;
        store.upsert_config(config).await;

        let now = Utc::now();
        tokio_test::assert_ok!(store.touch(id, now).await);
        tokio_test::assert_ok!(store.touch(id, now).await);

        let Ok(Some(found)) = store.find("B01", "s1").await else {
            panic!("config missing");
        };
        assert_eq!(found.check_count, 2);
        assert_eq!(found.last_checked, Some(now));
    }

    #[tokio::test]
    async fn rollback_point_is_used_once() {
        let store = InMemoryStore::new();
        let point = RollbackPoint::new("SKU-1", "B01", Decimal::new(1999, 2), "sale", "ops");
        let id = point.id;
        tokio_test::assert_ok!(store.insert_rollback_point(&point).await);
        assert!(store.insert_rollback_point(&point).await.is_err());

        assert!(matches!(store.mark_rollback_point_used(id, "ops", Utc::now()).await, Ok(true)));
        assert!(matches!(store.mark_rollback_point_used(id, "other", Utc::now()).await, Ok(false)));

        let Ok(Some(stored)) = store.get_rollback_point(id).await else {
            panic!("point missing");
        };
        assert!(!stored.is_active);
        assert_eq!(stored.used_by.as_deref(), Some("ops"));
        assert_eq!(stored.snapshot_price, Decimal::new(1999, 2));
    }

    #[tokio::test]
    async fn only_the_matching_claim_releases_a_point() {
        let store = InMemoryStore::new();
        let point = RollbackPoint::new("SKU-1", "B01", Decimal::new(1999, 2), "sale", "ops");
        let id = point.id;
        tokio_test::assert_ok!(store.insert_rollback_point(&point).await);

        let claimed_at = Utc::now();
        assert!(matches!(store.release_rollback_point(id, claimed_at).await, Ok(false)));
        assert!(matches!(store.mark_rollback_point_used(id, "ops", claimed_at).await, Ok(true)));
        let other = claimed_at + chrono::Duration::seconds(1);
        assert!(matches!(store.release_rollback_point(id, other).await, Ok(false)));
        assert!(matches!(store.release_rollback_point(id, claimed_at).await, Ok(true)));

        let Ok(Some(stored)) = store.get_rollback_point(id).await else {
            panic!("point missing");
        };
        assert!(stored.is_active);
        assert!(stored.used_by.is_none());
    }
}
