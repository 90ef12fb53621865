//! Price update submitter: validation, margin gate, rate-limited feed
//! submission and the price history / audit / rollback ledger.
//!
//! Every attempt that reaches the marketplace produces exactly one
//! [`PriceHistoryRecord`]. The canonical price in the [`ProductStore`] only
//! changes after the marketplace acknowledged the feed.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, SubsecRound, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use utoipa::ToSchema;
use uuid::Uuid;

use super::margin::{MarginCheck, validate_margin};
use crate::domain::product::{BUY_BOX_MATCH_SOURCE, ROLLBACK_SOURCE};
use crate::domain::{
    AuditAction, AuditLogEntry, Classification, EventBus, MonitorEvent, PriceHistoryRecord,
    ProductPricingRecord, RollbackPoint, RollbackPointId,
};
use crate::error::ServiceError;
use crate::marketplace::{FeedAck, FeedError, FeedFailureKind, FeedPriceUpdate};
use crate::ports::{CatalogLookup, FeedSubmitter, PriceLedger, ProductStore};
use crate::rate_limiter::RateLimiter;

/// Default number of history rows returned when no limit is given.
pub const DEFAULT_HISTORY_LIMIT: u32 = 50;

/// Upper bound on history rows returned in one call.
pub const MAX_HISTORY_LIMIT: u32 = 500;

/// Largest price the ledger columns (`NUMERIC(12, 2)`) can hold.
pub const MAX_PRICE: Decimal = Decimal::from_parts(3_567_587_327, 232, 0, false, 2);

/// Decimal places a submitted price may carry.
pub const PRICE_SCALE: u32 = 2;

const RESOURCE_PRODUCT_PRICING: &str = "product_pricing";
const RESOURCE_ROLLBACK_POINT: &str = "rollback_point";

/// Request to move a listing to a target price.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceMatchRequest {
    /// Marketplace ASIN.
    pub asin: String,
    /// Seller SKU.
    pub sku: String,
    /// Price to submit.
    pub target_price: Decimal,
    /// Catalog record holding the canonical price.
    pub record_id: String,
    /// Actor requesting the change.
    pub owner: String,
    /// Skip the margin gate.
    pub override_margin: bool,
}

impl PriceMatchRequest {
    fn validate(&self) -> Result<(), ServiceError> {
        for (field, value) in [
            ("asin", &self.asin),
            ("sku", &self.sku),
            ("record_id", &self.record_id),
            ("owner", &self.owner),
        ] {
            if value.trim().is_empty() {
                return Err(ServiceError::InvalidRequest(format!("{field} is required")));
            }
        }
        if self.target_price <= Decimal::ZERO {
            return Err(ServiceError::InvalidRequest(
                "target_price must be greater than zero".to_string(),
            ));
        }
        if self.target_price.normalize().scale() > PRICE_SCALE {
            return Err(ServiceError::InvalidRequest(format!(
                "target_price must have at most {PRICE_SCALE} decimal places"
            )));
        }
        if self.target_price > MAX_PRICE {
            return Err(ServiceError::InvalidRequest(format!(
                "target_price must not exceed {MAX_PRICE}"
            )));
        }
        Ok(())
    }
}

/// Receipt for a change the marketplace accepted.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct SubmissionReceipt {
    /// Seller SKU.
    pub sku: String,
    /// Marketplace ASIN.
    pub asin: String,
    /// Canonical price before the change.
    pub old_price: Option<Decimal>,
    /// Submitted price, now canonical.
    pub new_price: Decimal,
    /// Marketplace feed acknowledgment.
    pub feed: FeedAck,
    /// Margin gate result, absent when overridden.
    pub margin: Option<MarginCheck>,
    /// Price history row written for the attempt.
    #[schema(value_type = String, format = Uuid)]
    pub history_id: Uuid,
}

/// Categorized submission failure returned to the seller.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct SubmissionFailure {
    /// Failure category.
    pub kind: FeedFailureKind,
    /// Upstream or transport detail.
    pub message: String,
    /// Message to show the seller.
    pub user_message: String,
    /// Whether the seller should finish the change by hand.
    pub manual_intervention_recommended: bool,
    /// Whether retrying later is expected to help.
    pub retry_later: bool,
    /// Deep link to the listing in the seller console.
    pub seller_console_url: String,
    /// Price history row written for the attempt.
    #[schema(value_type = String, format = Uuid)]
    pub history_id: Uuid,
}

/// Result of a price change request that passed request validation.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PriceMatchOutcome {
    /// The marketplace accepted the feed.
    Submitted(SubmissionReceipt),
    /// The margin gate refused the change. Nothing was sent upstream.
    MarginRejected {
        /// Gate result, including the cost breakdown.
        check: MarginCheck,
        /// Deep link to the listing in the seller console.
        seller_console_url: String,
    },
    /// The marketplace refused the feed or could not be reached.
    SubmissionFailed(SubmissionFailure),
}

impl PriceMatchOutcome {
    /// Whether the marketplace accepted the change.
    #[must_use]
    pub const fn is_submitted(&self) -> bool {
        matches!(self, Self::Submitted(_))
    }
}

/// Static settings for [`PriceUpdateService`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricingSettings {
    /// ROI margin, in percent, a change must keep.
    pub min_margin_percent: Decimal,
    /// Seller console base URL used for deep links.
    pub seller_console_url: String,
}

/// One change travelling through the submission pipeline.
struct PriceChange<'a> {
    asin: &'a str,
    sku: &'a str,
    record_id: &'a str,
    actor: &'a str,
    target_price: Decimal,
    override_margin: bool,
    reason: &'static str,
}

/// Orchestrates single price changes and the rollback ledger.
pub struct PriceUpdateService {
    products: Arc<dyn ProductStore>,
    ledger: Arc<dyn PriceLedger>,
    catalog: Arc<dyn CatalogLookup>,
    feeds: Arc<dyn FeedSubmitter>,
    limiter: RateLimiter,
    event_bus: EventBus,
    settings: PricingSettings,
}

impl fmt::Debug for PriceUpdateService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PriceUpdateService")
            .field("limiter", &self.limiter)
            .field("settings", &self.settings)
            .field("feeds_configured", &self.feeds.is_configured())
            .finish_non_exhaustive()
    }
}

impl PriceUpdateService {
    /// Creates the submitter. `limiter` must be the process-wide feed limiter.
    #[must_use]
    pub fn new(
        products: Arc<dyn ProductStore>,
        ledger: Arc<dyn PriceLedger>,
        catalog: Arc<dyn CatalogLookup>,
        feeds: Arc<dyn FeedSubmitter>,
        limiter: RateLimiter,
        event_bus: EventBus,
        settings: PricingSettings,
    ) -> Self {
        Self {
            products,
            ledger,
            catalog,
            feeds,
            limiter,
            event_bus,
            settings,
        }
    }

    /// Whether feed credentials are configured.
    #[must_use]
    pub fn feeds_configured(&self) -> bool {
        self.feeds.is_configured()
    }

    /// Validates and submits a Buy Box match.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::InvalidRequest`] for missing fields, a price that is
    ///   non-positive, finer than pence or above [`MAX_PRICE`], or a record
    ///   that belongs to another SKU or ASIN.
    /// - [`ServiceError::MissingCredentials`] when feeds cannot be signed.
    /// - [`ServiceError::ClassificationUnavailable`] when the SKU has no
    ///   classification.
    /// - [`ServiceError::RecordNotFound`] for an unknown `record_id`.
    /// - [`ServiceError::Persistence`] if the history row cannot be written.
    pub async fn request_price_match(
        &self,
        request: &PriceMatchRequest,
    ) -> Result<PriceMatchOutcome, ServiceError> {
        request.validate()?;
        let change = PriceChange {
            asin: &request.asin,
            sku: &request.sku,
            record_id: &request.record_id,
            actor: &request.owner,
            target_price: request.target_price,
            override_margin: request.override_margin,
            reason: BUY_BOX_MATCH_SOURCE,
        };
        self.submit_change(&change).await
    }

    /// Snapshots the current canonical price of `sku`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::RecordNotFound`] for an unknown SKU and
    /// [`ServiceError::InvalidRequest`] when the SKU has no current price.
    pub async fn create_rollback_point(
        &self,
        sku: &str,
        reason: &str,
        actor: &str,
    ) -> Result<RollbackPoint, ServiceError> {
        if sku.trim().is_empty() || actor.trim().is_empty() {
            return Err(ServiceError::InvalidRequest(
                "sku and actor are required".to_string(),
            ));
        }
        let record = self
            .products
            .find_by_sku(sku)
            .await?
            .ok_or_else(|| ServiceError::RecordNotFound(sku.to_string()))?;
        let Some(price) = record.current_price else {
            return Err(ServiceError::InvalidRequest(format!(
                "{sku} has no current price to snapshot"
            )));
        };

        let point = RollbackPoint::new(sku, &record.asin, price, reason, actor);
        self.ledger.insert_rollback_point(&point).await?;
        tracing::info!(sku, point_id = %point.id, price = %price, "rollback point created");

        self.audit(AuditLogEntry::new(
            actor,
            AuditAction::RollbackPointCreated,
            RESOURCE_ROLLBACK_POINT,
            point.id.to_string(),
            json!({ "sku": sku, "asin": record.asin, "snapshot_price": price, "reason": reason }),
        ))
        .await;
        Ok(point)
    }

    /// Rollback points for `sku`, newest first.
    ///
    /// # Errors
    ///
    /// Returns a [`ServiceError::Persistence`] if the ledger read fails.
    pub async fn list_rollback_points(&self, sku: &str) -> Result<Vec<RollbackPoint>, ServiceError> {
        self.ledger.list_rollback_points(sku).await
    }

    /// Resubmits a rollback point's snapshot price.
    ///
    /// The point is claimed before anything is submitted, so concurrent
    /// applies of one point send at most one feed. The claim is released
    /// when the change is rejected or fails, leaving the point active.
    ///
    /// # Errors
    ///
    /// [`ServiceError::RollbackPointNotFound`], [`ServiceError::RollbackPointUsed`],
    /// [`ServiceError::RecordNotFound`], plus everything
    /// [`Self::request_price_match`] can return.
    pub async fn apply_rollback(
        &self,
        point_id: RollbackPointId,
        actor: &str,
        override_margin: bool,
    ) -> Result<PriceMatchOutcome, ServiceError> {
        if actor.trim().is_empty() {
            return Err(ServiceError::InvalidRequest("actor is required".to_string()));
        }
        let point = self
            .ledger
            .get_rollback_point(point_id)
            .await?
            .ok_or(ServiceError::RollbackPointNotFound(point_id))?;
        if !point.is_active {
            return Err(ServiceError::RollbackPointUsed(point_id));
        }
        let record = self
            .products
            .find_by_sku(&point.sku)
            .await?
            .ok_or_else(|| ServiceError::RecordNotFound(point.sku.clone()))?;

        let claimed_at = Utc::now().trunc_subsecs(6);
        if !self
            .ledger
            .mark_rollback_point_used(point_id, actor, claimed_at)
            .await?
        {
            return Err(ServiceError::RollbackPointUsed(point_id));
        }

        let change = PriceChange {
            asin: &point.asin,
            sku: &point.sku,
            record_id: &record.record_id,
            actor,
            target_price: point.snapshot_price,
            override_margin,
            reason: ROLLBACK_SOURCE,
        };
        let outcome = match self.submit_change(&change).await {
            Ok(outcome) if outcome.is_submitted() => outcome,
            other => {
                self.release_rollback_claim(point_id, claimed_at).await;
                return other;
            }
        };

        self.audit(AuditLogEntry::new(
            actor,
            AuditAction::RollbackApplied,
            RESOURCE_ROLLBACK_POINT,
            point_id.to_string(),
            json!({ "sku": point.sku, "snapshot_price": point.snapshot_price }),
        ))
        .await;
        Ok(outcome)
    }

    /// Most recent price history rows for `sku`, newest first.
    ///
    /// `limit` defaults to [`DEFAULT_HISTORY_LIMIT`] and is capped at
    /// [`MAX_HISTORY_LIMIT`].
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidRequest`] for an empty SKU.
    pub async fn price_history(
        &self,
        sku: &str,
        limit: Option<u32>,
    ) -> Result<Vec<PriceHistoryRecord>, ServiceError> {
        if sku.trim().is_empty() {
            return Err(ServiceError::InvalidRequest("sku is required".to_string()));
        }
        let limit = limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .clamp(1, MAX_HISTORY_LIMIT);
        self.ledger.history_for(sku, limit).await
    }

    /// Seller console deep link for a SKU.
    #[must_use]
    pub fn seller_console_link(&self, sku: &str) -> String {
        let base = self.settings.seller_console_url.trim_end_matches('/');
        match reqwest::Url::parse_with_params(&format!("{base}/inventory"), &[("sku", sku)]) {
            Ok(url) => url.into(),
            Err(_) => base.to_string(),
        }
    }

    async fn submit_change(&self, change: &PriceChange<'_>) -> Result<PriceMatchOutcome, ServiceError> {
        if !self.feeds.is_configured() {
            tracing::error!(sku = change.sku, "price update refused: marketplace credentials missing");
            return Err(ServiceError::MissingCredentials);
        }

        let record = self
            .products
            .load_record(change.record_id)
            .await?
            .ok_or_else(|| ServiceError::RecordNotFound(change.record_id.to_string()))?;
        if record.sku != change.sku || record.asin != change.asin {
            return Err(ServiceError::InvalidRequest(format!(
                "record {} belongs to {}/{}, not {}/{}",
                record.record_id, record.sku, record.asin, change.sku, change.asin
            )));
        }
        let classification = self.resolve_classification(change.sku).await?;

        let margin = if change.override_margin {
            tracing::info!(sku = change.sku, actor = change.actor, "margin gate overridden");
            None
        } else {
            let check = validate_margin(
                change.target_price,
                record.current_price,
                record.cost_basis().as_ref(),
                self.settings.min_margin_percent,
            );
            if !check.safe {
                tracing::info!(
                    sku = change.sku,
                    target_price = %change.target_price,
                    new_margin = ?check.new_margin,
                    "price change rejected by margin gate"
                );
                return Ok(PriceMatchOutcome::MarginRejected {
                    check,
                    seller_console_url: self.seller_console_link(change.sku),
                });
            }
            Some(check)
        };

        let update = FeedPriceUpdate {
            sku: change.sku.to_string(),
            asin: change.asin.to_string(),
            price: change.target_price,
            previous_price: record.current_price,
            classification,
        };
        let feeds = Arc::clone(&self.feeds);
        let submitted = update.clone();
        let result = self
            .limiter
            .schedule(move || async move { feeds.submit(&submitted).await })
            .await?;

        match result {
            Ok(ack) => self.record_success(change, &record, &update, margin, ack).await,
            Err(err) => self.record_failure(change, &record, &update, margin, err).await,
        }
    }

    async fn record_success(
        &self,
        change: &PriceChange<'_>,
        record: &ProductPricingRecord,
        update: &FeedPriceUpdate,
        margin: Option<MarginCheck>,
        ack: FeedAck,
    ) -> Result<PriceMatchOutcome, ServiceError> {
        let now = Utc::now();
        let history = self.history_row(change, record, margin.as_ref(), true, None, ack.feed_id.clone());
        self.ledger.append_history(&history).await?;
        self.products
            .update_current_price(&record.record_id, change.target_price, change.reason, now)
            .await?;

        tracing::info!(
            sku = change.sku,
            asin = change.asin,
            old_price = ?record.current_price,
            new_price = %change.target_price,
            feed_id = ?ack.feed_id,
            "price update accepted"
        );

        self.audit(AuditLogEntry::new(
            change.actor,
            AuditAction::PriceUpdateSubmitted,
            RESOURCE_PRODUCT_PRICING,
            &record.record_id,
            json!({ "request": update, "response": ack, "reason": change.reason }),
        ))
        .await;

        let _ = self.event_bus.publish(MonitorEvent::PriceSubmitted {
            sku: change.sku.to_string(),
            asin: change.asin.to_string(),
            old_price: record.current_price,
            new_price: change.target_price,
            feed_id: ack.feed_id.clone(),
            timestamp: now,
        });

        Ok(PriceMatchOutcome::Submitted(SubmissionReceipt {
            sku: change.sku.to_string(),
            asin: change.asin.to_string(),
            old_price: record.current_price,
            new_price: change.target_price,
            feed: ack,
            margin,
            history_id: history.id,
        }))
    }

    async fn record_failure(
        &self,
        change: &PriceChange<'_>,
        record: &ProductPricingRecord,
        update: &FeedPriceUpdate,
        margin: Option<MarginCheck>,
        err: FeedError,
    ) -> Result<PriceMatchOutcome, ServiceError> {
        let history = self.history_row(
            change,
            record,
            margin.as_ref(),
            false,
            Some(err.to_string()),
            None,
        );
        self.ledger.append_history(&history).await?;

        tracing::warn!(
            sku = change.sku,
            kind = %err.kind,
            error = %err.message,
            "price update failed"
        );

        self.audit(AuditLogEntry::new(
            change.actor,
            AuditAction::PriceUpdateFailed,
            RESOURCE_PRODUCT_PRICING,
            &record.record_id,
            json!({ "request": update, "error": { "kind": err.kind, "message": err.message } }),
        ))
        .await;

        Ok(PriceMatchOutcome::SubmissionFailed(SubmissionFailure {
            kind: err.kind,
            user_message: err.kind.user_message().to_string(),
            manual_intervention_recommended: err.kind.manual_intervention_recommended(),
            retry_later: err.kind.retry_later(),
            seller_console_url: self.seller_console_link(change.sku),
            message: err.message,
            history_id: history.id,
        }))
    }

    fn history_row(
        &self,
        change: &PriceChange<'_>,
        record: &ProductPricingRecord,
        margin: Option<&MarginCheck>,
        success: bool,
        error_message: Option<String>,
        external_update_id: Option<String>,
    ) -> PriceHistoryRecord {
        let validation_results = match margin {
            Some(check) => serde_json::to_value(check).unwrap_or_default(),
            None => json!({ "skipped": true, "override_margin": change.override_margin }),
        };
        PriceHistoryRecord {
            id: Uuid::new_v4(),
            sku: change.sku.to_string(),
            asin: change.asin.to_string(),
            record_id: record.record_id.clone(),
            old_price: record.current_price,
            new_price: change.target_price,
            reason: change.reason.to_string(),
            validation_results,
            updated_by: change.actor.to_string(),
            success,
            error_message,
            external_update_id,
            created_at: Utc::now(),
        }
    }

    async fn resolve_classification(&self, sku: &str) -> Result<Classification, ServiceError> {
        if let Some(cached) = self.products.cached_classification(sku).await? {
            return Ok(cached);
        }
        match self.catalog.get_classification(sku).await {
            Ok(Some(classification)) => {
                if let Err(e) = self.products.cache_classification(sku, &classification).await {
                    tracing::warn!(sku, error = %e, "failed to cache classification");
                }
                Ok(classification)
            }
            Ok(None) => Err(ServiceError::ClassificationUnavailable {
                sku: sku.to_string(),
                reason: "catalog has no classification for this SKU".to_string(),
            }),
            Err(e) => Err(ServiceError::ClassificationUnavailable {
                sku: sku.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    async fn release_rollback_claim(&self, point_id: RollbackPointId, claimed_at: DateTime<Utc>) {
        match self.ledger.release_rollback_point(point_id, claimed_at).await {
            Ok(true) => tracing::debug!(%point_id, "rollback claim released"),
            Ok(false) => tracing::warn!(%point_id, "rollback claim was already released"),
            Err(e) => tracing::error!(%point_id, error = %e, "failed to release rollback claim"),
        }
    }

    async fn audit(&self, entry: AuditLogEntry) {
        if let Err(e) = self.ledger.append_audit(&entry).await {
            tracing::warn!(
                action = entry.action.as_str(),
                resource_id = %entry.resource_id,
                error = %e,
                "audit write failed"
            );
        }
    }
}
