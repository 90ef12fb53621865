//! REST API layer: route handlers, DTOs, OpenAPI document and router
//! composition.
//!
//! Resource endpoints are mounted under `/api/v1`; `/health` sits at the
//! root.

pub mod dto;
pub mod handlers;

use axum::Router;
use utoipa::OpenApi;

use crate::app_state::AppState;
use crate::error::{ErrorBody, ErrorResponse};

/// OpenAPI document for every REST endpoint.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "buybox-sentinel",
        description = "Buy Box monitoring scheduler and margin-gated price submitter"
    ),
    paths(
        handlers::system::health_handler,
        handlers::scheduler::start_scheduler,
        handlers::scheduler::stop_scheduler,
        handlers::scheduler::scheduler_status,
        handlers::scheduler::scheduler_statistics,
        handlers::scheduler::run_cycle,
        handlers::monitoring::manual_check,
        handlers::pricing::price_match,
        handlers::pricing::price_history,
        handlers::pricing::create_rollback_point,
        handlers::pricing::list_rollback_points,
        handlers::pricing::apply_rollback,
    ),
    components(schemas(ErrorResponse, ErrorBody)),
    tags(
        (name = "System", description = "Health"),
        (name = "Scheduler", description = "Monitoring loop control and statistics"),
        (name = "Monitoring", description = "On-demand checks"),
        (name = "Pricing", description = "Price submission, history and rollback"),
    )
)]
pub struct ApiDoc;

/// Builds the complete API router with all REST endpoints.
pub fn build_router() -> Router<AppState> {
    Router::new()
        .nest("/api/v1", handlers::routes())
        .merge(handlers::system::routes())
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use rust_decimal::Decimal;
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::domain::{
        Classification, EventBus, MonitoringConfig, PricingSnapshot, ProductPricingRecord,
    };
    use crate::marketplace::{FeedAck, FeedError, FeedPriceUpdate, ProviderError};
    use crate::notify::{BroadcastDispatcher, BuyBoxAlertDetector};
    use crate::persistence::InMemoryStore;
    use crate::ports::{CatalogLookup, FeedSubmitter, PricingProvider};
    use crate::rate_limiter::RateLimiter;
    use crate::retry::RetryPolicy;
    use crate::service::margin::DEFAULT_MIN_MARGIN_PERCENT;
    use crate::service::{
        MonitoringScheduler, PriceUpdateService, PricingSettings, SchedulerSettings,
    };

    #[derive(Debug)]
    struct NoPricing;

    #[async_trait]
    impl PricingProvider for NoPricing {
        async fn fetch_batch(&self, _: &[String]) -> Result<Vec<PricingSnapshot>, ProviderError> {
            Err(ProviderError::Empty)
        }
    }

    #[derive(Debug)]
    struct HomeCatalog;

    #[async_trait]
    impl CatalogLookup for HomeCatalog {
        async fn get_classification(
            &self,
            _: &str,
        ) -> Result<Option<Classification>, ProviderError> {
            Ok(Some(Classification {
                product_type: "HOME".to_string(),
                marketplace_id: "A1F83G8C2ARO7P".to_string(),
            }))
        }
    }

    #[derive(Debug)]
    struct StaticFeeds {
        configured: bool,
    }

    #[async_trait]
    impl FeedSubmitter for StaticFeeds {
        fn is_configured(&self) -> bool {
            self.configured
        }

        async fn submit(&self, _: &FeedPriceUpdate) -> Result<FeedAck, FeedError> {
            Ok(FeedAck::default())
        }
    }

    #[derive(Debug, Default)]
    struct TimedFeeds {
        starts: Mutex<Vec<tokio::time::Instant>>,
    }

    #[async_trait]
    impl FeedSubmitter for TimedFeeds {
        fn is_configured(&self) -> bool {
            true
        }

        async fn submit(&self, _: &FeedPriceUpdate) -> Result<FeedAck, FeedError> {
            if let Ok(mut starts) = self.starts.lock() {
                starts.push(tokio::time::Instant::now());
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(FeedAck::default())
        }
    }

    async fn app(feeds_configured: bool) -> Router {
        app_with(
            Arc::new(StaticFeeds {
                configured: feeds_configured,
            }),
            RateLimiter::with_min_interval(Duration::ZERO, Duration::ZERO),
        )
        .await
    }

    async fn app_with(feeds: Arc<dyn FeedSubmitter>, limiter: RateLimiter) -> Router {
        let store = Arc::new(InMemoryStore::new());
        store
            .upsert_config(MonitoringConfig::new("B000TEST01", "seller-1", 5))
            .await;
        store
            .upsert_product(ProductPricingRecord {
                record_id: "rec-1".to_string(),
                sku: "SKU-1".to_string(),
                asin: "B000TEST01".to_string(),
                current_price: Some(Decimal::new(1400, 2)),
                fixed_operating_cost: Some(Decimal::new(1000, 2)),
                variable_fee_rate: Some(Decimal::new(15, 2)),
                last_price_update: None,
                price_update_source: None,
            })
            .await;
        let bus = EventBus::new(16);

        let scheduler = Arc::new(MonitoringScheduler::new(
            Arc::clone(&store) as _,
            Arc::new(NoPricing),
            Arc::new(BuyBoxAlertDetector),
            Arc::new(BroadcastDispatcher::new(bus.clone())),
            Arc::clone(&store) as _,
            bus.clone(),
            SchedulerSettings {
                batch_size: 10,
                batch_delay: Duration::ZERO,
                retry: RetryPolicy::linear(1, Duration::ZERO),
            },
        ));
        let price_updates = Arc::new(PriceUpdateService::new(
            Arc::clone(&store) as _,
            Arc::clone(&store) as _,
            Arc::new(HomeCatalog),
            feeds,
            limiter,
            bus.clone(),
            PricingSettings {
                min_margin_percent: DEFAULT_MIN_MARGIN_PERCENT,
                seller_console_url: "https://sellercentral.example.com".to_string(),
            },
        ));

        build_router().with_state(AppState {
            scheduler,
            price_updates,
            event_bus: bus,
            default_interval_minutes: 60,
        })
    }

    async fn send(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        };
        let Ok(request) = request else {
            panic!("request should build");
        };
        let Ok(response) = app.oneshot(request).await else {
            panic!("router should respond");
        };
        let status = response.status();
        let Ok(bytes) = to_bytes(response.into_body(), usize::MAX).await else {
            panic!("body should be readable");
        };
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn health_reports_feed_configuration() {
        let (status, body) = send(app(false).await, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["feeds_configured"], false);
        assert_eq!(body["scheduler_running"], false);
    }

    #[tokio::test]
    async fn scheduler_status_starts_stopped() {
        let (status, body) = send(app(true).await, "GET", "/api/v1/scheduler/status", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["running"], false);
    }

    #[tokio::test]
    async fn run_cycle_returns_report() {
        let (status, body) = send(app(true).await, "POST", "/api/v1/scheduler/run", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "cycle_completed");
        assert_eq!(body["processed"], 0);
        assert_eq!(body["skipped_batches"], 1);
    }

    fn price_match_body(price: &str) -> Value {
        serde_json::json!({
            "asin": "B000TEST01",
            "sku": "SKU-1",
            "target_price": price,
            "record_id": "rec-1",
            "owner": "seller-1"
        })
    }

    #[tokio::test(start_paused = true)]
    async fn cycle_and_price_matches_share_one_feed_limiter() {
        let feeds = Arc::new(TimedFeeds::default());
        let app = app_with(
            Arc::clone(&feeds) as Arc<dyn FeedSubmitter>,
            RateLimiter::with_min_interval(Duration::from_secs(1), Duration::ZERO),
        )
        .await;

        let (cycle, first, second, third) = tokio::join!(
            send(app.clone(), "POST", "/api/v1/scheduler/run", None),
            send(app.clone(), "POST", "/api/v1/pricing/match", Some(price_match_body("13.50"))),
            send(app.clone(), "POST", "/api/v1/pricing/match", Some(price_match_body("13.40"))),
            send(app, "POST", "/api/v1/pricing/match", Some(price_match_body("13.30"))),
        );

        assert_eq!(cycle.0, StatusCode::OK);
        assert_eq!(cycle.1["status"], "cycle_completed");
        for (status, body) in [first, second, third] {
            assert_eq!(status, StatusCode::OK, "{body}");
        }

        let starts = feeds.starts.lock().map(|s| s.clone()).unwrap_or_default();
        assert_eq!(starts.len(), 3);
        for pair in starts.windows(2) {
            let [earlier, later] = pair else {
                panic!("windows(2) yields pairs");
            };
            assert!(later.duration_since(*earlier) >= Duration::from_secs(1));
        }
    }

    #[tokio::test]
    async fn manual_check_for_unknown_config_is_404() {
        let (status, body) = send(
            app(true).await,
            "POST",
            "/api/v1/monitoring/check",
            Some(serde_json::json!({ "asin": "B000NOPE00", "owner": "seller-1" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], 2001);
    }

    #[tokio::test]
    async fn unsafe_price_match_is_422_with_breakdown() {
        let (status, body) = send(
            app(true).await,
            "POST",
            "/api/v1/pricing/match",
            Some(serde_json::json!({
                "asin": "B000TEST01",
                "sku": "SKU-1",
                "target_price": "11.00",
                "record_id": "rec-1",
                "owner": "seller-1"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["status"], "margin_rejected");
        assert_eq!(body["check"]["safe"], false);
    }

    #[tokio::test]
    async fn price_match_without_credentials_is_503() {
        let (status, body) = send(
            app(false).await,
            "POST",
            "/api/v1/pricing/match",
            Some(serde_json::json!({
                "asin": "B000TEST01",
                "sku": "SKU-1",
                "target_price": "13.50",
                "record_id": "rec-1",
                "owner": "seller-1"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"]["code"], 3002);
        assert!(body["error"]["details"].is_string());
    }

    #[tokio::test]
    async fn applying_unknown_rollback_point_is_404() {
        let uri = format!(
            "/api/v1/pricing/rollback-points/{}/apply",
            uuid::Uuid::new_v4()
        );
        let (status, body) = send(
            app(true).await,
            "POST",
            &uri,
            Some(serde_json::json!({ "actor": "ops" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], 2003);
    }

    #[tokio::test]
    async fn rollback_point_round_trip_over_http() {
        let app = app(true).await;
        let (status, created) = send(
            app.clone(),
            "POST",
            "/api/v1/pricing/rollback-points",
            Some(serde_json::json!({ "sku": "SKU-1", "reason": "pre-sale", "actor": "ops" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["snapshot_price"], "14.00");

        let (status, listed) = send(
            app,
            "GET",
            "/api/v1/pricing/rollback-points?sku=SKU-1",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed.as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn history_requires_sku() {
        let (status, _) = send(app(true).await, "GET", "/api/v1/pricing/history?sku=", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn openapi_lists_every_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/health",
            "/api/v1/scheduler/start",
            "/api/v1/scheduler/statistics",
            "/api/v1/monitoring/check",
            "/api/v1/pricing/match",
            "/api/v1/pricing/rollback-points/{id}/apply",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
