//! buybox-sentinel server entry point.
//!
//! Wires the stores, marketplace client, scheduler and price submitter, then
//! serves the REST API.

use std::sync::Arc;

use axum::Router;
use tokio::sync::broadcast::error::RecvError;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use buybox_sentinel::api;
use buybox_sentinel::app_state::AppState;
use buybox_sentinel::config::ServiceConfig;
use buybox_sentinel::domain::{EventBus, MonitorEvent};
use buybox_sentinel::marketplace::HttpMarketplaceClient;
use buybox_sentinel::notify::{BroadcastDispatcher, BuyBoxAlertDetector};
use buybox_sentinel::persistence::{InMemoryStore, PostgresStore};
use buybox_sentinel::ports::{JobLog, MonitoringConfigStore, PriceLedger, ProductStore};
use buybox_sentinel::rate_limiter::RateLimiter;
use buybox_sentinel::service::{MonitoringScheduler, PriceUpdateService};

/// Store handles shared by the scheduler and the price submitter.
struct Stores {
    configs: Arc<dyn MonitoringConfigStore>,
    job_log: Arc<dyn JobLog>,
    products: Arc<dyn ProductStore>,
    ledger: Arc<dyn PriceLedger>,
}

impl Stores {
    fn from_backend<S>(store: Arc<S>) -> Self
    where
        S: MonitoringConfigStore + JobLog + ProductStore + PriceLedger + 'static,
    {
        Self {
            configs: Arc::clone(&store) as _,
            job_log: Arc::clone(&store) as _,
            products: Arc::clone(&store) as _,
            ledger: store,
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Logs every event published on the bus until the bus closes.
fn spawn_event_logger(bus: &EventBus) {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(MonitorEvent::AlertRaised { alert }) => {
                    tracing::info!(
                        asin = %alert.asin,
                        kind = ?alert.kind,
                        severity = ?alert.severity,
                        "{}",
                        alert.message
                    );
                }
                Ok(event) => {
                    tracing::debug!(event_type = event.event_type_str(), asin = ?event.asin(), "event");
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event logger lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ServiceConfig::from_env()?;
    init_tracing(config.log_json);
    tracing::info!(addr = %config.listen_addr, "starting buybox-sentinel");

    let stores = if config.persistence_enabled {
        tracing::info!("using PostgreSQL persistence");
        let store = PostgresStore::connect(&config).await?;
        store.migrate().await?;
        Stores::from_backend(Arc::new(store))
    } else {
        tracing::warn!("persistence disabled; using in-memory stores");
        Stores::from_backend(Arc::new(InMemoryStore::new()))
    };

    let marketplace = Arc::new(HttpMarketplaceClient::new(
        &config.marketplace_api_url,
        &config.marketplace_id,
        config.marketplace_credentials.clone(),
        config.http_timeout(),
    )?);
    if config.marketplace_credentials.is_none() {
        tracing::warn!("marketplace credentials not configured; price submissions will be refused");
    }

    let event_bus = EventBus::new(config.event_bus_capacity);
    spawn_event_logger(&event_bus);

    let scheduler = Arc::new(MonitoringScheduler::new(
        stores.configs,
        Arc::clone(&marketplace) as _,
        Arc::new(BuyBoxAlertDetector),
        Arc::new(BroadcastDispatcher::new(event_bus.clone())),
        stores.job_log,
        event_bus.clone(),
        config.scheduler_settings(),
    ));

    let price_updates = Arc::new(PriceUpdateService::new(
        stores.products,
        stores.ledger,
        Arc::clone(&marketplace) as _,
        marketplace,
        RateLimiter::new(config.feed_requests_per_second, config.feed_inter_task_pause()),
        event_bus.clone(),
        config.pricing_settings(),
    ));

    if config.scheduler_autostart {
        scheduler.start(config.scheduler_interval_minutes).await?;
    }

    let app_state = AppState {
        scheduler: Arc::clone(&scheduler),
        price_updates,
        event_bus,
        default_interval_minutes: config.scheduler_interval_minutes,
    };

    let router = Router::new().merge(api::build_router());
    #[cfg(feature = "swagger-ui")]
    let router = {
        use utoipa::OpenApi;
        router.merge(
            utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
                .url("/api-docs/openapi.json", api::ApiDoc::openapi()),
        )
    };
    let app = router
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if scheduler.stop().await {
        tracing::info!("monitoring scheduler stopped");
    }
    tracing::info!("shutdown complete");
    Ok(())
}
