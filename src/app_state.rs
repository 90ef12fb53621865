//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::domain::EventBus;
use crate::service::{MonitoringScheduler, PriceUpdateService};

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Monitoring loop and manual checks.
    pub scheduler: Arc<MonitoringScheduler>,
    /// Price submission and rollback ledger.
    pub price_updates: Arc<PriceUpdateService>,
    /// Event bus carrying alerts and price submissions.
    pub event_bus: EventBus,
    /// Interval used when a start request names none.
    pub default_interval_minutes: u64,
}
