//! Domain events broadcast to in-process subscribers.
//!
//! Alerts raised by the scheduler and price submissions from the submitter
//! are published as [`MonitorEvent`]s through the [`super::EventBus`].

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use super::Alert;

/// Event emitted after monitoring or pricing activity.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum MonitorEvent {
    /// An alert was raised for a monitored ASIN.
    AlertRaised {
        /// The alert being forwarded.
        alert: Alert,
    },

    /// A monitoring cycle finished.
    CycleCompleted {
        /// Configurations processed.
        processed: u64,
        /// Alerts raised.
        alerts: u64,
        /// Completion timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A price change was acknowledged by the marketplace.
    PriceSubmitted {
        /// Seller SKU.
        sku: String,
        /// Marketplace ASIN.
        asin: String,
        /// Price before the change.
        old_price: Option<Decimal>,
        /// Submitted price.
        new_price: Decimal,
        /// Marketplace feed identifier.
        feed_id: Option<String>,
        /// Acknowledgment timestamp.
        timestamp: DateTime<Utc>,
    },
}

impl MonitorEvent {
    /// Returns the ASIN the event concerns, if any.
    #[must_use]
    pub fn asin(&self) -> Option<&str> {
        match self {
            Self::AlertRaised { alert } => Some(&alert.asin),
            Self::PriceSubmitted { asin, .. } => Some(asin),
            Self::CycleCompleted { .. } => None,
        }
    }

    /// Returns the event type as a static string slice.
    #[must_use]
    pub const fn event_type_str(&self) -> &'static str {
        match self {
            Self::AlertRaised { .. } => "alert_raised",
            Self::CycleCompleted { .. } => "cycle_completed",
            Self::PriceSubmitted { .. } => "price_submitted",
        }
    }
}
