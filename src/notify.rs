//! Default alert detection and notification dispatch.
//!
//! [`BuyBoxAlertDetector`] compares a snapshot against the seller's own
//! offer. [`BroadcastDispatcher`] forwards alerts onto the [`EventBus`] where
//! any in-process consumer (the log subscriber in `main`, tests) picks them
//! up.

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::domain::{
    Alert, AlertKind, AlertSeverity, EventBus, MonitorEvent, MonitoringConfig, PricingSnapshot,
};
use crate::ports::{AlertDetector, NotificationDispatcher};

/// Raises Buy Box loss and undercut alerts.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuyBoxAlertDetector;

impl BuyBoxAlertDetector {
    fn alert(
        config: &MonitoringConfig,
        snapshot: &PricingSnapshot,
        kind: AlertKind,
        severity: AlertSeverity,
        message: String,
        competitor_price: Option<rust_decimal::Decimal>,
    ) -> Alert {
        Alert {
            id: Uuid::new_v4(),
            asin: config.asin.clone(),
            owner: config.owner.clone(),
            kind,
            severity,
            message,
            our_price: snapshot.our_price,
            competitor_price,
            created_at: Utc::now(),
        }
    }
}

#[async_trait]
impl AlertDetector for BuyBoxAlertDetector {
    async fn evaluate(
        &self,
        config: &MonitoringConfig,
        snapshot: &PricingSnapshot,
    ) -> anyhow::Result<Vec<Alert>> {
        let mut alerts = Vec::new();

        if snapshot.is_buy_box_winner == Some(false) {
            let holder = snapshot
                .buy_box_seller_id
                .as_deref()
                .unwrap_or("another seller");
            let message = match snapshot.buy_box_price {
                Some(price) => format!("Buy Box for {} held by {holder} at {price}", config.asin),
                None => format!("Buy Box for {} held by {holder}", config.asin),
            };
            alerts.push(Self::alert(
                config,
                snapshot,
                AlertKind::BuyBoxLost,
                AlertSeverity::Critical,
                message,
                snapshot.buy_box_price,
            ));
        }

        if let (Some(ours), Some(lowest)) = (snapshot.our_price, snapshot.lowest_competitor_price())
            && lowest < ours
        {
            alerts.push(Self::alert(
                config,
                snapshot,
                AlertKind::PriceUndercut,
                AlertSeverity::Warning,
                format!("{} undercut: competitor at {lowest}, ours at {ours}", config.asin),
                Some(lowest),
            ));
        }

        Ok(alerts)
    }
}

/// Publishes every alert as [`MonitorEvent::AlertRaised`].
#[derive(Debug, Clone)]
pub struct BroadcastDispatcher {
    bus: EventBus,
}

impl BroadcastDispatcher {
    /// Creates a dispatcher publishing onto `bus`.
    #[must_use]
    pub fn new(bus: EventBus) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl NotificationDispatcher for BroadcastDispatcher {
    async fn dispatch(&self, alerts: &[Alert], config: &MonitoringConfig) -> anyhow::Result<()> {
        for alert in alerts {
            let receivers = self.bus.publish(MonitorEvent::AlertRaised {
                alert: alert.clone(),
            });
            tracing::debug!(
                asin = %config.asin,
                owner = %config.owner,
                kind = ?alert.kind,
                receivers,
                "alert dispatched"
            );
        }
        Ok(())
    }
}
