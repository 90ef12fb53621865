//! In-process fan-out of monitoring alerts, cycle summaries and price
//! submissions.
//!
//! The alert dispatcher, the scheduler and the price submitter publish here;
//! the server's event logger is the standing subscriber.

use tokio::sync::broadcast;

use super::MonitorEvent;

/// Fan-out channel for [`MonitorEvent`]s.
///
/// A subscriber that falls more than `capacity` events behind loses the
/// oldest ones and sees a `Lagged` error on its next receive. Publishing never
/// blocks the scheduler or the submitter.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<MonitorEvent>,
}

impl EventBus {
    /// Creates a bus retaining up to `capacity` undelivered events per
    /// subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes `event`, returning how many subscribers will see it.
    ///
    /// With nobody listening the event is discarded and `0` is returned.
    pub fn publish(&self, event: MonitorEvent) -> usize {
        let kind = event.event_type_str();
        match self.sender.send(event) {
            Ok(delivered) => delivered,
            Err(_) => {
                tracing::trace!(event_type = kind, "no event subscribers");
                0
            }
        }
    }

    /// Subscribes to events published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;
    use tokio::sync::broadcast::error::RecvError;

    use super::*;

    fn cycle(processed: u64) -> MonitorEvent {
        MonitorEvent::CycleCompleted {
            processed,
            alerts: 0,
            timestamp: Utc::now(),
        }
    }

    fn submission(pence: i64) -> MonitorEvent {
        MonitorEvent::PriceSubmitted {
            sku: "SKU-1".to_string(),
            asin: "B000TEST01".to_string(),
            old_price: Some(Decimal::new(1400, 2)),
            new_price: Decimal::new(pence, 2),
            feed_id: Some("FEED-1".to_string()),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn cycle_summary_without_listeners_is_discarded() {
        let bus = EventBus::new(8);
        assert_eq!(bus.publish(cycle(3)), 0);
    }

    #[tokio::test]
    async fn every_listener_sees_a_price_submission() {
        let bus = EventBus::new(8);
        let mut logger = bus.subscribe();
        let mut audit_tail = bus.subscribe();

        assert_eq!(bus.publish(submission(1350)), 2);

        for rx in [&mut logger, &mut audit_tail] {
            let Ok(MonitorEvent::PriceSubmitted { sku, new_price, .. }) = rx.recv().await else {
                panic!("expected PriceSubmitted");
            };
            assert_eq!(sku, "SKU-1");
            assert_eq!(new_price, Decimal::new(1350, 2));
        }
    }

    #[tokio::test]
    async fn late_subscriber_misses_earlier_cycles() {
        let bus = EventBus::new(8);
        let _early = bus.subscribe();
        bus.publish(cycle(1));

        let mut late = bus.subscribe();
        bus.publish(cycle(2));
        let Ok(MonitorEvent::CycleCompleted { processed, .. }) = late.recv().await else {
            panic!("expected CycleCompleted");
        };
        assert_eq!(processed, 2);
    }

    #[tokio::test]
    async fn slow_listener_lags_then_resumes_with_newest_cycles() {
        let bus = EventBus::new(2);
        let mut slow = bus.subscribe();
        for processed in 1..=5 {
            bus.publish(cycle(processed));
        }

        assert!(matches!(slow.recv().await, Err(RecvError::Lagged(3))));
        let Ok(MonitorEvent::CycleCompleted { processed, .. }) = slow.recv().await else {
            panic!("expected CycleCompleted");
        };
        assert_eq!(processed, 4);
    }
}
