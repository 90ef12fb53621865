//! Domain layer: core types and the event system.
//!
//! This module contains the monitoring model (configurations, pricing
//! snapshots, alerts), the scheduler run log, product pricing records, the
//! append-only price ledger, and the event bus for broadcasting activity.

pub mod event_bus;
pub mod ids;
pub mod job_run;
pub mod ledger;
pub mod monitor_event;
pub mod monitoring;
pub mod product;

pub use event_bus::EventBus;
pub use ids::{ConfigId, RollbackPointId};
pub use job_run::{JobRun, JobRunMetadata, JobStatistics, JobStatus};
pub use ledger::{AuditAction, AuditLogEntry, PriceHistoryRecord, RollbackPoint};
pub use monitor_event::MonitorEvent;
pub use monitoring::{Alert, AlertKind, AlertSeverity, MonitoringConfig, PricingSnapshot};
pub use product::{Classification, CostBasis, ProductPricingRecord};
