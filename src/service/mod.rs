//! Service layer: business logic orchestration.
//!
//! [`MonitoringScheduler`] runs the periodic Buy Box checks and records each
//! cycle in the job run log. [`PriceUpdateService`] submits single price
//! changes behind the [`margin`] gate and the shared feed
//! [`crate::rate_limiter::RateLimiter`], and owns the rollback ledger.

pub mod margin;
pub mod price_update;
pub mod scheduler;

pub use margin::{CostBreakdown, MarginCheck, validate_margin};
pub use price_update::{
    PriceMatchOutcome, PriceMatchRequest, PriceUpdateService, PricingSettings, SubmissionFailure,
    SubmissionReceipt,
};
pub use scheduler::{
    CycleReport, ManualCheckResult, MonitoringScheduler, SchedulerSettings, SchedulerStatus,
};
