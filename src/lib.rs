//! # buybox-sentinel
//!
//! Competitive pricing monitor and Buy Box price submitter for marketplace
//! sellers.
//!
//! A recurring scheduler fetches competitive pricing for monitored ASINs in
//! batches, evaluates each snapshot for alerts and records every run. Price
//! changes pass through a margin gate, go out through a rate-limited feed
//! submitter and leave a history row, an audit entry and, on request, a
//! single-use rollback point.
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP)
//!     │
//!     ├── REST Handlers (api/)
//!     │
//!     ├── MonitoringScheduler ── AlertDetector / NotificationDispatcher (notify)
//!     ├── PriceUpdateService ─── margin gate ── RateLimiter
//!     ├── EventBus (domain/)
//!     │
//!     ├── Marketplace gateway (marketplace/, reqwest)
//!     │
//!     └── PostgreSQL or in-memory persistence (persistence/)
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod marketplace;
pub mod notify;
pub mod persistence;
pub mod ports;
pub mod rate_limiter;
pub mod retry;
pub mod service;
