//! Data Transfer Objects for REST request/response serialization.
//!
//! Monetary amounts are serialized as decimal strings to avoid float
//! rounding.

pub mod monitoring_dto;
pub mod pricing_dto;
pub mod scheduler_dto;

pub use monitoring_dto::*;
pub use pricing_dto::*;
pub use scheduler_dto::*;
