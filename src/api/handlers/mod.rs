//! REST endpoint handlers organized by resource.

pub mod monitoring;
pub mod pricing;
pub mod scheduler;
pub mod system;

use axum::Router;

use crate::app_state::AppState;

/// Composes all resource routes under `/api/v1`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(scheduler::routes())
        .merge(monitoring::routes())
        .merge(pricing::routes())
}
