//! HTTP endpoint handlers for the monitor.
//!
//! This module provides handlers for all HTTP endpoints:
//! - `/`: Dashboard page
//! - `/api/snapshot`, `/api/status`, `/api/winrm`: JSON API
//! - `/events`: Server-sent snapshot updates
//! - `/health`: Health check endpoint
//! - `/metrics`: Prometheus metrics endpoint

pub mod api;
pub mod events;
pub mod health;
pub mod metrics;
pub mod root;

use axum::{
    routing::{get, post},
    Router,
};

use crate::state::SharedState;

// Re-export handlers
pub use api::{snapshot_handler, status_handler, winrm_handler};
pub use events::events_handler;
pub use health::health_handler;
pub use metrics::metrics_handler;
pub use root::root_handler;

/// Builds the application router.
pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/api/snapshot", get(snapshot_handler))
        .route("/api/status", get(status_handler))
        .route("/api/winrm", post(winrm_handler))
        .route("/events", get(events_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}
