//! Metrics endpoint handler for Prometheus scraping.
//!
//! This module provides the `/metrics` endpoint handler. Gauges are refreshed
//! from the store and sampler on every scrape; no collection is triggered.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use prometheus::{Encoder, TextEncoder};
use std::time::Instant;
use tracing::{debug, error, instrument};

use crate::state::SharedState;

/// Buffer capacity for metrics encoding.
const BUFFER_CAP: usize = 64 * 1024;

/// Error type for metrics endpoint failures.
#[derive(Debug)]
pub enum MetricsError {
    EncodingFailed,
}

impl IntoResponse for MetricsError {
    fn into_response(self) -> axum::response::Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to encode metrics",
        )
            .into_response()
    }
}

/// Handler for the /metrics endpoint.
#[instrument(skip(state))]
pub async fn metrics_handler(State(state): State<SharedState>) -> Result<String, MetricsError> {
    let start = Instant::now();

    let latest = state.store.latest();
    state.metrics.observe_groups(&latest);
    state.metrics.observe_sampler(&state.sampler.status());
    state.metrics.observe_store(&state.store.stats());

    let families = state.registry.gather();
    let mut buffer = Vec::with_capacity(BUFFER_CAP);
    if TextEncoder::new().encode(&families, &mut buffer).is_err() {
        error!("Failed to encode Prometheus metrics");
        return Err(MetricsError::EncodingFailed);
    }

    state
        .metrics
        .scrape_duration_seconds
        .set(start.elapsed().as_secs_f64());

    debug!(
        "Metrics request completed: {} groups, {} bytes, {:.3}ms",
        latest.len(),
        buffer.len(),
        start.elapsed().as_secs_f64() * 1000.0
    );

    String::from_utf8(buffer).map_err(|_| MetricsError::EncodingFailed)
}
