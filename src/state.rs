//! Application state management for the monitor.
//!
//! This module defines the shared application state that is passed
//! to HTTP handlers and owned alongside the background sampler.

use prometheus::Registry;
use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::metrics::SoftwareMetrics;
use crate::sampler::Sampler;
use crate::store::TimeSeriesStore;

/// Type alias for shared application state.
pub type SharedState = Arc<AppState>;

/// Global application state shared across requests and background tasks.
pub struct AppState {
    pub registry: Registry,
    pub metrics: SoftwareMetrics,
    pub store: Arc<TimeSeriesStore>,
    pub sampler: Arc<Sampler>,
    pub config: Arc<Config>,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    /// Builds state with a fresh Prometheus registry.
    pub fn new(
        store: Arc<TimeSeriesStore>,
        sampler: Arc<Sampler>,
        config: Config,
    ) -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let metrics = SoftwareMetrics::new(&registry)?;
        Ok(Self {
            registry,
            metrics,
            store,
            sampler,
            config: Arc::new(config),
            start_time: Instant::now(),
        })
    }
}
