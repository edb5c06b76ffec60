//! Prometheus metrics definitions for herakles-software-monitor.
//!
//! Only the newest point of each software group is exported, together with
//! sampler and store telemetry. History stays in the time-series store.

use prometheus::{Gauge, GaugeVec, Opts, Registry};

use crate::ringbuffer::MetricsPoint;
use crate::sampler::SamplerStatus;
use crate::store::StoreStats;

/// Collection of Prometheus metrics.
#[derive(Clone)]
pub struct SoftwareMetrics {
    // ========== Group Metrics ==========
    pub group_process_count: GaugeVec, // labels: key, software
    pub group_cpu_percent: GaugeVec,   // labels: key, software
    pub group_memory_bytes: GaugeVec,  // labels: key, software
    pub group_last_sample_timestamp_seconds: GaugeVec, // labels: key, software

    // ========== Sampler Metrics ==========
    pub sampler_up: Gauge,
    pub sampler_remote_mode: Gauge,
    pub sampler_remote_configured: Gauge,
    pub sampler_last_fetch_count: Gauge,
    pub sampler_last_sample_timestamp_seconds: Gauge,

    // ========== Store Metrics ==========
    pub store_series: Gauge,
    pub store_points: Gauge,
    pub store_capacity: Gauge,

    pub scrape_duration_seconds: Gauge,
}

const GROUP_LABELS: &[&str] = &["key", "software"];

impl SoftwareMetrics {
    /// Creates and registers all Prometheus metrics with the registry.
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let group_process_count = GaugeVec::new(
            Opts::new(
                "herakles_software_process_count",
                "Number of processes in the software group at the last sample",
            ),
            GROUP_LABELS,
        )?;
        let group_cpu_percent = GaugeVec::new(
            Opts::new(
                "herakles_software_cpu_percent",
                "Summed CPU percent of the software group (local mode only)",
            ),
            GROUP_LABELS,
        )?;
        let group_memory_bytes = GaugeVec::new(
            Opts::new(
                "herakles_software_memory_bytes",
                "Summed resident memory of the software group in bytes",
            ),
            GROUP_LABELS,
        )?;
        let group_last_sample_timestamp_seconds = GaugeVec::new(
            Opts::new(
                "herakles_software_last_sample_timestamp_seconds",
                "Unix time of the newest point of the software group",
            ),
            GROUP_LABELS,
        )?;

        let sampler_up = Gauge::new(
            "herakles_sampler_up",
            "1 if the last sampling cycle succeeded, 0 otherwise",
        )?;
        let sampler_remote_mode = Gauge::new(
            "herakles_sampler_remote_mode",
            "1 if the sampler collects from a remote host",
        )?;
        let sampler_remote_configured = Gauge::new(
            "herakles_sampler_remote_configured",
            "1 if a remote session is configured",
        )?;
        let sampler_last_fetch_count = Gauge::new(
            "herakles_sampler_last_fetch_count",
            "Number of processes returned by the last successful remote query",
        )?;
        let sampler_last_sample_timestamp_seconds = Gauge::new(
            "herakles_sampler_last_sample_timestamp_seconds",
            "Unix time of the last sampling cycle",
        )?;

        let store_series = Gauge::new("herakles_store_series", "Number of tracked software groups")?;
        let store_points = Gauge::new(
            "herakles_store_points",
            "Total points retained across all series",
        )?;
        let store_capacity = Gauge::new(
            "herakles_store_capacity_points",
            "Maximum points retained per series",
        )?;

        let scrape_duration_seconds = Gauge::new(
            "herakles_scrape_duration_seconds",
            "Time spent rendering the metrics response",
        )?;

        registry.register(Box::new(group_process_count.clone()))?;
        registry.register(Box::new(group_cpu_percent.clone()))?;
        registry.register(Box::new(group_memory_bytes.clone()))?;
        registry.register(Box::new(group_last_sample_timestamp_seconds.clone()))?;
        registry.register(Box::new(sampler_up.clone()))?;
        registry.register(Box::new(sampler_remote_mode.clone()))?;
        registry.register(Box::new(sampler_remote_configured.clone()))?;
        registry.register(Box::new(sampler_last_fetch_count.clone()))?;
        registry.register(Box::new(sampler_last_sample_timestamp_seconds.clone()))?;
        registry.register(Box::new(store_series.clone()))?;
        registry.register(Box::new(store_points.clone()))?;
        registry.register(Box::new(store_capacity.clone()))?;
        registry.register(Box::new(scrape_duration_seconds.clone()))?;

        Ok(Self {
            group_process_count,
            group_cpu_percent,
            group_memory_bytes,
            group_last_sample_timestamp_seconds,
            sampler_up,
            sampler_remote_mode,
            sampler_remote_configured,
            sampler_last_fetch_count,
            sampler_last_sample_timestamp_seconds,
            store_series,
            store_points,
            store_capacity,
            scrape_duration_seconds,
        })
    }

    /// Resets the per-group vectors so vanished label sets are not exported.
    pub fn reset_group_metrics(&self) {
        self.group_process_count.reset();
        self.group_cpu_percent.reset();
        self.group_memory_bytes.reset();
        self.group_last_sample_timestamp_seconds.reset();
    }

    /// Sets group gauges from the newest point of each series.
    pub fn observe_groups(&self, latest: &[(String, String, MetricsPoint)]) {
        self.reset_group_metrics();
        for (key, display_name, point) in latest {
            let labels = [key.as_str(), display_name.as_str()];
            self.group_process_count
                .with_label_values(&labels)
                .set(point.process_count as f64);
            self.group_cpu_percent
                .with_label_values(&labels)
                .set(point.cpu_percent);
            self.group_memory_bytes
                .with_label_values(&labels)
                .set(point.memory_bytes as f64);
            self.group_last_sample_timestamp_seconds
                .with_label_values(&labels)
                .set(point.timestamp);
        }
    }

    pub fn observe_sampler(&self, status: &SamplerStatus) {
        let flag = |b: bool| if b { 1.0 } else { 0.0 };
        self.sampler_up.set(flag(status.last_error.is_none()));
        self.sampler_remote_mode
            .set(flag(status.mode == crate::collectors::Mode::Winrm));
        self.sampler_remote_configured
            .set(flag(status.winrm_configured));
        self.sampler_last_fetch_count
            .set(status.last_fetch_count as f64);
        self.sampler_last_sample_timestamp_seconds
            .set(status.last_sample_ts);
    }

    pub fn observe_store(&self, stats: &StoreStats) {
        self.store_series.set(stats.series as f64);
        self.store_points.set(stats.points as f64);
        self.store_capacity.set(stats.capacity as f64);
    }
}
