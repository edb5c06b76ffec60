//! Health check endpoint handler.
//!
//! This module provides the `/health` endpoint handler that returns
//! sampler and store status as plain text.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use std::fmt::Write as FmtWrite;
use tracing::{debug, instrument};

use crate::handlers::events::active_connections;
use crate::state::SharedState;

// Time conversion constants
const SECONDS_PER_HOUR: f64 = 3600.0;
const MINUTES_PER_HOUR: f64 = 60.0;
const HOURS_PER_DAY: f64 = 24.0;

/// Footer text for human-readable HTTP endpoints.
pub const FOOTER_TEXT: &str = "herakles-software-monitor";

/// Formats an uptime in the largest sensible unit.
pub fn format_uptime(uptime_seconds: u64) -> String {
    let uptime_hours = uptime_seconds as f64 / SECONDS_PER_HOUR;
    if uptime_hours < 1.0 {
        format!("{:.1} minutes", uptime_hours * MINUTES_PER_HOUR)
    } else if uptime_hours < HOURS_PER_DAY {
        format!("{:.1} hours", uptime_hours)
    } else {
        format!("{:.1} days", uptime_hours / HOURS_PER_DAY)
    }
}

/// Handler for the /health endpoint.
///
/// Returns 503 while the last sampling cycle reported an error.
#[instrument(skip(state))]
pub async fn health_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing /health request");

    let status = state.sampler.status();
    let stats = state.store.stats();

    let (code, message) = match &status.last_error {
        None => (StatusCode::OK, "OK".to_string()),
        Some(err) => (StatusCode::SERVICE_UNAVAILABLE, format!("Sampling failed: {err}")),
    };

    let uptime_str = format_uptime(state.start_time.elapsed().as_secs());

    let mut table = String::new();
    writeln!(table, "{:25} | {}", "Mode", status.mode).ok();
    writeln!(table, "{:25} | {}", "WinRM configured", status.winrm_configured).ok();
    writeln!(table, "{:25} | {:.3}", "Last sample (unix)", status.last_sample_ts).ok();
    writeln!(table, "{:25} | {}", "Last remote fetch", status.last_fetch_count).ok();
    writeln!(table, "{:25} | {}", "Software groups", stats.series).ok();
    writeln!(table, "{:25} | {}", "Retained points", stats.points).ok();
    writeln!(table, "{:25} | {}", "Capacity per group", stats.capacity).ok();
    writeln!(table, "{:25} | {}", "Event streams", active_connections()).ok();

    debug!("Health check: {} - {}", code, message);
    (
        code,
        [("Content-Type", "text/plain; charset=utf-8")],
        format!("{message}\n\nUptime: {uptime_str}\n\n{table}\n{FOOTER_TEXT}\n"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_uptime() {
        assert_eq!(format_uptime(90), "1.5 minutes");
        assert_eq!(format_uptime(7200), "2.0 hours");
        assert_eq!(format_uptime(3 * 86400), "3.0 days");
    }
}
