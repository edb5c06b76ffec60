//! CPU statistics parsing for process metrics.
//!
//! This module provides functions to parse CPU time information from
//! `/proc/<pid>/stat` and manage CPU usage caching for delta calculations.

use ahash::AHashMap as HashMap;
use once_cell::sync::Lazy;
use std::fs;
use std::path::Path;
use std::sync::{PoisonError, RwLock as StdRwLock};
use std::time::Instant;
use tracing::debug;

/// Get system clock ticks per second (usually 100, but can vary).
fn get_clk_tck() -> f64 {
    #[cfg(unix)]
    {
        // SAFETY: sysconf is safe to call with _SC_CLK_TCK
        // Returns -1 on error, 0 if undefined - both are handled by the > 0 check
        unsafe {
            let tck = libc::sysconf(libc::_SC_CLK_TCK);
            if tck > 0 {
                return tck as f64;
            }
        }
    }
    // Fallback to common default for error cases or non-Unix platforms
    100.0
}

/// System clock ticks per second (for CPU time calculation).
pub static CLK_TCK: Lazy<f64> = Lazy::new(get_clk_tck);

/// Cache entry with timestamp for delta-based CPU calculation.
#[derive(Clone, Copy)]
pub struct CpuEntry {
    pub cpu_time_seconds: f64,
    pub last_updated: Instant,
}

/// Per-pid CPU baselines shared across collection passes.
pub type CpuCache = StdRwLock<HashMap<u32, CpuEntry>>;

/// Parse total CPU time (user+system) in seconds from /proc/<pid>/stat.
pub fn parse_cpu_time_seconds(proc_path: &Path) -> Result<f64, std::io::Error> {
    let stat_path = proc_path.join("stat");
    let content = fs::read_to_string(stat_path)?;

    // The comm field may contain spaces; fields are counted after the closing paren.
    let after_comm = content
        .rfind(')')
        .map(|idx| &content[idx + 1..])
        .ok_or_else(|| std::io::Error::other("Invalid stat format"))?;
    let parts: Vec<&str> = after_comm.split_whitespace().collect();
    // utime and stime are fields 14 and 15; state (field 3) is parts[0].
    if parts.len() <= 12 {
        return Err(std::io::Error::other("Invalid stat format"));
    }

    let utime: f64 = parts[11].parse().unwrap_or(0.0);
    let stime: f64 = parts[12].parse().unwrap_or(0.0);

    // Use system-detected clock ticks per second
    Ok((utime + stime) / *CLK_TCK)
}

/// Returns instantaneous CPU percent for a PID using the delta since the
/// previous sample, and records the new baseline.
///
/// The first call for a pid has no baseline and returns 0.0.
pub fn cpu_percent_for_pid(pid: u32, proc_path: &Path, cache: &CpuCache) -> f64 {
    let now = Instant::now();
    let cpu_time_seconds = match parse_cpu_time_seconds(proc_path) {
        Ok(v) => v,
        Err(e) => {
            debug!("Failed to read CPU time for pid {}: {}", pid, e);
            return 0.0;
        }
    };

    let mut cpu_percent = 0.0;

    // Use delta between last and current CPU time to compute percent
    {
        let cache_read = cache.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = cache_read.get(&pid) {
            let dt = now.duration_since(entry.last_updated).as_secs_f64();
            if dt > 0.0 {
                let delta_cpu = cpu_time_seconds - entry.cpu_time_seconds;
                if delta_cpu > 0.0 {
                    cpu_percent = (delta_cpu / dt) * 100.0;
                }
            }
        }
    }

    // Store updated value in cache
    {
        let mut cache_write = cache.write().unwrap_or_else(PoisonError::into_inner);
        cache_write.insert(
            pid,
            CpuEntry {
                cpu_time_seconds,
                last_updated: now,
            },
        );
    }

    cpu_percent
}

/// Drops baselines for pids not seen in the latest pass.
pub fn retain_pids(cache: &CpuCache, alive: &ahash::AHashSet<u32>) {
    let mut cache_write = cache.write().unwrap_or_else(PoisonError::into_inner);
    cache_write.retain(|pid, _| alive.contains(pid));
}
