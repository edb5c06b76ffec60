//! Bounded per-group time-series store.
//!
//! `TimeSeriesStore` keeps one `Ringbuffer` per software group behind a single
//! mutex, hands out deep-copied snapshots to readers and persists the history
//! as JSON through a temp-file-then-rename sequence.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::ringbuffer::{MetricsPoint, Ringbuffer};

/// History retained for one software group.
#[derive(Debug, Clone)]
pub struct SoftwareSeries {
    pub key: String,
    pub display_name: String,
    pub points: Ringbuffer,
}

/// Owned copy of one series, in the wire/persistence shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesSnapshot {
    pub key: String,
    pub display_name: String,
    pub points: Vec<MetricsPoint>,
}

impl SeriesSnapshot {
    /// Timestamp of the newest point, if any.
    pub fn newest_timestamp(&self) -> Option<f64> {
        self.points.last().map(|p| p.timestamp)
    }
}

/// Point-in-time copy of every series, keyed by group key.
pub type Snapshot = BTreeMap<String, SeriesSnapshot>;

/// Result of a `persist` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    /// No path configured or the throttle interval has not elapsed.
    Skipped,
    Written,
    /// I/O failure; logged and retried on the next eligible call.
    Failed,
}

/// Size information about the store.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StoreStats {
    pub series: usize,
    pub points: usize,
    pub capacity: usize,
}

/// Lock-protected mapping of group key to bounded history.
pub struct TimeSeriesStore {
    series: Mutex<BTreeMap<String, SoftwareSeries>>,
    capacity: usize,
    persistence_path: Option<PathBuf>,
    persist_interval: Duration,
    /// Time of the last successful persist; also serializes writers.
    last_persist: Mutex<Option<Instant>>,
}

impl TimeSeriesStore {
    /// Creates an empty store.
    ///
    /// # Arguments
    /// * `capacity` - Maximum points retained per series
    /// * `persistence_path` - Target JSON file, `None` disables persistence
    /// * `persist_interval` - Minimum time between non-forced persists
    pub fn new(
        capacity: usize,
        persistence_path: Option<PathBuf>,
        persist_interval: Duration,
    ) -> Self {
        Self {
            series: Mutex::new(BTreeMap::new()),
            capacity: capacity.max(1),
            persistence_path,
            persist_interval,
            last_persist: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, SoftwareSeries>> {
        self.series.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Capacity shared by every series.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Creates the series if absent, otherwise refreshes its display name.
    pub fn ensure_series(&self, key: &str, display_name: &str) {
        let mut series = self.lock();
        Self::ensure_locked(&mut series, key, display_name, self.capacity);
    }

    fn ensure_locked<'a>(
        series: &'a mut BTreeMap<String, SoftwareSeries>,
        key: &str,
        display_name: &str,
        capacity: usize,
    ) -> &'a mut SoftwareSeries {
        let entry = series
            .entry(key.to_string())
            .or_insert_with(|| SoftwareSeries {
                key: key.to_string(),
                display_name: display_name.to_string(),
                points: Ringbuffer::new(capacity),
            });
        if entry.display_name != display_name {
            entry.display_name = display_name.to_string();
        }
        entry
    }

    /// Appends a point to the group's series, evicting the oldest at capacity.
    pub fn add_point(&self, key: &str, display_name: &str, point: MetricsPoint) {
        let mut series = self.lock();
        Self::ensure_locked(&mut series, key, display_name, self.capacity)
            .points
            .push(point);
    }

    /// Returns an independent copy of every series.
    pub fn snapshot(&self) -> Snapshot {
        let series = self.lock();
        series
            .iter()
            .map(|(key, s)| {
                (
                    key.clone(),
                    SeriesSnapshot {
                        key: key.clone(),
                        display_name: s.display_name.clone(),
                        points: s.points.get_history(),
                    },
                )
            })
            .collect()
    }

    /// Returns the newest point of every non-empty series.
    pub fn latest(&self) -> Vec<(String, String, MetricsPoint)> {
        let series = self.lock();
        series
            .iter()
            .filter_map(|(key, s)| {
                s.points
                    .last()
                    .map(|p| (key.clone(), s.display_name.clone(), *p))
            })
            .collect()
    }

    /// Returns size information about the store.
    pub fn stats(&self) -> StoreStats {
        let series = self.lock();
        StoreStats {
            series: series.len(),
            points: series.values().map(|s| s.points.len()).sum(),
            capacity: self.capacity,
        }
    }

    /// Writes the current snapshot to disk unless throttled.
    ///
    /// The file is written to `<path>.tmp` first and renamed over the target
    /// so readers never observe a partial file.
    pub fn persist(&self, force: bool) -> PersistOutcome {
        let Some(path) = self.persistence_path.as_deref() else {
            return PersistOutcome::Skipped;
        };

        let mut last_persist = self
            .last_persist
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !force {
            if let Some(last) = *last_persist {
                if last.elapsed() < self.persist_interval {
                    return PersistOutcome::Skipped;
                }
            }
        }

        let started = Instant::now();
        let snapshot = self.snapshot();
        match write_atomically(path, &snapshot) {
            Ok(()) => {
                *last_persist = Some(started);
                debug!(
                    "Persisted {} series to {} in {:.2}ms",
                    snapshot.len(),
                    path.display(),
                    started.elapsed().as_secs_f64() * 1000.0
                );
                PersistOutcome::Written
            }
            Err(e) => {
                warn!("Failed to persist history to {}: {}", path.display(), e);
                PersistOutcome::Failed
            }
        }
    }

    /// Restores history from disk, best effort.
    ///
    /// A missing file leaves the store untouched. An unreadable or corrupt
    /// file yields an empty store. Individual malformed points are dropped.
    pub fn load(&self) {
        let Some(path) = self.persistence_path.as_deref() else {
            return;
        };
        if !path.exists() {
            debug!("No persisted history at {}", path.display());
            return;
        }

        let restored = match read_series(path, self.capacity) {
            Ok(restored) => restored,
            Err(e) => {
                warn!(
                    "Ignoring unreadable history file {}: {}",
                    path.display(),
                    e
                );
                BTreeMap::new()
            }
        };

        let count = restored.len();
        *self.lock() = restored;
        info!("Restored {} series from {}", count, path.display());
    }
}

fn write_atomically(path: &Path, snapshot: &Snapshot) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let body = serde_json::to_vec(snapshot)?;
    fs::write(&tmp, body)?;
    fs::rename(&tmp, path)
}

fn read_series(
    path: &Path,
    capacity: usize,
) -> Result<BTreeMap<String, SoftwareSeries>, Box<dyn std::error::Error>> {
    let content = fs::read_to_string(path)?;
    let root: Value = serde_json::from_str(&content)?;
    let Value::Object(root) = root else {
        return Err("top-level value is not an object".into());
    };

    let mut out = BTreeMap::new();
    for (key, raw) in root {
        let Value::Object(raw) = raw else {
            debug!("Dropping series {}: not an object", key);
            continue;
        };

        let display_name = raw
            .get("display_name")
            .and_then(Value::as_str)
            .unwrap_or(key.as_str())
            .to_string();

        let points: Vec<&Value> = raw
            .get("points")
            .and_then(Value::as_array)
            .map(|v| v.iter().collect())
            .unwrap_or_default();

        let mut buffer = Ringbuffer::new(capacity);
        let skip = points.len().saturating_sub(capacity);
        for p in points.into_iter().skip(skip) {
            match parse_point(p) {
                Some(point) => buffer.push(point),
                None => debug!("Dropping malformed point in series {}", key),
            }
        }

        out.insert(
            key.clone(),
            SoftwareSeries {
                key,
                display_name,
                points: buffer,
            },
        );
    }
    Ok(out)
}

/// Parses one persisted point. Missing fields default to zero, fields of the
/// wrong type reject the whole point.
fn parse_point(value: &Value) -> Option<MetricsPoint> {
    let obj = value.as_object()?;
    Some(MetricsPoint {
        timestamp: float_field(obj, "t")?,
        process_count: uint_field(obj, "process_count")?,
        cpu_percent: float_field(obj, "cpu")?,
        memory_bytes: uint_field(obj, "mem")?,
    })
}

fn float_field(obj: &Map<String, Value>, name: &str) -> Option<f64> {
    match obj.get(name) {
        None => Some(0.0),
        Some(v) => v.as_f64(),
    }
}

fn uint_field(obj: &Map<String, Value>, name: &str) -> Option<u64> {
    match obj.get(name) {
        None => Some(0),
        Some(v) => v.as_u64().or_else(|| {
            v.as_f64()
                .filter(|f| f.is_finite() && *f >= 0.0)
                .map(|f| f as u64)
        }),
    }
}
