//! Local process collector backed by /proc.

use ahash::AHashSet;
use async_trait::async_trait;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, instrument};

use super::{CollectionError, Collector, CpuSample, Mode, ProcessRecord};
use crate::process::{
    collect_proc_entries, cpu_percent_for_pid, read_exe_path, read_process_name, read_rss_bytes,
    retain_pids, CpuCache,
};

/// Default procfs mount point.
pub const DEFAULT_PROC_ROOT: &str = "/proc";

/// Enumerates processes of this host.
///
/// CPU percent is computed against the previous pass, so the first pass only
/// establishes baselines; call `prime()` once before sampling.
pub struct LocalCollector {
    inner: Arc<ProcScan>,
}

/// State shared with the blocking scan task.
struct ProcScan {
    proc_root: PathBuf,
    cpu_cache: CpuCache,
}

impl Default for LocalCollector {
    fn default() -> Self {
        Self::new(DEFAULT_PROC_ROOT)
    }
}

impl LocalCollector {
    pub fn new(proc_root: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(ProcScan {
                proc_root: proc_root.into(),
                cpu_cache: CpuCache::default(),
            }),
        }
    }

    pub fn proc_root(&self) -> &Path {
        &self.inner.proc_root
    }

    /// Runs one pass on the calling thread, skipping processes that vanish
    /// or deny access.
    pub fn scan(&self) -> Result<Vec<ProcessRecord>, CollectionError> {
        self.inner.scan()
    }
}

impl ProcScan {
    fn scan(&self) -> Result<Vec<ProcessRecord>, CollectionError> {
        let start = Instant::now();
        let entries =
            collect_proc_entries(&self.proc_root).map_err(|source| CollectionError::ProcUnavailable {
                path: self.proc_root.clone(),
                source,
            })?;

        let skipped = AtomicUsize::new(0);
        let records: Vec<ProcessRecord> = entries
            .par_iter()
            .filter_map(|entry| {
                let name = match read_process_name(&entry.proc_path) {
                    Some(name) => name,
                    None => {
                        debug!("Skipping process {}: could not read name", entry.pid);
                        skipped.fetch_add(1, Ordering::Relaxed);
                        return None;
                    }
                };

                let memory_bytes = match read_rss_bytes(&entry.proc_path) {
                    Ok(v) => v,
                    Err(e) => {
                        debug!("Skipping process {} ({}): {}", entry.pid, name, e);
                        skipped.fetch_add(1, Ordering::Relaxed);
                        return None;
                    }
                };

                let cpu = cpu_percent_for_pid(entry.pid, &entry.proc_path, &self.cpu_cache);

                Some(ProcessRecord {
                    pid: entry.pid,
                    name,
                    exe: read_exe_path(&entry.proc_path),
                    cpu: CpuSample::Percent(cpu),
                    memory_bytes,
                })
            })
            .collect();

        let alive: AHashSet<u32> = records.iter().map(|r| r.pid).collect();
        retain_pids(&self.cpu_cache, &alive);

        debug!(
            "Local scan: {} processes, {} skipped, {:.2}ms",
            records.len(),
            skipped.load(Ordering::Relaxed),
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(records)
    }
}

#[async_trait]
impl Collector for LocalCollector {
    fn mode(&self) -> Mode {
        Mode::Local
    }

    fn prime(&self) {
        match self.scan() {
            Ok(records) => debug!("Primed CPU baselines for {} processes", records.len()),
            Err(e) => debug!("CPU priming pass failed: {}", e),
        }
    }

    /// Runs the pass on tokio's blocking pool.
    #[instrument(skip(self))]
    async fn enumerate(&self) -> Result<Vec<ProcessRecord>, CollectionError> {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || inner.scan())
            .await
            .map_err(|e| CollectionError::ProcUnavailable {
                path: self.inner.proc_root.clone(),
                source: std::io::Error::other(format!("scan task failed: {e}")),
            })?
    }
}
