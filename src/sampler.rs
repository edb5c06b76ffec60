//! Background sampling loop.
//!
//! The `Sampler` runs Collector -> Matcher -> Aggregator -> Store on a fixed
//! interval and owns the runtime-mutable configuration (mode, remote
//! session). The configuration lock and the store lock are never held at
//! the same time.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::aggregator::aggregate;
use crate::collectors::{
    CollectionError, Collector, Mode, RemoteCollector, RemoteSettings, SessionError, WinRmSession,
};
use crate::process::Matcher;
use crate::ringbuffer::MetricsPoint;
use crate::store::TimeSeriesStore;

/// Minimum sleep between cycles.
pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// How long `stop()` waits for the loop to exit.
pub const STOP_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Builds a remote collector from connection settings.
#[async_trait]
pub trait RemoteConnector: Send + Sync {
    async fn connect(&self, settings: &RemoteSettings) -> Result<Arc<dyn Collector>, SessionError>;
}

/// Connector backed by a real WinRM session.
#[derive(Debug, Default, Clone, Copy)]
pub struct WinRmConnector;

#[async_trait]
impl RemoteConnector for WinRmConnector {
    async fn connect(&self, settings: &RemoteSettings) -> Result<Arc<dyn Collector>, SessionError> {
        let session = WinRmSession::connect(settings).await?;
        info!("WinRM session established with {}", session.endpoint());
        Ok(Arc::new(RemoteCollector::new(Arc::new(session))))
    }
}

/// Copy of the sampler's observable state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SamplerStatus {
    pub mode: Mode,
    pub winrm_configured: bool,
    pub last_error: Option<String>,
    pub targets: Vec<String>,
    pub last_fetch_count: usize,
    pub last_sample_ts: f64,
}

/// Result of one cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub timestamp: f64,
    pub groups: usize,
    pub records: usize,
    pub error: Option<String>,
}

struct Runtime {
    mode: Mode,
    remote: Option<Arc<dyn Collector>>,
    last_error: Option<String>,
    last_fetch_count: usize,
    last_sample_ts: f64,
}

/// Periodic collector driving the time-series store.
pub struct Sampler {
    store: Arc<TimeSeriesStore>,
    matcher: Matcher,
    local: Arc<dyn Collector>,
    connector: Arc<dyn RemoteConnector>,
    interval: Duration,
    runtime: Mutex<Runtime>,
    stop_tx: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Sampler {
    /// Creates a sampler. The interval is clamped to at least one second.
    pub fn new(
        store: Arc<TimeSeriesStore>,
        matcher: Matcher,
        mode: Mode,
        interval: Duration,
        local: Arc<dyn Collector>,
        connector: Arc<dyn RemoteConnector>,
    ) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            store,
            matcher,
            local,
            connector,
            interval: interval.max(MIN_INTERVAL),
            runtime: Mutex::new(Runtime {
                mode,
                remote: None,
                last_error: None,
                last_fetch_count: 0,
                last_sample_ts: 0.0,
            }),
            stop_tx,
            task: Mutex::new(None),
        }
    }

    fn runtime(&self) -> MutexGuard<'_, Runtime> {
        self.runtime.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    /// Attempts the startup session from configured credentials.
    ///
    /// Failure is recorded as the last error rather than returned.
    pub async fn connect_configured(&self, settings: &RemoteSettings) {
        if settings.username.trim().is_empty() || settings.password.is_empty() {
            debug!("No WinRM credentials configured, waiting for POST /api/winrm");
            return;
        }
        match self.connector.connect(settings).await {
            Ok(collector) => {
                self.runtime().remote = Some(collector);
            }
            Err(e) => {
                warn!("Initial WinRM connection failed: {}", e);
                self.runtime().last_error = Some(e.to_string());
            }
        }
    }

    /// Replaces the remote session and switches to remote mode.
    ///
    /// The session is built outside the configuration lock; on failure no
    /// state changes.
    #[instrument(skip(self, settings), fields(host = %settings.host, port = settings.port))]
    pub async fn set_remote_credentials(&self, settings: RemoteSettings) -> Result<(), SessionError> {
        let collector = self.connector.connect(&settings).await?;
        let mut runtime = self.runtime();
        runtime.mode = Mode::Winrm;
        runtime.remote = Some(collector);
        runtime.last_error = None;
        info!("Remote credentials updated, mode set to winrm");
        Ok(())
    }

    pub fn status(&self) -> SamplerStatus {
        let runtime = self.runtime();
        SamplerStatus {
            mode: runtime.mode,
            winrm_configured: runtime.remote.is_some(),
            last_error: runtime.last_error.clone(),
            targets: self.matcher.targets().to_vec(),
            last_fetch_count: runtime.last_fetch_count,
            last_sample_ts: runtime.last_sample_ts,
        }
    }

    /// Runs one collect/aggregate/store pass stamped with the current time.
    pub async fn run_cycle(&self) -> CycleReport {
        self.run_cycle_at(epoch_seconds()).await
    }

    /// Runs one pass with an explicit timestamp.
    #[instrument(skip(self))]
    pub async fn run_cycle_at(&self, timestamp: f64) -> CycleReport {
        let started = Instant::now();
        let (mode, collector) = {
            let runtime = self.runtime();
            let collector = match runtime.mode {
                Mode::Local => Some(Arc::clone(&self.local)),
                Mode::Winrm => runtime.remote.clone(),
            };
            (runtime.mode, collector)
        };

        let result = match collector {
            Some(collector) => collector.enumerate().await,
            None => Err(CollectionError::NotConfigured),
        };

        let (records, error) = match result {
            Ok(records) => (records, None),
            Err(e) => {
                warn!("Collection failed ({} mode): {}", mode, e);
                (Vec::new(), Some(e.to_string()))
            }
        };

        {
            let mut runtime = self.runtime();
            runtime.last_error = error.clone();
            if error.is_none() && mode == Mode::Winrm {
                runtime.last_fetch_count = records.len();
            }
        }

        let groups = aggregate(&records, &self.matcher);
        for (key, totals) in &groups {
            self.store.add_point(
                key,
                &totals.display_name,
                MetricsPoint {
                    timestamp,
                    process_count: totals.process_count,
                    cpu_percent: totals.cpu_percent,
                    memory_bytes: totals.memory_bytes,
                },
            );
        }
        self.store.persist(false);

        self.runtime().last_sample_ts = timestamp;

        debug!(
            "Cycle finished: mode={}, records={}, groups={}, {:.2}ms",
            mode,
            records.len(),
            groups.len(),
            started.elapsed().as_secs_f64() * 1000.0
        );
        CycleReport {
            timestamp,
            groups: groups.len(),
            records: records.len(),
            error,
        }
    }

    /// Primes the local collector and spawns the sampling loop.
    ///
    /// Calling `start` on a running sampler does nothing.
    pub fn start(self: &Arc<Self>) {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.is_some() {
            return;
        }

        self.local.prime();
        self.stop_tx.send_replace(false);

        let sampler = Arc::clone(self);
        let mut stop_rx = self.stop_tx.subscribe();
        *task = Some(tokio::spawn(async move {
            info!("Sampler started (interval {:?})", sampler.interval);
            loop {
                sampler.run_cycle().await;
                if *stop_rx.borrow() {
                    break;
                }
                tokio::select! {
                    _ = tokio::time::sleep(sampler.interval) => {}
                    _ = stop_rx.changed() => {}
                }
                if *stop_rx.borrow() {
                    break;
                }
            }
            info!("Sampler loop exited");
        }));
    }

    /// Signals the loop to stop, waits up to the grace period and persists.
    pub async fn stop(&self) {
        self.stop_tx.send_replace(true);
        let handle = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(handle) = handle {
            match tokio::time::timeout(STOP_GRACE_PERIOD, handle).await {
                Ok(Ok(())) => debug!("Sampler task joined"),
                Ok(Err(e)) => warn!("Sampler task ended abnormally: {}", e),
                Err(_) => warn!(
                    "Sampler did not stop within {:?}, persisting anyway",
                    STOP_GRACE_PERIOD
                ),
            }
        }

        self.store.persist(true);
    }
}

/// Current wall-clock time in seconds since the Unix epoch.
pub fn epoch_seconds() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
