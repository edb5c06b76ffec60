//! End-to-end tests of the sampling pipeline.
//!
//! A canned PowerShell transport stands in for the remote host so the whole
//! Collector -> Matcher -> Aggregator -> Store path runs without a network.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use herakles_software_monitor::collectors::{
    CollectionError, Collector, CpuSample, Mode, ProcessRecord, RemoteCollector, RemoteSettings,
    RemoteShell, SessionError,
};
use herakles_software_monitor::process::Matcher;
use herakles_software_monitor::sampler::RemoteConnector;
use herakles_software_monitor::{aggregate, ChangeFeed, Sampler, TimeSeriesStore};

const TARGET: &str = r"C:\Program Files\Splashtop";

const PROCESS_JSON: &str = r#"[
    {"ProcessId": 100, "Name": "SRManager.exe",
     "ExecutablePath": "C:\\Program Files\\Splashtop\\Splashtop Remote\\Server\\SRManager.exe",
     "KernelModeTime": 10, "UserModeTime": 20, "WorkingSetSize": 1000},
    {"ProcessId": 101, "Name": "SRServer.exe",
     "ExecutablePath": "C:\\Program Files\\Splashtop\\Splashtop Remote\\Server\\SRServer.exe",
     "KernelModeTime": 1, "UserModeTime": 2, "WorkingSetSize": 500},
    {"ProcessId": 200, "Name": "AteraAgent.exe", "ExecutablePath": null,
     "KernelModeTime": 0, "UserModeTime": 0, "WorkingSetSize": 300},
    {"ProcessId": 4, "Name": "System", "ExecutablePath": null,
     "KernelModeTime": 0, "UserModeTime": 0, "WorkingSetSize": 64}
]"#;

struct CannedShell {
    calls: AtomicUsize,
}

#[async_trait]
impl RemoteShell for CannedShell {
    async fn run_powershell(&self, _script: &str) -> Result<String, CollectionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(PROCESS_JSON.to_string())
    }
}

/// Accepts only the password "secret".
struct CannedConnector;

#[async_trait]
impl RemoteConnector for CannedConnector {
    async fn connect(&self, settings: &RemoteSettings) -> Result<Arc<dyn Collector>, SessionError> {
        if settings.password != "secret" {
            return Err(SessionError::Rejected("authentication failed (HTTP 401)".to_string()));
        }
        let shell = Arc::new(CannedShell {
            calls: AtomicUsize::new(0),
        });
        Ok(Arc::new(RemoteCollector::new(shell)))
    }
}

struct IdleLocal;

#[async_trait]
impl Collector for IdleLocal {
    fn mode(&self) -> Mode {
        Mode::Local
    }

    async fn enumerate(&self) -> Result<Vec<ProcessRecord>, CollectionError> {
        Ok(vec![ProcessRecord {
            pid: 1,
            name: "streamer".to_string(),
            exe: None,
            cpu: CpuSample::Percent(12.5),
            memory_bytes: 4096,
        }])
    }
}

fn settings(password: &str) -> RemoteSettings {
    RemoteSettings {
        host: "winhost".to_string(),
        port: 5985,
        username: "admin".to_string(),
        password: password.to_string(),
        use_ssl: false,
        timeout_secs: 5,
    }
}

fn build(mode: Mode) -> (Arc<TimeSeriesStore>, Sampler) {
    let store = Arc::new(TimeSeriesStore::new(100, None, Duration::from_secs(10)));
    let sampler = Sampler::new(
        Arc::clone(&store),
        Matcher::with_builtin_groups(vec![TARGET.to_string()]),
        mode,
        Duration::from_secs(5),
        Arc::new(IdleLocal),
        Arc::new(CannedConnector),
    );
    (store, sampler)
}

#[test]
fn test_aggregate_groups_by_install_directory_and_keyword() {
    let matcher = Matcher::with_builtin_groups(vec![TARGET.to_string()]);
    let records = vec![
        ProcessRecord {
            pid: 1,
            name: "a.exe".to_string(),
            exe: Some(format!(r"{}\Splashtop Remote\Server\a.exe", TARGET)),
            cpu: CpuSample::Percent(1.5),
            memory_bytes: 100,
        },
        ProcessRecord {
            pid: 2,
            name: "b.exe".to_string(),
            exe: Some(format!(r"{}\Splashtop Remote\Server\b.exe", TARGET)),
            cpu: CpuSample::Percent(2.5),
            memory_bytes: 200,
        },
        ProcessRecord {
            pid: 3,
            name: "AteraAgent.exe".to_string(),
            exe: None,
            cpu: CpuSample::CumulativeTime(123_456),
            memory_bytes: 50,
        },
        ProcessRecord {
            pid: 4,
            name: "explorer.exe".to_string(),
            exe: Some(r"C:\Windows\explorer.exe".to_string()),
            cpu: CpuSample::Percent(9.0),
            memory_bytes: 999,
        },
    ];

    let groups = aggregate(&records, &matcher);
    assert_eq!(groups.len(), 2);

    let remote = &groups[r"c:\program files\splashtop|splashtop remote"];
    assert_eq!(remote.display_name, "splashtop remote");
    assert_eq!(remote.process_count, 2);
    assert_eq!(remote.cpu_percent, 4.0);
    assert_eq!(remote.memory_bytes, 300);

    let atera = &groups["name|Atera"];
    assert_eq!(atera.display_name, "Atera");
    assert_eq!(atera.process_count, 1);
    assert_eq!(atera.cpu_percent, 0.0);
    assert_eq!(atera.memory_bytes, 50);
}

#[tokio::test]
async fn test_remote_cycle_after_credentials() {
    let (store, sampler) = build(Mode::Local);

    let err = sampler
        .set_remote_credentials(settings("wrong"))
        .await
        .expect_err("rejected");
    assert!(err.to_string().contains("401"));
    assert_eq!(sampler.status().mode, Mode::Local);

    sampler
        .set_remote_credentials(settings("secret"))
        .await
        .expect("accepted");
    let status = sampler.status();
    assert_eq!(status.mode, Mode::Winrm);
    assert!(status.winrm_configured);
    assert_eq!(status.last_error, None);

    let report = sampler.run_cycle_at(1_700_000_000.0).await;
    assert_eq!(report.error, None);
    assert_eq!(report.records, 4);
    assert_eq!(report.groups, 2);

    let status = sampler.status();
    assert_eq!(status.last_fetch_count, 4);
    assert_eq!(status.last_sample_ts, 1_700_000_000.0);

    let snap = store.snapshot();
    let remote = &snap[r"c:\program files\splashtop|splashtop remote"];
    assert_eq!(remote.points.len(), 1);
    assert_eq!(remote.points[0].process_count, 2);
    assert_eq!(remote.points[0].memory_bytes, 1500);
    assert_eq!(remote.points[0].cpu_percent, 0.0);
    assert_eq!(snap["name|Atera"].points[0].memory_bytes, 300);
}

#[tokio::test]
async fn test_unconfigured_remote_then_recovery_clears_error() {
    let (store, sampler) = build(Mode::Winrm);

    let report = sampler.run_cycle_at(10.0).await;
    assert_eq!(report.error.as_deref(), Some("WinRM not configured"));
    assert_eq!(sampler.status().last_fetch_count, 0);
    assert!(store.snapshot().is_empty());

    sampler.connect_configured(&settings("secret")).await;
    let report = sampler.run_cycle_at(20.0).await;
    assert_eq!(report.error, None);
    assert_eq!(sampler.status().last_error, None);
    assert_eq!(store.stats().series, 2);
}

#[tokio::test]
async fn test_failed_startup_connection_is_reported_in_status() {
    let (_, sampler) = build(Mode::Winrm);

    sampler.connect_configured(&settings("wrong")).await;
    let status = sampler.status();
    assert!(!status.winrm_configured);
    assert!(status
        .last_error
        .as_deref()
        .is_some_and(|e| e.contains("401")));
}

#[tokio::test]
async fn test_local_mode_feeds_change_feed() {
    let (store, sampler) = build(Mode::Local);
    let mut feed = ChangeFeed::new();

    assert!(feed.poll(store.snapshot()).is_none());

    sampler.run_cycle_at(100.0).await;
    let pushed = feed.poll(store.snapshot()).expect("new data");
    assert_eq!(pushed["name|Splashtop"].points[0].cpu_percent, 12.5);
    assert_eq!(feed.watermark(), 100.0);

    assert!(feed.poll(store.snapshot()).is_none());

    sampler.run_cycle_at(101.0).await;
    assert!(feed.poll(store.snapshot()).is_some());
}
