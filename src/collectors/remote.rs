//! Remote Windows process and service collector.
//!
//! Each entity type is fetched with one PowerShell CIM query whose result is
//! emitted as compact JSON and parsed row by row.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, instrument};

use super::{CollectionError, Collector, CpuSample, Mode, ProcessRecord, RemoteShell};

const PROCESS_QUERY: &str = "$ErrorActionPreference='Stop'; \
    ConvertTo-Json -Compress -InputObject @(Get-CimInstance Win32_Process | \
    Select-Object ProcessId,Name,ExecutablePath,KernelModeTime,UserModeTime,WorkingSetSize)";

const SERVICE_QUERY: &str = "$ErrorActionPreference='Stop'; \
    ConvertTo-Json -Compress -InputObject @(Get-CimInstance Win32_Service | \
    Select-Object Name,State,Status,PathName)";

/// A Windows service as reported by `Win32_Service`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceRecord {
    pub name: String,
    pub state: String,
    pub status: String,
    pub path: String,
}

/// Collects processes from a remote host over a `RemoteShell`.
pub struct RemoteCollector {
    shell: Arc<dyn RemoteShell>,
}

impl RemoteCollector {
    pub fn new(shell: Arc<dyn RemoteShell>) -> Self {
        Self { shell }
    }

    /// Lists remote processes. Rows with malformed numeric fields are skipped.
    #[instrument(skip(self))]
    pub async fn list_processes(&self) -> Result<Vec<ProcessRecord>, CollectionError> {
        let out = self.shell.run_powershell(PROCESS_QUERY).await?;
        let rows = parse_rows(&out)?;
        let total = rows.len();
        let records: Vec<ProcessRecord> = rows.iter().filter_map(parse_process_row).collect();
        debug!(
            "Remote process query returned {} rows, {} usable",
            total,
            records.len()
        );
        Ok(records)
    }

    /// Lists remote services. Not part of the aggregation pipeline.
    #[instrument(skip(self))]
    pub async fn list_services(&self) -> Result<Vec<ServiceRecord>, CollectionError> {
        let out = self.shell.run_powershell(SERVICE_QUERY).await?;
        Ok(parse_rows(&out)?
            .iter()
            .map(|row| ServiceRecord {
                name: text_field(row, "Name"),
                state: text_field(row, "State"),
                status: text_field(row, "Status"),
                path: text_field(row, "PathName"),
            })
            .collect())
    }
}

#[async_trait]
impl Collector for RemoteCollector {
    fn mode(&self) -> Mode {
        Mode::Winrm
    }

    async fn enumerate(&self) -> Result<Vec<ProcessRecord>, CollectionError> {
        self.list_processes().await
    }
}

/// Parses PowerShell JSON output into rows.
///
/// Empty output means no rows; a single object is treated as one row.
fn parse_rows(out: &str) -> Result<Vec<Value>, CollectionError> {
    let trimmed = out.trim().trim_start_matches('\u{feff}');
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Array(rows)) => Ok(rows),
        Ok(Value::Null) => Ok(Vec::new()),
        Ok(row @ Value::Object(_)) => Ok(vec![row]),
        Ok(other) => Err(CollectionError::Parse(format!(
            "unexpected JSON value: {}",
            other
        ))),
        Err(e) => Err(CollectionError::Parse(e.to_string())),
    }
}

fn parse_process_row(row: &Value) -> Option<ProcessRecord> {
    let pid = lenient_u64(row.get("ProcessId"))?;
    let kernel = lenient_u64(row.get("KernelModeTime"))?;
    let user = lenient_u64(row.get("UserModeTime"))?;
    let working_set = lenient_u64(row.get("WorkingSetSize"))?;
    let exe = text_field(row, "ExecutablePath");

    Some(ProcessRecord {
        pid: u32::try_from(pid).ok()?,
        name: text_field(row, "Name"),
        exe: if exe.is_empty() { None } else { Some(exe) },
        cpu: CpuSample::CumulativeTime(kernel.saturating_add(user)),
        memory_bytes: working_set,
    })
}

/// Absent, null or empty fields read as 0; unparsable values reject the row.
fn lenient_u64(value: Option<&Value>) -> Option<u64> {
    match value {
        None | Some(Value::Null) => Some(0),
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) if s.trim().is_empty() => Some(0),
        Some(Value::String(s)) => s.trim().parse().ok(),
        Some(_) => None,
    }
}

fn text_field(row: &Value, name: &str) -> String {
    row.get(name)
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Shell that replays canned output and records the scripts it ran.
    struct ScriptedShell {
        output: Result<String, String>,
        scripts: Mutex<Vec<String>>,
    }

    impl ScriptedShell {
        fn ok(output: &str) -> Arc<Self> {
            Arc::new(Self {
                output: Ok(output.to_string()),
                scripts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl RemoteShell for ScriptedShell {
        async fn run_powershell(&self, script: &str) -> Result<String, CollectionError> {
            self.scripts.lock().expect("lock").push(script.to_string());
            self.output.clone().map_err(|stderr| CollectionError::Remote {
                status: 1,
                stderr,
            })
        }
    }

    #[tokio::test]
    async fn test_list_processes_parses_rows() {
        let shell = ScriptedShell::ok(
            r#"[
                {"ProcessId":4,"Name":"System","ExecutablePath":null,"KernelModeTime":100,"UserModeTime":0,"WorkingSetSize":8192},
                {"ProcessId":812,"Name":"SRService.exe","ExecutablePath":"C:\\Program Files\\Splashtop\\SRService.exe","KernelModeTime":"150","UserModeTime":50,"WorkingSetSize":1048576},
                {"ProcessId":900,"Name":"bad.exe","KernelModeTime":"lots","UserModeTime":0,"WorkingSetSize":1}
            ]"#,
        );
        let collector = RemoteCollector::new(shell.clone());
        let records = collector.list_processes().await.expect("parse");

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].exe, None);
        assert_eq!(records[1].pid, 812);
        assert_eq!(records[1].cpu, CpuSample::CumulativeTime(200));
        assert_eq!(records[1].memory_bytes, 1048576);
        assert_eq!(
            records[1].exe.as_deref(),
            Some(r"C:\Program Files\Splashtop\SRService.exe")
        );

        let scripts = shell.scripts.lock().expect("lock");
        assert_eq!(scripts.len(), 1);
        assert!(scripts[0].contains("Win32_Process"));
    }

    #[tokio::test]
    async fn test_single_object_and_empty_output() {
        let single = ScriptedShell::ok(r#"{"ProcessId":1,"Name":"a","WorkingSetSize":5}"#);
        let records = RemoteCollector::new(single).enumerate().await.expect("parse");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].memory_bytes, 5);

        let empty = ScriptedShell::ok("  \r\n");
        assert!(RemoteCollector::new(empty).enumerate().await.expect("parse").is_empty());
    }

    #[tokio::test]
    async fn test_garbage_output_is_parse_error() {
        let shell = ScriptedShell::ok("Get-CimInstance : Access denied");
        let err = RemoteCollector::new(shell).enumerate().await.expect_err("should fail");
        assert!(matches!(err, CollectionError::Parse(_)));
    }

    #[tokio::test]
    async fn test_query_failure_is_surfaced() {
        let shell = Arc::new(ScriptedShell {
            output: Err("Access is denied".to_string()),
            scripts: Mutex::new(Vec::new()),
        });
        let err = RemoteCollector::new(shell).enumerate().await.expect_err("should fail");
        assert_eq!(err.to_string(), "WinRM error 1: Access is denied");
    }

    #[tokio::test]
    async fn test_list_services() {
        let shell = ScriptedShell::ok(
            r#"[{"Name":"SplashtopRemoteService","State":"Running","Status":"OK","PathName":"\"C:\\Program Files\\Splashtop\\SRService.exe\""}]"#,
        );
        let collector = RemoteCollector::new(shell.clone());
        let services = collector.list_services().await.expect("parse");
        assert_eq!(
            services,
            vec![ServiceRecord {
                name: "SplashtopRemoteService".to_string(),
                state: "Running".to_string(),
                status: "OK".to_string(),
                path: r#""C:\Program Files\Splashtop\SRService.exe""#.to_string(),
            }]
        );
        assert!(shell.scripts.lock().expect("lock")[0].contains("Win32_Service"));
    }
}
