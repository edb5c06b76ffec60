//! Process scanning utilities for discovering and reading process entries from /proc.
//!
//! This module provides functions to scan the /proc filesystem for process entries
//! and read per-process identity and memory data.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Process entry representing a directory in /proc filesystem.
#[derive(Debug, Clone)]
pub struct ProcEntry {
    pub pid: u32,
    pub proc_path: PathBuf,
}

/// Scans the /proc root for process entries with numeric PIDs.
///
/// Fails only when the root itself cannot be listed.
pub fn collect_proc_entries(root: &Path) -> io::Result<Vec<ProcEntry>> {
    let mut out = Vec::new();
    for entry in fs::read_dir(root)?.flatten() {
        let p = entry.path();
        let name = match p.file_name().and_then(|s| s.to_str()) {
            Some(v) => v,
            None => continue,
        };
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        let pid: u32 = match name.parse() {
            Ok(v) => v,
            Err(_) => continue,
        };
        out.push(ProcEntry { pid, proc_path: p });
    }
    Ok(out)
}

/// Reads process name from comm file or extracts from cmdline.
pub fn read_process_name(proc_path: &Path) -> Option<String> {
    let comm = proc_path.join("comm");
    if let Ok(s) = fs::read_to_string(&comm) {
        let t = s.trim();
        if !t.is_empty() {
            return Some(t.into());
        }
    }

    let cmd = proc_path.join("cmdline");
    if let Ok(content) = fs::read(&cmd) {
        if !content.is_empty() {
            let parts: Vec<&str> = content
                .split(|&b| b == 0u8)
                .filter_map(|s| std::str::from_utf8(s).ok())
                .collect();
            if !parts.is_empty() {
                if let Some(name) = Path::new(parts[0]).file_name() {
                    return name.to_str().map(|s| s.to_string());
                }
            }
        }
    }
    None
}

/// Resolves the executable path from the `exe` link.
///
/// Kernel threads and processes owned by other users typically have no
/// readable link; those yield `None`.
pub fn read_exe_path(proc_path: &Path) -> Option<String> {
    let target = fs::read_link(proc_path.join("exe")).ok()?;
    let s = target.to_string_lossy();
    // Deleted binaries are reported with a " (deleted)" suffix.
    let s = s.strip_suffix(" (deleted)").unwrap_or(&s);
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

/// Reads resident set size in bytes from /proc/<pid>/status (VmRSS).
pub fn read_rss_bytes(proc_path: &Path) -> io::Result<u64> {
    let content = fs::read_to_string(proc_path.join("status"))?;
    for line in content.lines() {
        if let Some(value) = line.strip_prefix("VmRSS:") {
            let kb: u64 = value
                .split_whitespace()
                .next()
                .and_then(|v| v.parse().ok())
                .ok_or_else(|| io::Error::other("Invalid VmRSS line"))?;
            return Ok(kb * 1024);
        }
    }
    // Kernel threads have no VmRSS line.
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_collect_proc_entries_numeric_only() {
        let dir = tempdir().expect("Failed to create temp dir");
        for name in ["1", "42", "self", "sys", "7a"] {
            fs::create_dir(dir.path().join(name)).expect("Failed to create dir");
        }

        let mut pids: Vec<u32> = collect_proc_entries(dir.path())
            .expect("root readable")
            .into_iter()
            .map(|e| e.pid)
            .collect();
        pids.sort_unstable();
        assert_eq!(pids, vec![1, 42]);
    }

    #[test]
    fn test_collect_proc_entries_missing_root() {
        let dir = tempdir().expect("Failed to create temp dir");
        assert!(collect_proc_entries(&dir.path().join("nope")).is_err());
    }

    #[test]
    fn test_read_process_name_prefers_comm() {
        let dir = tempdir().expect("Failed to create temp dir");
        fs::write(dir.path().join("comm"), "SRService\n").expect("write comm");
        fs::write(dir.path().join("cmdline"), b"/opt/other/bin\0--flag\0").expect("write cmdline");
        assert_eq!(read_process_name(dir.path()).as_deref(), Some("SRService"));
    }

    #[test]
    fn test_read_process_name_falls_back_to_cmdline() {
        let dir = tempdir().expect("Failed to create temp dir");
        fs::write(dir.path().join("cmdline"), b"/opt/splashtop/streamer\0-d\0").expect("write cmdline");
        assert_eq!(read_process_name(dir.path()).as_deref(), Some("streamer"));
    }

    #[test]
    fn test_read_rss_bytes() {
        let dir = tempdir().expect("Failed to create temp dir");
        fs::write(
            dir.path().join("status"),
            "Name:\tapp\nVmPeak:\t  9000 kB\nVmRSS:\t  2048 kB\n",
        )
        .expect("write status");
        assert_eq!(read_rss_bytes(dir.path()).expect("parse"), 2048 * 1024);
    }

    #[test]
    fn test_read_rss_bytes_kernel_thread() {
        let dir = tempdir().expect("Failed to create temp dir");
        fs::write(dir.path().join("status"), "Name:\tkthreadd\n").expect("write status");
        assert_eq!(read_rss_bytes(dir.path()).expect("parse"), 0);
    }
}
