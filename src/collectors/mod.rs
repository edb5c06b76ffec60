//! Collectors module for process enumeration sources.
//!
//! This module defines the `Collector` abstraction and its two sources:
//! - `local`: processes of this host, read from /proc
//! - `remote`: processes and services of a Windows host, queried over WinRM
//!
//! `winrm` holds the WS-Management transport used by the remote collector.

pub mod local;
pub mod remote;
pub mod winrm;

use async_trait::async_trait;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

pub use local::LocalCollector;
pub use remote::{RemoteCollector, ServiceRecord};
pub use winrm::{AuthScheme, RemoteSettings, RemoteShell, SessionError, WinRmSession};

/// Where processes are enumerated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Local,
    Winrm,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Local => write!(f, "local"),
            Mode::Winrm => write!(f, "winrm"),
        }
    }
}

/// CPU information as reported by the source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CpuSample {
    /// Instantaneous usage in percent of one core (local).
    Percent(f64),
    /// Cumulative kernel+user time in 100ns units (remote).
    CumulativeTime(u64),
}

/// One process observed during a collection pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessRecord {
    pub pid: u32,
    pub name: String,
    pub exe: Option<String>,
    pub cpu: CpuSample,
    /// Resident set (local) or working set (remote) size in bytes.
    pub memory_bytes: u64,
}

/// Failure of a whole collection pass.
#[derive(Debug, Error)]
pub enum CollectionError {
    #[error("cannot enumerate processes under {path}: {source}")]
    ProcUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("WinRM not configured")]
    NotConfigured,

    #[error("WinRM error {status}: {stderr}")]
    Remote { status: i64, stderr: String },

    #[error("WinRM transport error: {0}")]
    Transport(String),

    #[error("failed to parse remote response: {0}")]
    Parse(String),
}

/// A source of process records.
#[async_trait]
pub trait Collector: Send + Sync {
    /// Mode this collector serves.
    fn mode(&self) -> Mode;

    /// Establishes measurement baselines before the first real pass.
    fn prime(&self) {}

    /// Lists processes; per-process failures are skipped, not returned.
    async fn enumerate(&self) -> Result<Vec<ProcessRecord>, CollectionError>;
}
