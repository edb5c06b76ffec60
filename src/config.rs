//! Configuration management for herakles-software-monitor.
//!
//! This module handles loading, merging, and validating configuration from files
//! and CLI arguments. It supports YAML, JSON, and TOML formats. Precedence is
//! CLI/environment > config file > defaults.

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::cli::{Args, ConfigFormat};
use crate::collectors::winrm::{DEFAULT_WINRM_HOST, DEFAULT_WINRM_PORT, DEFAULT_WINRM_TIMEOUT_SECS};
use crate::collectors::{Mode, RemoteSettings};
use crate::process::{
    default_targets, load_name_groups_from_file, parse_targets, Matcher, BUILTIN_NAME_GROUPS,
};

// Default configuration constants
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_MODE: Mode = Mode::Winrm;
pub const DEFAULT_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_CAPACITY: usize = 7200;
pub const DEFAULT_PERSIST_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_PERSIST_PATH: &str = "/app_data/metrics.json";

/// Placeholder printed instead of the WinRM password.
const REDACTED: &str = "<redacted>";

/// Configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Server configuration
    pub port: Option<u16>,
    pub bind: Option<String>,

    // Logging
    pub log_level: Option<String>,

    // Sampling
    pub mode: Option<Mode>,
    #[serde(alias = "sample-interval-seconds")]
    pub sample_interval_seconds: Option<u64>,
    /// Install directories, matched in order
    pub targets: Option<Vec<String>>,
    /// TOML file replacing the built-in keyword groups
    #[serde(alias = "groups-file")]
    pub groups_file: Option<PathBuf>,

    // History
    #[serde(alias = "history-capacity")]
    pub history_capacity: Option<usize>,
    #[serde(alias = "persist-path")]
    pub persist_path: Option<PathBuf>,
    #[serde(alias = "persist-interval-seconds")]
    pub persist_interval_seconds: Option<u64>,
    #[serde(alias = "enable-persistence")]
    pub enable_persistence: Option<bool>,

    // WinRM
    #[serde(alias = "winrm-host")]
    pub winrm_host: Option<String>,
    #[serde(alias = "winrm-port")]
    pub winrm_port: Option<u16>,
    #[serde(alias = "winrm-username")]
    pub winrm_username: Option<String>,
    #[serde(alias = "winrm-password")]
    pub winrm_password: Option<String>,
    #[serde(alias = "winrm-use-ssl")]
    pub winrm_use_ssl: Option<bool>,
    #[serde(alias = "winrm-timeout-secs")]
    pub winrm_timeout_secs: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: Some(DEFAULT_PORT),
            bind: Some(DEFAULT_BIND_ADDR.to_string()),
            log_level: Some("info".into()),
            mode: Some(DEFAULT_MODE),
            sample_interval_seconds: Some(DEFAULT_INTERVAL_SECS),
            targets: Some(default_targets()),
            groups_file: None,
            history_capacity: Some(DEFAULT_CAPACITY),
            persist_path: Some(PathBuf::from(DEFAULT_PERSIST_PATH)),
            persist_interval_seconds: Some(DEFAULT_PERSIST_INTERVAL_SECS),
            enable_persistence: Some(true),
            winrm_host: Some(DEFAULT_WINRM_HOST.to_string()),
            winrm_port: Some(DEFAULT_WINRM_PORT),
            winrm_username: None,
            winrm_password: None,
            winrm_use_ssl: Some(false),
            winrm_timeout_secs: Some(DEFAULT_WINRM_TIMEOUT_SECS),
        }
    }
}

impl Config {
    pub fn mode(&self) -> Mode {
        self.mode.unwrap_or(DEFAULT_MODE)
    }

    /// Sampling interval, at least one second.
    pub fn sample_interval(&self) -> Duration {
        Duration::from_secs(
            self.sample_interval_seconds
                .unwrap_or(DEFAULT_INTERVAL_SECS)
                .max(1),
        )
    }

    pub fn targets(&self) -> Vec<String> {
        match &self.targets {
            Some(t) if t.iter().any(|s| !s.trim().is_empty()) => t
                .iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            _ => default_targets(),
        }
    }

    pub fn history_capacity(&self) -> usize {
        self.history_capacity.unwrap_or(DEFAULT_CAPACITY)
    }

    /// History file, or `None` when persistence is disabled.
    pub fn persist_path(&self) -> Option<PathBuf> {
        if !self.enable_persistence.unwrap_or(true) {
            return None;
        }
        Some(
            self.persist_path
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_PERSIST_PATH)),
        )
    }

    pub fn persist_interval(&self) -> Duration {
        Duration::from_secs(
            self.persist_interval_seconds
                .unwrap_or(DEFAULT_PERSIST_INTERVAL_SECS),
        )
    }

    /// Remote settings from configuration; credentials may be empty.
    pub fn remote_settings(&self) -> RemoteSettings {
        RemoteSettings {
            host: self
                .winrm_host
                .clone()
                .unwrap_or_else(|| DEFAULT_WINRM_HOST.to_string()),
            port: self.winrm_port.unwrap_or(DEFAULT_WINRM_PORT),
            username: self.winrm_username.clone().unwrap_or_default(),
            password: self.winrm_password.clone().unwrap_or_default(),
            use_ssl: self.winrm_use_ssl.unwrap_or(false),
            timeout_secs: self.winrm_timeout_secs.unwrap_or(DEFAULT_WINRM_TIMEOUT_SECS),
        }
    }

    /// Builds the classifier from targets and the effective keyword groups.
    pub fn build_matcher(&self) -> anyhow::Result<Matcher> {
        let groups = match &self.groups_file {
            Some(path) => load_name_groups_from_file(path)?,
            None => BUILTIN_NAME_GROUPS.clone(),
        };
        Ok(Matcher::new(self.targets(), groups))
    }

    /// Copy safe to print.
    pub fn redacted(&self) -> Config {
        let mut copy = self.clone();
        if copy.winrm_password.is_some() {
            copy.winrm_password = Some(REDACTED.to_string());
        }
        copy
    }
}

/// Validate effective config (used by --check-config and at startup)
pub fn validate_effective_config(cfg: &Config) -> anyhow::Result<()> {
    if let Some(bind) = cfg.bind.as_deref() {
        bind.parse::<IpAddr>()
            .with_context(|| format!("Invalid bind address '{}'", bind))?;
    }

    if cfg.port == Some(0) {
        bail!("port must be between 1 and 65535");
    }

    if cfg.history_capacity == Some(0) {
        bail!("history_capacity must be at least 1");
    }

    if cfg.sample_interval_seconds == Some(0) {
        bail!("sample_interval_seconds must be at least 1");
    }

    if cfg.winrm_port == Some(0) {
        bail!("winrm_port must be between 1 and 65535");
    }

    if cfg.winrm_timeout_secs == Some(0) {
        bail!("winrm_timeout_secs must be at least 1");
    }

    if cfg.mode() == Mode::Winrm
        && cfg.winrm_host.as_deref().is_some_and(|h| h.trim().is_empty())
    {
        bail!("winrm_host is empty but mode is winrm");
    }

    let has_user = cfg.winrm_username.as_deref().is_some_and(|u| !u.trim().is_empty());
    let has_pass = cfg.winrm_password.as_deref().is_some_and(|p| !p.is_empty());
    if has_user != has_pass {
        bail!("winrm_username and winrm_password must be set together");
    }

    if let Some(path) = &cfg.groups_file {
        let groups = load_name_groups_from_file(path)?;
        if groups.is_empty() {
            bail!("groups file {} defines no groups", path.display());
        }
    }

    if let Some(path) = &cfg.persist_path {
        if path.as_os_str().is_empty() {
            bail!("persist_path is empty");
        }
    }

    Ok(())
}

/// Resolves configuration from CLI args, config file, and defaults.
/// This enforces precedence: CLI (if provided) > config file > default.
pub fn resolve_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = if args.no_config {
        Config::default()
    } else {
        load_config(args.config.as_deref())?
    };

    // Override with CLI args
    if let Some(bind_ip) = args.bind {
        config.bind = Some(bind_ip.to_string());
    }
    if let Some(cli_port) = args.port {
        config.port = Some(cli_port);
    }

    if let Some(mode) = args.mode {
        config.mode = Some(mode);
    }
    if let Some(interval) = args.interval {
        config.sample_interval_seconds = Some(interval);
    }
    if let Some(raw) = &args.targets {
        config.targets = Some(parse_targets(raw));
    }
    if let Some(path) = &args.groups_file {
        config.groups_file = Some(path.clone());
    }

    if let Some(capacity) = args.capacity {
        config.history_capacity = Some(capacity);
    }
    if let Some(path) = &args.persist_path {
        config.persist_path = Some(path.clone());
    }
    if let Some(secs) = args.persist_interval {
        config.persist_interval_seconds = Some(secs);
    }
    if args.no_persist {
        config.enable_persistence = Some(false);
    }

    if let Some(host) = &args.winrm_host {
        config.winrm_host = Some(host.clone());
    }
    if let Some(port) = args.winrm_port {
        config.winrm_port = Some(port);
    }
    if let Some(user) = &args.winrm_username {
        config.winrm_username = Some(user.clone());
    }
    if let Some(pass) = &args.winrm_password {
        config.winrm_password = Some(pass.clone());
    }
    if let Some(ssl) = args.winrm_use_ssl {
        config.winrm_use_ssl = Some(ssl);
    }
    if let Some(secs) = args.winrm_timeout {
        config.winrm_timeout_secs = Some(secs);
    }

    Ok(config)
}

/// Configuration loading with multiple format support
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            // Try default locations
            let defaults = [
                "/etc/herakles/software-monitor.yaml",
                "/etc/herakles/software-monitor.yml",
                "/etc/herakles/software-monitor.json",
                "./herakles-software-monitor.yaml",
                "./herakles-software-monitor.yml",
                "./herakles-software-monitor.json",
            ];
            match defaults.iter().map(Path::new).find(|p| p.exists()) {
                Some(p) => p.to_path_buf(),
                None => return Ok(Config::default()),
            }
        }
    };

    if !path.exists() {
        return Ok(Config::default());
    }

    let content = fs::read_to_string(&path)
        .with_context(|| format!("cannot read config file {}", path.display()))?;

    let config: Config = match path.extension().and_then(|s| s.to_str()) {
        Some("json") => serde_json::from_str(&content)
            .with_context(|| format!("invalid JSON config {}", path.display()))?,
        Some("toml") => toml::from_str(&content)
            .with_context(|| format!("invalid TOML config {}", path.display()))?,
        // Default to YAML
        _ => serde_yaml::from_str(&content)
            .with_context(|| format!("invalid YAML config {}", path.display()))?,
    };
    info!("Loaded configuration from: {}", path.display());
    Ok(config)
}

/// Renders configuration in the requested format with the password redacted.
pub fn render_config(config: &Config, format: &ConfigFormat) -> anyhow::Result<String> {
    let config = config.redacted();
    Ok(match format {
        ConfigFormat::Json => serde_json::to_string_pretty(&config)?,
        ConfigFormat::Toml => toml::to_string_pretty(&config)?,
        ConfigFormat::Yaml => serde_yaml::to_string(&config)?,
    })
}

/// Shows configuration in requested format
pub fn show_config(config: &Config, format: ConfigFormat) -> anyhow::Result<()> {
    println!("{}", render_config(config, &format)?);
    Ok(())
}
