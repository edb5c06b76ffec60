//! CLI arguments and subcommands for herakles-software-monitor.
//!
//! This module defines the command-line interface structure using the clap library,
//! including all flags, options, and subcommands. Every collection setting can also
//! be supplied through the environment variables of the container deployment.

use clap::builder::BoolishValueParser;
use clap::{Parser, Subcommand, ValueEnum};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::collectors::Mode;

/// Log level options for CLI parsing
#[derive(Debug, Clone, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Configuration format options for output
#[derive(Debug, Clone, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

/// Main CLI arguments structure
#[derive(Parser, Debug)]
#[command(
    name = "herakles-software-monitor",
    about = "Per-software process monitor for local or remote Windows hosts",
    long_about = "Per-software process monitor for local or remote Windows hosts.\n\n\
                  Classifies running processes into software groups (by install directory \
                  or process name), samples their process count, CPU and memory on a fixed \
                  interval, keeps a bounded persisted history and streams updates to a \
                  browser dashboard.",
    version,
    propagate_version = true
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// HTTP listen port
    #[arg(short = 'p', long)]
    pub port: Option<u16>,

    /// Bind to specific interface/IP
    #[arg(long)]
    pub bind: Option<IpAddr>,

    /// Log level
    #[arg(long, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Config file (YAML/JSON/TOML)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Disable all config file loading
    #[arg(long)]
    pub no_config: bool,

    /// Print effective merged config and exit
    #[arg(long)]
    pub show_config: bool,

    /// Output format for --show-config
    #[arg(long, value_enum, default_value = "yaml")]
    pub config_format: ConfigFormat,

    /// Validate config and exit (return code 1 on error)
    #[arg(long)]
    pub check_config: bool,

    /// Process source
    #[arg(long, value_enum, env = "MONITOR_MODE", ignore_case = true)]
    pub mode: Option<Mode>,

    /// Seconds between samples (minimum 1)
    #[arg(long, env = "SAMPLE_INTERVAL_SECONDS")]
    pub interval: Option<u64>,

    /// Install directories to match, separated by ';'
    #[arg(long, env = "TARGET_DIRS")]
    pub targets: Option<String>,

    /// TOML file replacing the built-in process name groups
    #[arg(long, env = "GROUPS_FILE")]
    pub groups_file: Option<PathBuf>,

    /// History file
    #[arg(long, env = "PERSIST_PATH")]
    pub persist_path: Option<PathBuf>,

    /// Minimum seconds between history writes
    #[arg(long, env = "PERSIST_INTERVAL_SECONDS")]
    pub persist_interval: Option<u64>,

    /// Keep history in memory only
    #[arg(long)]
    pub no_persist: bool,

    /// Points retained per software group
    #[arg(long, env = "HISTORY_CAPACITY")]
    pub capacity: Option<usize>,

    /// WinRM host
    #[arg(long, env = "WINRM_HOST")]
    pub winrm_host: Option<String>,

    /// WinRM port
    #[arg(long, env = "WINRM_PORT")]
    pub winrm_port: Option<u16>,

    /// WinRM user name
    #[arg(long, env = "WINRM_USERNAME")]
    pub winrm_username: Option<String>,

    /// WinRM password
    #[arg(long, env = "WINRM_PASSWORD", hide_env_values = true)]
    pub winrm_password: Option<String>,

    /// Use HTTPS for WinRM
    #[arg(long, env = "WINRM_USE_SSL", value_parser = BoolishValueParser::new())]
    pub winrm_use_ssl: Option<bool>,

    /// Timeout of a single WinRM request in seconds
    #[arg(long, env = "WINRM_TIMEOUT_SECONDS")]
    pub winrm_timeout: Option<u64>,
}

/// Subcommands for additional functionality
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate configuration files
    Config {
        /// Output file path ("-" for stdout)
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value = "yaml")]
        format: ConfigFormat,

        /// Include comments and examples
        #[arg(long)]
        commented: bool,
    },

    /// List software groups and install directory targets
    Groups {
        /// Show every keyword
        #[arg(long)]
        verbose: bool,

        /// Classify a process (name or executable path) and print the group
        #[arg(long)]
        classify: Option<String>,
    },
}
