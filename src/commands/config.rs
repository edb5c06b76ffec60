//! Config command implementation.
//!
//! Generates configuration files in various formats.

use std::fs;
use std::path::PathBuf;

use crate::cli::ConfigFormat;
use crate::config::{render_config, Config};

/// Generates configuration files.
pub fn command_config(
    output: Option<PathBuf>,
    format: ConfigFormat,
    commented: bool,
) -> anyhow::Result<()> {
    let config = Config::default();
    let output = output.unwrap_or_else(|| PathBuf::from("herakles-software-monitor.yaml"));

    let mut content = render_config(&config, &format)?;
    if commented && matches!(format, ConfigFormat::Yaml) {
        content = add_config_comments(content);
    }

    if output.to_string_lossy() == "-" {
        print!("{}", content);
    } else {
        fs::write(&output, content)?;
        println!("✅ Configuration written to: {}", output.display());
    }

    Ok(())
}

/// Adds comments to YAML configuration.
fn add_config_comments(yaml: String) -> String {
    let comments = r#"# Herakles Software Monitor Configuration
# =======================================
#
# Server Configuration
# --------------------
# bind: "0.0.0.0"                  # Bind IP (0.0.0.0 = all interfaces)
# port: 8000                       # HTTP port (dashboard, API, /metrics)
#
# Sampling
# --------
# mode: winrm                      # local (/proc) or winrm (remote Windows host)
# sample_interval_seconds: 5       # Seconds between samples (minimum 1)
# targets:                         # Install directories, first prefix match wins
#   - 'C:\Program Files\Splashtop'
# groups_file: null                # TOML file replacing the built-in name groups
#
# History
# -------
# history_capacity: 7200           # Points kept per software group
# persist_path: /app_data/metrics.json
# persist_interval_seconds: 10     # Minimum seconds between history writes
# enable_persistence: true
#
# WinRM (Basic auth)
# ------------------
# winrm_host: host.docker.internal
# winrm_port: 5985                 # 5986 for HTTPS
# winrm_username: null             # Credentials can also be posted to /api/winrm
# winrm_password: null
# winrm_use_ssl: false
# winrm_timeout_secs: 60           # Timeout of a single WinRM request
"#;

    format!("{comments}\n{yaml}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_generated_config_loads_back() {
        let dir = tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("monitor.yaml");
        command_config(Some(path.clone()), ConfigFormat::Yaml, true).expect("generate");

        let loaded = crate::config::load_config(Some(&path)).expect("load");
        assert_eq!(loaded.port, Config::default().port);
        assert_eq!(loaded.history_capacity, Config::default().history_capacity);
    }
}
