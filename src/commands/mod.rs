//! CLI command implementations for herakles-software-monitor.
//!
//! This module provides implementations for all CLI subcommands:
//! - `config`: Configuration file generation
//! - `groups`: Software group listing and ad-hoc classification

pub mod config;
pub mod groups;

// Re-export command functions
pub use config::command_config;
pub use groups::command_groups;
