//! Process-related modules for /proc scanning, CPU accounting and classification.
//!
//! This module provides:
//! - `scanner`: Process discovery and per-process reads from /proc
//! - `cpu`: CPU time parsing and delta-based percent calculation
//! - `classifier`: Software group classification (`Matcher`)

pub mod classifier;
pub mod cpu;
pub mod scanner;

// Re-export commonly used types
pub use classifier::{
    default_targets, load_name_groups_from_file, parse_targets, GroupMatch, Matcher, NameGroup,
    BUILTIN_NAME_GROUPS,
};
pub use cpu::{cpu_percent_for_pid, retain_pids, CpuCache, CLK_TCK};
pub use scanner::{collect_proc_entries, read_exe_path, read_process_name, read_rss_bytes};
