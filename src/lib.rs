//! Herakles Software Monitor Library
//!
//! Observes running processes, either on this host through `/proc` or on a
//! remote Windows host over WinRM, classifies them into software groups and
//! keeps a bounded, persisted per-group history of process count, CPU and
//! memory.
//!
//! # Pipeline
//!
//! ```text
//! Sampler ── Collector::enumerate ── Matcher::classify ── aggregate ── TimeSeriesStore
//!                                                                            │
//!                                                    ChangeFeed::poll ◄──────┘
//! ```
//!
//! # Usage
//!
//! ```rust
//! use herakles_software_monitor::process::Matcher;
//!
//! let matcher = Matcher::with_builtin_groups(vec![r"C:\Program Files\Splashtop".to_string()]);
//! let hit = matcher
//!     .classify("app.exe", Some(r"C:\Program Files\Splashtop\Remote\bin\app.exe"))
//!     .expect("path match");
//! assert_eq!(hit.key, r"c:\program files\splashtop|remote");
//! assert_eq!(hit.display_name, "remote");
//! ```

pub mod aggregator;
pub mod cli;
pub mod collectors;
pub mod commands;
pub mod config;
pub mod feed;
pub mod handlers;
pub mod metrics;
pub mod process;
pub mod ringbuffer;
pub mod sampler;
pub mod state;
pub mod store;

// Re-export main types for convenience
pub use aggregator::{aggregate, GroupTotals};
pub use feed::ChangeFeed;
pub use ringbuffer::MetricsPoint;
pub use sampler::{Sampler, SamplerStatus};
pub use store::{PersistOutcome, Snapshot, TimeSeriesStore};
