//! Per-cycle reduction of classified processes into software group totals.

use std::collections::HashMap;
use tracing::debug;

use crate::collectors::{CpuSample, ProcessRecord};
use crate::process::Matcher;

/// Aggregated metrics for one software group in one cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupTotals {
    pub display_name: String,
    pub process_count: u64,
    pub cpu_percent: f64,
    pub memory_bytes: u64,
}

/// Sums count, CPU and memory per matched group.
///
/// Unmatched records are ignored. Cumulative CPU times contribute nothing;
/// only instantaneous percentages are added.
pub fn aggregate(records: &[ProcessRecord], matcher: &Matcher) -> HashMap<String, GroupTotals> {
    let mut groups: HashMap<String, GroupTotals> = HashMap::new();
    let mut unmatched = 0usize;

    for record in records {
        let Some(group) = matcher.classify_record(record) else {
            unmatched += 1;
            continue;
        };

        let totals = groups.entry(group.key).or_insert_with(|| GroupTotals {
            display_name: group.display_name,
            ..GroupTotals::default()
        });
        totals.process_count += 1;
        totals.memory_bytes = totals.memory_bytes.saturating_add(record.memory_bytes);
        if let CpuSample::Percent(pct) = record.cpu {
            totals.cpu_percent += pct;
        }
    }

    debug!(
        "Aggregated {} records into {} groups ({} unmatched)",
        records.len(),
        groups.len(),
        unmatched
    );
    groups
}
