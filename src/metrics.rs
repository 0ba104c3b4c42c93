//! Mapping of collected durations onto Graphite metric points.

use crate::types::{BranchLifeTime, MergeUntilRelease};
use serde::Serialize;
use std::fmt;

const BRANCH_LIFE_TIME_PREFIX: &str = "leadtime.branchlifetime.";
const MERGE_UNTIL_RELEASE_PREFIX: &str = "leadtime.mergeuntilrelease.";

/// A single value for the metrics sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricPoint {
    pub stat: String,
    pub value: i64,
    pub timestamp_sec: i64,
}

impl fmt::Display for MetricPoint {
    /// Graphite plaintext line, without the trailing newline.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.stat, self.value, self.timestamp_sec)
    }
}

/// One point per branch life time, in the same order.
pub fn build(branch_life_times: &[BranchLifeTime]) -> Vec<MetricPoint> {
    branch_life_times
        .iter()
        .map(|blt| MetricPoint {
            stat: stat_name(BRANCH_LIFE_TIME_PREFIX, &blt.repository),
            value: blt.duration_sec,
            // Graphite wants whole seconds; `timestamp` floors the millisecond instant.
            timestamp_sec: blt.merged_at.timestamp(),
        })
        .collect()
}

pub fn build_merge_until_release(times: &[MergeUntilRelease]) -> Vec<MetricPoint> {
    times
        .iter()
        .map(|t| MetricPoint {
            stat: stat_name(MERGE_UNTIL_RELEASE_PREFIX, &t.repository),
            value: t.until_release_min,
            timestamp_sec: t.merged_at.timestamp(),
        })
        .collect()
}

/// Graphite uses dots as path separators, so "owner/name" becomes "owner-name".
fn stat_name(prefix: &str, repository: &str) -> String {
    format!("{}{}", prefix, repository.replace('/', "-"))
}
