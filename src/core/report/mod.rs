//! Summary statistics over the tracked library.
//!
//! The summary uses a cheaper duplicate heuristic than planning does:
//! files sharing byte size and metadata timestamp. It answers "how much
//! space could a dedup reclaim" without requiring fingerprints for every
//! file.

use crate::core::store::Store;
use crate::error::MediaDedupError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SummaryReport {
    /// All tracked files, across every container
    pub total_files: u64,
    /// Groups of files sharing (size, metadata timestamp)
    pub duplicate_groups: u64,
    /// Files belonging to any duplicate group
    pub duplicate_files: u64,
    /// Bytes the library would occupy with one copy per group
    pub unique_bytes: u64,
    /// Bytes occupied by the redundant copies
    pub wasted_bytes: u64,
}

pub fn summarize(store: &Store) -> Result<SummaryReport, MediaDedupError> {
    let mut report = SummaryReport {
        total_files: store.total_file_count()?,
        ..SummaryReport::default()
    };
    for group in store.timestamp_duplicate_groups()? {
        report.duplicate_groups += 1;
        report.duplicate_files += group.count;
        report.unique_bytes += group.size;
        report.wasted_bytes += group.size * (group.count - 1);
    }
    Ok(report)
}
