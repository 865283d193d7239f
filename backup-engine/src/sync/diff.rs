//! Change detection against the previous run's digest table.
//!
//! Checks run cheapest first and stop at the first difference:
//! presence, size, modification time (1 ms tolerance), then the configured
//! content digest as the tie-break.

use crate::executor::manifest::{DigestTable, FileRecord};
use crate::sync::digest::DigestAlgorithm;
use std::collections::BTreeSet;

/// Maximum mtime drift treated as "unchanged" (filesystem timestamp rounding)
pub const MTIME_TOLERANCE_SECS: f64 = 0.001;

/// Decide whether `current` must be copied again.
pub fn needs_backup(
    current: &FileRecord,
    previous: &DigestTable,
    algorithm: DigestAlgorithm,
) -> bool {
    let Some(prev) = previous.get(&current.relative_path) else {
        return true;
    };

    if prev.size != current.size {
        return true;
    }

    if (prev.modified_time - current.modified_time).abs() > MTIME_TOLERANCE_SECS {
        return true;
    }

    prev.digest(algorithm) != current.digest(algorithm)
}

/// Result of diffing digested files against the previous table
#[derive(Debug, Default)]
pub struct DiffResult {
    /// Files to copy (new or modified)
    pub changed: Vec<FileRecord>,
    /// Files identical to the previous run
    pub unchanged: Vec<FileRecord>,
}

/// Partition the digested records into changed and unchanged sets.
pub fn diff_against_table(
    records: Vec<FileRecord>,
    previous: &DigestTable,
    algorithm: DigestAlgorithm,
) -> DiffResult {
    let mut result = DiffResult::default();

    for record in records {
        if needs_backup(&record, previous, algorithm) {
            result.changed.push(record);
        } else {
            result.unchanged.push(record);
        }
    }

    result
}

/// Paths recorded previously that are absent from the current scan.
pub fn vanished_paths<'a>(previous: &'a DigestTable, current: &BTreeSet<String>) -> Vec<&'a str> {
    previous
        .keys()
        .filter(|path| !current.contains(*path))
        .map(String::as_str)
        .collect()
}
