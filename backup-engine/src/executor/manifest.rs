//! Record types persisted between runs.
//!
//! `BackupRun` is serialized as `.backup_manifest.json` at the destination
//! root; the `DigestTable` is serialized as `.backup_hashes.json` and is the
//! baseline the next run diffs against.

use crate::sync::digest::{DigestAlgorithm, FileDigests};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// File name of the run summary at the destination root
pub const MANIFEST_FILE: &str = ".backup_manifest.json";

/// File name of the digest table at the destination root
pub const DIGEST_TABLE_FILE: &str = ".backup_hashes.json";

/// Digest record for a single file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    #[serde(rename = "path")]
    pub relative_path: String,
    pub size: u64,
    #[serde(rename = "mtime")]
    pub modified_time: f64,
    #[serde(rename = "md5")]
    pub digest_fast: String,
    #[serde(rename = "sha256")]
    pub digest_strong: String,
}

impl FileRecord {
    pub fn new(relative_path: String, size: u64, modified_time: f64, digests: FileDigests) -> Self {
        Self {
            relative_path,
            size,
            modified_time,
            digest_fast: digests.md5,
            digest_strong: digests.sha256,
        }
    }

    /// The digest selected by `algorithm`
    pub fn digest(&self, algorithm: DigestAlgorithm) -> &str {
        match algorithm {
            DigestAlgorithm::Md5 => &self.digest_fast,
            DigestAlgorithm::Sha256 => &self.digest_strong,
        }
    }
}

/// Relative path → record. Ordered so the persisted file is stable.
pub type DigestTable = BTreeMap<String, FileRecord>;

/// Summary of one invocation, serialized as `.backup_manifest.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupRun {
    #[serde(rename = "backup_id")]
    pub run_id: String,
    pub timestamp: String,
    #[serde(rename = "source_path")]
    pub source_root: String,
    #[serde(rename = "dest_path")]
    pub dest_root: String,
    #[serde(rename = "files_backed_up")]
    pub files_copied: usize,
    pub files_skipped: usize,
    pub files_removed: usize,
    pub bytes_transferred: u64,
    #[serde(rename = "total_size")]
    pub total_bytes_scanned: u64,
    pub errors: Vec<String>,
}

impl BackupRun {
    /// Start a new run record with a fresh identifier
    pub fn new(source_root: &Path, dest_root: &Path) -> Self {
        let now = chrono::Local::now();
        Self {
            run_id: generate_run_id(&now),
            timestamp: now.format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
            source_root: source_root.display().to_string(),
            dest_root: dest_root.display().to_string(),
            files_copied: 0,
            files_skipped: 0,
            files_removed: 0,
            bytes_transferred: 0,
            total_bytes_scanned: 0,
            errors: Vec::new(),
        }
    }

    pub fn record_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// `backup_<YYYYmmdd_HHMMSS>_<8 hex chars>`
fn generate_run_id(now: &chrono::DateTime<chrono::Local>) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("backup_{}_{}", now.format("%Y%m%d_%H%M%S"), &suffix[..8])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn record() -> FileRecord {
        FileRecord::new(
            "sub/b.txt".to_string(),
            5000,
            1_700_000_000.5,
            FileDigests {
                md5: "m".to_string(),
                sha256: "s".to_string(),
            },
        )
    }

    #[test]
    fn test_file_record_wire_names() {
        let value = serde_json::to_value(record()).unwrap();
        assert_eq!(value["path"], "sub/b.txt");
        assert_eq!(value["size"], 5000);
        assert_eq!(value["mtime"], 1_700_000_000.5);
        assert_eq!(value["md5"], "m");
        assert_eq!(value["sha256"], "s");
    }

    #[test]
    fn test_record_digest_selection() {
        let r = record();
        assert_eq!(r.digest(DigestAlgorithm::Md5), "m");
        assert_eq!(r.digest(DigestAlgorithm::Sha256), "s");
    }

    #[test]
    fn test_manifest_wire_names() {
        let mut run = BackupRun::new(&PathBuf::from("/src"), &PathBuf::from("/dst"));
        run.files_copied = 2;
        run.total_bytes_scanned = 5010;
        run.record_error("Cannot hash x: denied");

        let value = serde_json::to_value(&run).unwrap();
        for key in [
            "backup_id",
            "timestamp",
            "source_path",
            "dest_path",
            "files_backed_up",
            "files_skipped",
            "files_removed",
            "bytes_transferred",
            "total_size",
            "errors",
        ] {
            assert!(value.get(key).is_some(), "missing key {key}");
        }
        assert_eq!(value["files_backed_up"], 2);
        assert_eq!(value["total_size"], 5010);
        assert_eq!(value["errors"][0], "Cannot hash x: denied");
    }

    #[test]
    fn test_run_id_format() {
        let run = BackupRun::new(&PathBuf::from("/a"), &PathBuf::from("/b"));
        let parts: Vec<&str> = run.run_id.split('_').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], "backup");
        assert_eq!(parts[1].len(), 8);
        assert_eq!(parts[2].len(), 6);
        assert_eq!(parts[3].len(), 8);
        assert!(parts[3].chars().all(|c| c.is_ascii_hexdigit()));

        let other = BackupRun::new(&PathBuf::from("/a"), &PathBuf::from("/b"));
        assert_ne!(run.run_id, other.run_id);
    }
}
