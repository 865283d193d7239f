//! Standalone integrity verification of a backup destination.
//!
//! Reads the digest table stored next to a manifest and re-digests every
//! recorded artifact. Compressed artifacts are decompressed first so their
//! digests are comparable with the source digests. Nothing is written.

use crate::executor::manifest::{DigestTable, FileRecord, DIGEST_TABLE_FILE};
use crate::executor::pool::TaskRunner;
use crate::state::store::read_digest_table;
use crate::sync::digest::{digest_file, digest_gzip_file};
use crate::transfer::copier::{artifact_path, compressed_alias};
use crate::utils::{BackupError, Result};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Outcome of verifying every recorded artifact
#[derive(Debug, Default, Clone, PartialEq)]
pub struct VerifyReport {
    /// Number of records checked
    pub checked: usize,
    /// Recorded paths with no artifact at the destination
    pub missing: Vec<String>,
    /// Recorded paths whose artifact content no longer matches
    pub mismatched: Vec<String>,
}

impl VerifyReport {
    pub fn passed(&self) -> bool {
        self.missing.is_empty() && self.mismatched.is_empty()
    }

    /// Human-readable problem list, missing files first
    pub fn problems(&self) -> Vec<String> {
        self.missing
            .iter()
            .map(|p| format!("Missing: {}", p))
            .chain(self.mismatched.iter().map(|p| format!("Corrupted: {}", p)))
            .collect()
    }
}

enum EntryStatus {
    Valid,
    Missing(String),
    Mismatched(String),
}

/// Verify the backup whose manifest lives at `manifest_path`.
///
/// Fails outright when the manifest or its digest table is absent.
pub async fn verify(manifest_path: &Path, runner: &TaskRunner) -> Result<VerifyReport> {
    if !manifest_path.is_file() {
        return Err(BackupError::ManifestNotFound(manifest_path.to_path_buf()));
    }

    let backup_dir = manifest_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let table_path = backup_dir.join(DIGEST_TABLE_FILE);
    if !table_path.is_file() {
        return Err(BackupError::DigestTableNotFound(table_path));
    }

    let table: DigestTable = read_digest_table(&table_path)?;
    info!("Verifying {} recorded files in {}", table.len(), backup_dir.display());

    let recorded: Arc<BTreeSet<String>> = Arc::new(table.keys().cloned().collect());
    let records: Vec<FileRecord> = table.into_values().collect();
    let mut report = VerifyReport {
        checked: records.len(),
        ..VerifyReport::default()
    };

    let dir = Arc::new(backup_dir);
    let outcome = runner
        .run(
            records,
            move |record| Ok(check_entry(&dir, &record, &recorded)),
            |_, _| {},
        )
        .await;

    for result in outcome.results {
        match result? {
            EntryStatus::Valid => {}
            EntryStatus::Missing(path) => report.missing.push(path),
            EntryStatus::Mismatched(path) => report.mismatched.push(path),
        }
    }

    report.missing.sort();
    report.mismatched.sort();
    Ok(report)
}

fn check_entry(backup_dir: &Path, record: &FileRecord, recorded: &BTreeSet<String>) -> EntryStatus {
    let plain = artifact_path(backup_dir, &record.relative_path, false);
    let compressed = artifact_path(backup_dir, &record.relative_path, true);
    // `foo.tar.gz` belongs to its own record when that file is backed up too
    let shadowed = recorded.contains(&compressed_alias(&record.relative_path));

    let digests = if plain.is_file() {
        digest_file(&plain)
    } else if !shadowed && compressed.is_file() {
        digest_gzip_file(&compressed)
    } else {
        return EntryStatus::Missing(record.relative_path.clone());
    };

    match digests {
        Ok(d) if d.md5 == record.digest_fast && d.sha256 == record.digest_strong => {
            EntryStatus::Valid
        }
        Ok(_) => EntryStatus::Mismatched(record.relative_path.clone()),
        Err(e) => {
            debug!("Cannot read artifact for {}: {}", record.relative_path, e);
            EntryStatus::Mismatched(record.relative_path.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::manifest::{BackupRun, MANIFEST_FILE};
    use crate::state::store::persist_run;
    use crate::sync::digest::digest_reader;
    use std::fs;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    fn runner() -> TaskRunner {
        TaskRunner::new(2, CancellationToken::new())
    }

    fn record(path: &str, content: &[u8]) -> FileRecord {
        FileRecord::new(
            path.to_string(),
            content.len() as u64,
            0.0,
            digest_reader(content).unwrap(),
        )
    }

    fn write_backup(dest: &Path, files: &[(&str, &[u8])]) {
        let mut table = DigestTable::new();
        for (path, content) in files {
            let target = dest.join(path);
            fs::create_dir_all(target.parent().unwrap()).unwrap();
            fs::write(&target, content).unwrap();
            table.insert(path.to_string(), record(path, content));
        }
        let run = BackupRun::new(Path::new("/src"), dest);
        persist_run(dest, &run, &table).unwrap();
    }

    #[tokio::test]
    async fn test_intact_backup_passes() {
        let dest = TempDir::new().unwrap();
        write_backup(dest.path(), &[("a.txt", &b"alpha"[..]), ("sub/b.txt", &b"beta"[..])]);

        let report = verify(&dest.path().join(MANIFEST_FILE), &runner()).await.unwrap();
        assert!(report.passed());
        assert_eq!(report.checked, 2);
    }

    #[tokio::test]
    async fn test_flipped_byte_is_reported() {
        let dest = TempDir::new().unwrap();
        write_backup(dest.path(), &[("a.txt", &b"alpha"[..]), ("sub/b.txt", &b"beta"[..])]);

        let target = dest.path().join("sub/b.txt");
        let mut bytes = fs::read(&target).unwrap();
        bytes[0] ^= 0x01;
        fs::write(&target, bytes).unwrap();

        let report = verify(&dest.path().join(MANIFEST_FILE), &runner()).await.unwrap();
        assert!(!report.passed());
        assert_eq!(report.mismatched, vec!["sub/b.txt"]);
        assert!(report.missing.is_empty());
        assert_eq!(report.problems(), vec!["Corrupted: sub/b.txt"]);
    }

    #[tokio::test]
    async fn test_missing_artifact_is_reported() {
        let dest = TempDir::new().unwrap();
        write_backup(dest.path(), &[("a.txt", &b"alpha"[..])]);
        fs::remove_file(dest.path().join("a.txt")).unwrap();

        let report = verify(&dest.path().join(MANIFEST_FILE), &runner()).await.unwrap();
        assert_eq!(report.missing, vec!["a.txt"]);
        assert_eq!(report.problems(), vec!["Missing: a.txt"]);
    }

    #[tokio::test]
    async fn test_compressed_artifact_is_decompressed() {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;

        let dest = TempDir::new().unwrap();
        let content = b"payload ".repeat(300);
        let mut table = DigestTable::new();
        table.insert("big.bin".to_string(), record("big.bin", &content));

        let mut encoder = GzEncoder::new(
            fs::File::create(dest.path().join("big.bin.gz")).unwrap(),
            Compression::default(),
        );
        encoder.write_all(&content).unwrap();
        encoder.finish().unwrap();
        persist_run(dest.path(), &BackupRun::new(Path::new("/src"), dest.path()), &table).unwrap();

        let report = verify(&dest.path().join(MANIFEST_FILE), &runner()).await.unwrap();
        assert!(report.passed());
    }

    #[tokio::test]
    async fn test_missing_plain_artifact_ignores_other_files_gz() {
        let dest = TempDir::new().unwrap();
        write_backup(dest.path(), &[("foo.tar", &b"tar"[..]), ("foo.tar.gz", &b"gz"[..])]);
        fs::remove_file(dest.path().join("foo.tar")).unwrap();

        let report = verify(&dest.path().join(MANIFEST_FILE), &runner()).await.unwrap();
        assert_eq!(report.missing, vec!["foo.tar"]);
        assert!(report.mismatched.is_empty());
    }

    #[tokio::test]
    async fn test_unsafe_table_keys_are_not_read() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("dst");
        fs::create_dir(&dest).unwrap();
        fs::write(temp.path().join("outside.txt"), b"outside").unwrap();

        let mut table = DigestTable::new();
        table.insert("a.txt".to_string(), record("a.txt", b"alpha"));
        table.insert("../outside.txt".to_string(), record("../outside.txt", b"outside"));
        fs::write(dest.join("a.txt"), b"alpha").unwrap();
        persist_run(&dest, &BackupRun::new(Path::new("/src"), &dest), &table).unwrap();

        let report = verify(&dest.join(MANIFEST_FILE), &runner()).await.unwrap();
        assert_eq!(report.checked, 1);
        assert!(report.passed());
    }

    #[tokio::test]
    async fn test_missing_manifest_fails() {
        let dest = TempDir::new().unwrap();
        let err = verify(&dest.path().join(MANIFEST_FILE), &runner()).await.unwrap_err();
        assert!(matches!(err, BackupError::ManifestNotFound(_)));
    }

    #[tokio::test]
    async fn test_missing_digest_table_fails() {
        let dest = TempDir::new().unwrap();
        fs::write(dest.path().join(MANIFEST_FILE), b"{}").unwrap();
        let err = verify(&dest.path().join(MANIFEST_FILE), &runner()).await.unwrap_err();
        assert!(matches!(err, BackupError::DigestTableNotFound(_)));
    }

    #[tokio::test]
    async fn test_verify_is_read_only_and_repeatable() {
        let dest = TempDir::new().unwrap();
        write_backup(dest.path(), &[("a.txt", &b"alpha"[..])]);
        let before = fs::read(dest.path().join(DIGEST_TABLE_FILE)).unwrap();

        let first = verify(&dest.path().join(MANIFEST_FILE), &runner()).await.unwrap();
        let second = verify(&dest.path().join(MANIFEST_FILE), &runner()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(fs::read(dest.path().join(DIGEST_TABLE_FILE)).unwrap(), before);
    }
}
