//! Removal of destination artifacts whose source file vanished.

use crate::executor::manifest::DigestTable;
use crate::sync::diff::vanished_paths;
use crate::transfer::copier::{artifact_path, compressed_alias, CopyOptions};
use crate::utils::BackupError;
use std::collections::BTreeSet;
use std::io;
use std::path::Path;
use tracing::{debug, warn};

/// Outcome of the prune stage
#[derive(Debug, Default)]
pub struct PruneReport {
    /// Relative paths counted as removed
    pub removed: Vec<String>,
    pub errors: Vec<String>,
}

/// Delete the artifact of every path recorded previously but absent now.
///
/// An artifact that is already gone still counts as removed, so a dry run
/// reports the same number as a real run. Failures are collected and the
/// remaining paths are still processed. The compressed form of `foo.tar` is
/// never touched while `foo.tar.gz` is itself a current or recorded file,
/// since that location holds its plain artifact.
pub fn prune_vanished(
    previous: &DigestTable,
    current: &BTreeSet<String>,
    dest_root: &Path,
    options: &CopyOptions,
) -> PruneReport {
    let mut report = PruneReport::default();

    for path in vanished_paths(previous, current) {
        if options.dry_run {
            report.removed.push(path.to_string());
            continue;
        }

        let alias = compressed_alias(path);
        let shadowed = current.contains(&alias) || previous.contains_key(&alias);
        let preferred = previous
            .get(path)
            .map(|record| options.should_compress(record.size))
            .unwrap_or(options.compress);

        let forms: &[bool] = match (shadowed, preferred) {
            (true, _) => &[false],
            (false, true) => &[true, false],
            (false, false) => &[false, true],
        };

        match remove_artifact(dest_root, path, forms) {
            Ok(()) => report.removed.push(path.to_string()),
            Err(source) => {
                let error = BackupError::Prune {
                    path: path.to_string(),
                    source,
                };
                warn!("{}", error);
                report.errors.push(error.to_string());
            }
        }
    }

    report
}

/// Remove the first artifact form that exists, in the order given.
fn remove_artifact(dest_root: &Path, relative_path: &str, forms: &[bool]) -> io::Result<()> {
    for &compressed in forms {
        let candidate = artifact_path(dest_root, relative_path, compressed);
        match std::fs::remove_file(&candidate) {
            Ok(()) => {
                debug!("Removed {}", candidate.display());
                return Ok(());
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        }
    }

    debug!("No artifact left for {}", relative_path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::manifest::FileRecord;
    use std::fs;
    use tempfile::TempDir;

    fn table(entries: &[(&str, u64)]) -> DigestTable {
        entries
            .iter()
            .map(|(path, size)| {
                (
                    path.to_string(),
                    FileRecord {
                        relative_path: path.to_string(),
                        size: *size,
                        modified_time: 0.0,
                        digest_fast: String::new(),
                        digest_strong: String::new(),
                    },
                )
            })
            .collect()
    }

    fn current(paths: &[&str]) -> BTreeSet<String> {
        paths.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_prunes_vanished_plain_artifact() -> io::Result<()> {
        let dest = TempDir::new()?;
        fs::write(dest.path().join("a.txt"), b"old")?;
        fs::write(dest.path().join("b.txt"), b"keep")?;

        let previous = table(&[("a.txt", 3), ("b.txt", 4)]);
        let report = prune_vanished(
            &previous,
            &current(&["b.txt"]),
            dest.path(),
            &CopyOptions::default(),
        );

        assert_eq!(report.removed, vec!["a.txt"]);
        assert!(report.errors.is_empty());
        assert!(!dest.path().join("a.txt").exists());
        assert!(dest.path().join("b.txt").exists());
        Ok(())
    }

    #[test]
    fn test_prunes_compressed_artifact() -> io::Result<()> {
        let dest = TempDir::new()?;
        fs::create_dir(dest.path().join("sub"))?;
        fs::write(dest.path().join("sub/big.bin.gz"), b"gz")?;

        let previous = table(&[("sub/big.bin", 5000)]);
        let options = CopyOptions {
            compress: true,
            ..CopyOptions::default()
        };
        let report = prune_vanished(&previous, &current(&[]), dest.path(), &options);

        assert_eq!(report.removed, vec!["sub/big.bin"]);
        assert!(!dest.path().join("sub/big.bin.gz").exists());
        Ok(())
    }

    #[test]
    fn test_falls_back_to_other_artifact_form() -> io::Result<()> {
        let dest = TempDir::new()?;
        fs::write(dest.path().join("big.bin.gz"), b"gz")?;

        // Compression disabled now, but an earlier run compressed the file
        let previous = table(&[("big.bin", 5000)]);
        let report = prune_vanished(&previous, &current(&[]), dest.path(), &CopyOptions::default());

        assert_eq!(report.removed.len(), 1);
        assert!(!dest.path().join("big.bin.gz").exists());
        Ok(())
    }

    #[test]
    fn test_vanished_file_never_removes_claimed_gz_artifact() -> io::Result<()> {
        let dest = TempDir::new()?;
        // foo.tar's artifact is already gone; foo.tar.gz is a live file
        fs::write(dest.path().join("foo.tar.gz"), b"live")?;

        let previous = table(&[("foo.tar", 2000), ("foo.tar.gz", 4)]);
        let report = prune_vanished(
            &previous,
            &current(&["foo.tar.gz"]),
            dest.path(),
            &CopyOptions::default(),
        );

        assert_eq!(report.removed, vec!["foo.tar"]);
        assert_eq!(fs::read(dest.path().join("foo.tar.gz"))?, b"live");
        Ok(())
    }

    #[test]
    fn test_dry_run_counts_without_deleting() -> io::Result<()> {
        let dest = TempDir::new()?;
        fs::write(dest.path().join("a.txt"), b"old")?;

        let previous = table(&[("a.txt", 3)]);
        let options = CopyOptions {
            dry_run: true,
            ..CopyOptions::default()
        };
        let report = prune_vanished(&previous, &current(&[]), dest.path(), &options);

        assert_eq!(report.removed, vec!["a.txt"]);
        assert!(dest.path().join("a.txt").exists());
        Ok(())
    }

    #[test]
    fn test_missing_artifact_still_counts() -> io::Result<()> {
        let dest = TempDir::new()?;
        let previous = table(&[("never-written.txt", 3)]);
        let report = prune_vanished(&previous, &current(&[]), dest.path(), &CopyOptions::default());

        assert_eq!(report.removed, vec!["never-written.txt"]);
        assert!(report.errors.is_empty());
        Ok(())
    }

    #[test]
    fn test_deletion_failure_is_recorded_and_processing_continues() -> io::Result<()> {
        let dest = TempDir::new()?;
        // A non-empty directory where a file is expected cannot be removed with remove_file
        fs::create_dir_all(dest.path().join("blocked.txt/inner"))?;
        fs::write(dest.path().join("z.txt"), b"old")?;

        let previous = table(&[("blocked.txt", 3), ("z.txt", 3)]);
        let report = prune_vanished(&previous, &current(&[]), dest.path(), &CopyOptions::default());

        assert_eq!(report.removed, vec!["z.txt"]);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].starts_with("Cannot remove blocked.txt"));
        assert!(!dest.path().join("z.txt").exists());
        Ok(())
    }
}
