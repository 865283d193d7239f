//! Writing files into the destination tree.
//!
//! A file is either gzip-compressed (when compression is enabled and it is
//! larger than the threshold) or copied verbatim with its permissions and
//! modification time. Either way the written artifact is read back,
//! decompressed if needed, and digested; the result must match the digest
//! recorded for the source.

use crate::executor::manifest::FileRecord;
use crate::fs::metadata::FileMetadata;
use crate::sync::digest::{digest_file, digest_gzip_file, DigestAlgorithm};
use crate::utils::{BackupError, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Suffix appended to compressed artifacts
pub const COMPRESSED_SUFFIX: &str = ".gz";

/// Settings shared by every copy in a run
#[derive(Debug, Clone)]
pub struct CopyOptions {
    pub dry_run: bool,
    pub compress: bool,
    pub compression_level: u32,
    /// Files must be strictly larger than this to be compressed
    pub compression_threshold: u64,
    pub algorithm: DigestAlgorithm,
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            compress: false,
            compression_level: 6,
            compression_threshold: 1024,
            algorithm: DigestAlgorithm::Sha256,
        }
    }
}

impl CopyOptions {
    pub fn should_compress(&self, size: u64) -> bool {
        self.compress && size > self.compression_threshold
    }
}

/// A successfully written (or, in dry-run, planned) artifact
#[derive(Debug, Clone)]
pub struct CopyOutcome {
    pub relative_path: String,
    pub bytes: u64,
    pub compressed: bool,
}

/// Destination location of a file's artifact
pub fn artifact_path(dest_root: &Path, relative_path: &str, compressed: bool) -> PathBuf {
    let plain = dest_root.join(relative_path);
    if compressed {
        let mut name = plain.into_os_string();
        name.push(COMPRESSED_SUFFIX);
        PathBuf::from(name)
    } else {
        plain
    }
}

/// The relative path whose plain artifact occupies the location of
/// `relative_path`'s compressed artifact (`foo.tar` → `foo.tar.gz`).
pub fn compressed_alias(relative_path: &str) -> String {
    format!("{}{}", relative_path, COMPRESSED_SUFFIX)
}

/// Copy one file into the destination and verify what was written.
///
/// `claimed` holds every relative path that owns an artifact in this run
/// (current and previously recorded files). A file whose compressed location
/// is another claimed file's plain artifact is always written plain, and
/// that location is never cleaned up as a stale sibling.
pub fn copy_file(
    record: &FileRecord,
    source: &Path,
    dest_root: &Path,
    options: &CopyOptions,
    claimed: &BTreeSet<String>,
) -> Result<CopyOutcome> {
    let shadowed = claimed.contains(&compressed_alias(&record.relative_path));
    let compressed = options.should_compress(record.size) && !shadowed;
    let outcome = CopyOutcome {
        relative_path: record.relative_path.clone(),
        bytes: record.size,
        compressed,
    };

    if options.dry_run {
        return Ok(outcome);
    }

    let copy_err = |source: io::Error| BackupError::Copy {
        path: record.relative_path.clone(),
        source,
    };

    let target = artifact_path(dest_root, &record.relative_path, compressed);
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(copy_err)?;
    }
    // A previous copy may carry a read-only mode that blocks truncation
    remove_if_present(&target).map_err(copy_err)?;

    if compressed {
        write_compressed(source, &target, options.compression_level).map_err(copy_err)?;
    } else {
        fs::copy(source, &target).map_err(copy_err)?;
        FileMetadata::from_path(source)
            .and_then(|metadata| metadata.apply_to_path(&target))
            .map_err(copy_err)?;
    }

    let written = if compressed {
        digest_gzip_file(&target)
    } else {
        digest_file(&target)
    }
    .map_err(copy_err)?;

    if written.get(options.algorithm) != record.digest(options.algorithm) {
        return Err(BackupError::DigestMismatch(record.relative_path.clone()));
    }

    if compressed || !shadowed {
        remove_stale_sibling(dest_root, &record.relative_path, compressed);
    }
    debug!("Wrote {} ({} bytes, compressed: {})", target.display(), record.size, compressed);

    Ok(outcome)
}

fn write_compressed(source: &Path, target: &Path, level: u32) -> io::Result<()> {
    let mut reader = BufReader::new(File::open(source)?);
    let writer = BufWriter::new(File::create(target)?);
    let mut encoder = GzEncoder::new(writer, Compression::new(level));
    io::copy(&mut reader, &mut encoder)?;
    encoder.finish()?.flush()
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Drop the other form of the artifact left by a run with different
/// compression settings, so exactly one artifact exists per file.
fn remove_stale_sibling(dest_root: &Path, relative_path: &str, compressed: bool) {
    let sibling = artifact_path(dest_root, relative_path, !compressed);
    match fs::remove_file(&sibling) {
        Ok(()) => debug!("Removed stale artifact {}", sibling.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("Cannot remove stale artifact {}: {}", sibling.display(), e),
    }
}
