//! File metadata handling for backup operations.
//!
//! Captures the size, modification time and permission bits the change
//! detector needs, and re-applies them to plain copies so a destination
//! artifact carries the same timestamps as its source.

use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};

/// File metadata relevant to change detection and metadata-preserving copies
#[derive(Debug, Clone, PartialEq)]
pub struct FileMetadata {
    /// File size in bytes
    pub size: u64,

    /// Last modified time (fractional seconds since Unix epoch)
    pub modified: f64,

    /// File permissions (Unix mode bits)
    pub permissions: Option<u32>,
}

impl FileMetadata {
    /// Extract metadata from a file path (symlinks are followed)
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let metadata = fs::metadata(path)?;
        Ok(Self::from_metadata(&metadata))
    }

    pub fn from_metadata(metadata: &fs::Metadata) -> Self {
        let modified = metadata
            .modified()
            .ok()
            .map(system_time_to_secs)
            .unwrap_or_default();

        #[cfg(unix)]
        let permissions = {
            use std::os::unix::fs::PermissionsExt;
            Some(metadata.permissions().mode())
        };

        #[cfg(not(unix))]
        let permissions = None;

        Self {
            size: metadata.len(),
            modified,
            permissions,
        }
    }

    /// Apply permissions and modification time to a file
    pub fn apply_to_path(&self, path: &Path) -> std::io::Result<()> {
        // Timestamps first: a read-only mode would block opening for write
        if let Some(mtime) = secs_to_system_time(self.modified) {
            let file = match fs::File::options().write(true).open(path) {
                Ok(file) => file,
                Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                    // fs::copy already carried over a read-only mode
                    let mut perms = fs::metadata(path)?.permissions();
                    #[allow(clippy::permissions_set_readonly_false)]
                    perms.set_readonly(false);
                    fs::set_permissions(path, perms)?;
                    fs::File::options().write(true).open(path)?
                }
                Err(e) => return Err(e),
            };
            file.set_modified(mtime)?;
        }

        self.apply_permissions(path)
    }

    #[cfg(unix)]
    fn apply_permissions(&self, path: &Path) -> std::io::Result<()> {
        use std::os::unix::fs::PermissionsExt;

        if let Some(mode) = self.permissions {
            fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn apply_permissions(&self, _path: &Path) -> std::io::Result<()> {
        // On non-Unix platforms only the read-only flag is copied by fs::copy
        Ok(())
    }
}

/// Seconds since the Unix epoch as a float; pre-epoch times are negative.
pub fn system_time_to_secs(time: SystemTime) -> f64 {
    match time.duration_since(SystemTime::UNIX_EPOCH) {
        Ok(d) => d.as_secs_f64(),
        Err(e) => -e.duration().as_secs_f64(),
    }
}

fn secs_to_system_time(secs: f64) -> Option<SystemTime> {
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    SystemTime::UNIX_EPOCH.checked_add(Duration::from_secs_f64(secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_extract_metadata() -> std::io::Result<()> {
        let mut temp_file = NamedTempFile::new()?;
        temp_file.write_all(b"test content")?;
        temp_file.flush()?;

        let metadata = FileMetadata::from_path(temp_file.path())?;

        assert_eq!(metadata.size, 12);
        assert!(metadata.modified > 0.0);

        Ok(())
    }

    #[test]
    fn test_apply_preserves_mtime() -> std::io::Result<()> {
        let source = NamedTempFile::new()?;
        let target = NamedTempFile::new()?;

        let mut metadata = FileMetadata::from_path(source.path())?;
        metadata.modified = 1_600_000_000.25;
        metadata.apply_to_path(target.path())?;

        let applied = FileMetadata::from_path(target.path())?;
        assert!((applied.modified - 1_600_000_000.25).abs() < 0.001);

        Ok(())
    }

    #[test]
    #[cfg(unix)]
    fn test_permissions_preservation() -> std::io::Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let source = NamedTempFile::new()?;
        let target = NamedTempFile::new()?;
        fs::set_permissions(source.path(), fs::Permissions::from_mode(0o640))?;

        FileMetadata::from_path(source.path())?.apply_to_path(target.path())?;

        let mode = fs::metadata(target.path())?.permissions().mode() & 0o777;
        assert_eq!(mode, 0o640);

        Ok(())
    }

    #[test]
    fn test_negative_or_invalid_times_are_not_applied() {
        assert!(secs_to_system_time(-5.0).is_none());
        assert!(secs_to_system_time(f64::NAN).is_none());
        assert!(secs_to_system_time(10.5).is_some());
    }
}
