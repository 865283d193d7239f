//! Source tree traversal.
//!
//! Produces the candidate file list for a run: a depth-first walk of the
//! source root with substring exclusions applied before descending into a
//! directory. Unreadable directories are reported and their subtree omitted;
//! the walk itself never fails.

use crate::fs::metadata::FileMetadata;
use crate::utils::BackupError;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

/// Options for directory walking. Symlinked directories are never entered.
#[derive(Debug, Clone, Default)]
pub struct WalkOptions {
    /// Exclude patterns (substring match against the source-relative path)
    pub exclude_patterns: Vec<String>,
}

impl WalkOptions {
    pub fn with_excludes(exclude_patterns: Vec<String>) -> Self {
        Self { exclude_patterns }
    }
}

/// A regular file discovered during walking
#[derive(Debug, Clone)]
pub struct FileInfo {
    /// Full path to the file
    pub path: PathBuf,

    /// Relative path from the root, forward-slash separated
    pub relative_path: String,

    /// File size in bytes at scan time
    pub size: u64,
}

/// Outcome of scanning a source root
#[derive(Debug, Default)]
pub struct ScanResult {
    pub files: Vec<FileInfo>,
    pub total_bytes: u64,
    pub errors: Vec<String>,
    /// Source-relative directories that could not be read; their subtree is
    /// missing from `files`
    pub unreadable_dirs: Vec<String>,
}

impl ScanResult {
    /// Whether `relative_path` lies under a directory the scan could not read
    pub fn is_unreadable(&self, relative_path: &str) -> bool {
        self.unreadable_dirs.iter().any(|dir| {
            dir.is_empty()
                || relative_path
                    .strip_prefix(dir.as_str())
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }
}

impl FileInfo {
    /// Create FileInfo from a DirEntry.
    /// For symlinks, resolves to the target to get the real file size.
    /// Returns None if the entry is a directory, a symlink to a directory,
    /// or a broken symlink.
    fn from_entry(entry: &DirEntry, root: &Path, errors: &mut Vec<String>) -> Option<Self> {
        let path = entry.path().to_path_buf();
        let relative_path = normalize_relative(&path, root);
        let is_symlink = entry.path_is_symlink();

        if entry.file_type().is_dir() {
            return None;
        }

        if is_symlink {
            return match std::fs::metadata(&path) {
                Ok(resolved) if resolved.is_file() => Some(Self {
                    path,
                    relative_path,
                    size: resolved.len(),
                }),
                Ok(_) => None,
                Err(_) => {
                    debug!("Skipping broken symlink: {}", path.display());
                    None
                }
            };
        }

        if !entry.file_type().is_file() {
            // Sockets, fifos and device nodes are not backed up
            return None;
        }

        let size = match entry.metadata() {
            Ok(m) => m.len(),
            Err(e) => {
                // Still a candidate: digesting will stat it again
                warn!("Cannot stat {}: {}", path.display(), e);
                errors.push(format!("Cannot stat {}: {}", path.display(), e));
                0
            }
        };

        Some(Self {
            path,
            relative_path,
            size,
        })
    }
}

/// Scan a source root and collect every candidate file.
///
/// A root that is itself a regular file yields exactly that file, keyed by
/// its file name.
///
/// # Example
/// ```no_run
/// use backup_engine::fs::walker::{scan_source, WalkOptions};
/// use std::path::Path;
///
/// let scan = scan_source(Path::new("/data"), &WalkOptions::default());
/// println!("Found {} files ({} bytes)", scan.files.len(), scan.total_bytes);
/// ```
pub fn scan_source(root: &Path, options: &WalkOptions) -> ScanResult {
    let mut result = ScanResult::default();

    if let Ok(metadata) = std::fs::metadata(root) {
        if metadata.is_file() {
            let relative_path = root
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| root.to_string_lossy().to_string());
            let size = FileMetadata::from_metadata(&metadata).size;
            result.total_bytes = size;
            result.files.push(FileInfo {
                path: root.to_path_buf(),
                relative_path,
                size,
            });
            return result;
        }
    }

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0 || !should_exclude(entry, root, &options.exclude_patterns)
        });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Scan error: {}", e);
                if let Some(dir) = e.path() {
                    result.unreadable_dirs.push(normalize_relative(dir, root));
                }
                result.errors.push(BackupError::Scan(e.to_string()).to_string());
                continue;
            }
        };

        if let Some(file_info) = FileInfo::from_entry(&entry, root, &mut result.errors) {
            result.total_bytes += file_info.size;
            result.files.push(file_info);
        }
    }

    result
}

/// Source-relative path with `/` separators regardless of platform
pub fn normalize_relative(path: &Path, root: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Check if a directory entry should be excluded based on patterns
fn should_exclude(entry: &DirEntry, root: &Path, patterns: &[String]) -> bool {
    if patterns.is_empty() {
        return false;
    }

    let relative = normalize_relative(entry.path(), root);
    patterns.iter().any(|pattern| relative.contains(pattern.as_str()))
}
