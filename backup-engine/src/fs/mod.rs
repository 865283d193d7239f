//! File system access: source traversal and metadata capture.

pub mod metadata;
pub mod walker;

pub use metadata::FileMetadata;
pub use walker::{scan_source, FileInfo, ScanResult, WalkOptions};
