//! Custom error types for the backup engine.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Source path '{}' does not exist", .0.display())]
    SourceNotFound(PathBuf),

    #[error("Cannot access directory: {0}")]
    Scan(String),

    #[error("Cannot hash {path}: {source}")]
    Digest {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Backup failed for {path}: {source}")]
    Copy {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Backup failed for {0}: hash mismatch after write")]
    DigestMismatch(String),

    #[error("Cannot remove {path}: {source}")]
    Prune {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Manifest not found: {}", .0.display())]
    ManifestNotFound(PathBuf),

    #[error("Hash file not found: {}", .0.display())]
    DigestTableNotFound(PathBuf),

    #[error("Worker task failed: {0}")]
    Task(String),

    #[error("Backup interrupted by user")]
    Interrupted,
}

pub type Result<T> = std::result::Result<T, BackupError>;
