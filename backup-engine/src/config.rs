//! Configuration management for the backup engine.
//!
//! Loads configuration from an optional TOML file; command-line flags are
//! applied on top by the binary.

use crate::sync::digest::DigestAlgorithm;
use crate::utils::{BackupError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Upper bound on the worker pool size
pub const MAX_THREADS: usize = 1024;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backup: BackupConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Worker pool size for the digest and copy phases
    #[serde(default = "default_threads")]
    pub threads: usize,

    /// Digest used for change detection and post-write verification
    #[serde(default)]
    pub algorithm: DigestAlgorithm,

    /// Gzip files larger than `compression_threshold`
    #[serde(default)]
    pub compress: bool,

    /// Gzip level (0-9)
    #[serde(default = "default_compression_level")]
    pub compression_level: u32,

    /// Files must be strictly larger than this many bytes to be compressed
    #[serde(default = "default_compression_threshold")]
    pub compression_threshold: u64,

    /// Substring exclusion patterns
    #[serde(default)]
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Number of errors listed in the verbose summary
    #[serde(default = "default_max_errors_shown")]
    pub max_errors_shown: usize,
}

// Default values
fn default_threads() -> usize {
    4
}

fn default_compression_level() -> u32 {
    6
}

fn default_compression_threshold() -> u64 {
    1024
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_max_errors_shown() -> usize {
    10
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            threads: default_threads(),
            algorithm: DigestAlgorithm::default(),
            compress: false,
            compression_level: default_compression_level(),
            compression_threshold: default_compression_threshold(),
            exclude: Vec::new(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_errors_shown: default_max_errors_shown(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.backup.threads == 0 {
            return Err(BackupError::Config("threads must be at least 1".to_string()));
        }
        if self.backup.threads > MAX_THREADS {
            return Err(BackupError::Config(format!(
                "threads must be at most {}, got {}",
                MAX_THREADS, self.backup.threads
            )));
        }
        if self.backup.compression_level > 9 {
            return Err(BackupError::Config(format!(
                "compression_level must be between 0 and 9, got {}",
                self.backup.compression_level
            )));
        }
        Ok(())
    }
}
