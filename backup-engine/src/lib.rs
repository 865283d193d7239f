//! Backup Engine Library
//!
//! Incremental file backup: scans a source tree, digests files in parallel,
//! copies only what changed since the last run, mirrors deletions, and keeps
//! a digest table at the destination that a later `verify` can check.

pub mod config;
pub mod events;
pub mod executor;
pub mod fs;
pub mod shutdown;
pub mod state;
pub mod sync;
pub mod transfer;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use executor::manifest::{BackupRun, DigestTable, FileRecord};
pub use executor::{BackupExecutor, BackupJob};
pub use sync::digest::DigestAlgorithm;
pub use utils::errors::BackupError;
pub type Result<T> = std::result::Result<T, BackupError>;
