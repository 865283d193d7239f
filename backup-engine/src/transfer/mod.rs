//! Writing artifacts to the destination and reporting transfer progress.

pub mod copier;
pub mod progress;

pub use copier::{artifact_path, copy_file, CopyOptions, CopyOutcome, COMPRESSED_SUFFIX};
