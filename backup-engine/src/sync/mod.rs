//! Content digests and change detection.

pub mod diff;
pub mod digest;

pub use diff::{diff_against_table, needs_backup, DiffResult};
pub use digest::{digest_file, digest_gzip_file, DigestAlgorithm, FileDigests};
