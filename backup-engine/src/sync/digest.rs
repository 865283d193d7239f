//! Streaming content digests.
//!
//! Every file is hashed with two algorithms in a single pass: MD5 (fast,
//! legacy) and SHA-256 (strong). Input is consumed in fixed 64 KiB chunks so
//! memory use is independent of file size.

use flate2::read::GzDecoder;
use md5::Md5;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Read buffer size for digesting (64KB)
pub const DIGEST_CHUNK_SIZE: usize = 64 * 1024;

/// Digest selected for change detection and post-write verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    Md5,
    #[default]
    Sha256,
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DigestAlgorithm::Md5 => write!(f, "md5"),
            DigestAlgorithm::Sha256 => write!(f, "sha256"),
        }
    }
}

/// Hex-encoded digest pair for a whole file's content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDigests {
    pub md5: String,
    pub sha256: String,
}

impl FileDigests {
    /// The digest selected by `algorithm`
    pub fn get(&self, algorithm: DigestAlgorithm) -> &str {
        match algorithm {
            DigestAlgorithm::Md5 => &self.md5,
            DigestAlgorithm::Sha256 => &self.sha256,
        }
    }
}

/// Digest everything readable from `reader`.
pub fn digest_reader<R: Read>(mut reader: R) -> io::Result<FileDigests> {
    let mut md5 = Md5::new();
    let mut sha256 = Sha256::new();
    let mut buffer = vec![0u8; DIGEST_CHUNK_SIZE];

    loop {
        let n = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        md5.update(&buffer[..n]);
        sha256.update(&buffer[..n]);
    }

    Ok(FileDigests {
        md5: hex::encode(md5.finalize()),
        sha256: hex::encode(sha256.finalize()),
    })
}

/// Digest the content of a file on disk.
///
/// # Example
/// ```no_run
/// use backup_engine::sync::digest::digest_file;
/// use std::path::Path;
///
/// let digests = digest_file(Path::new("/data/report.pdf")).unwrap();
/// println!("{}", digests.sha256);
/// ```
pub fn digest_file(path: &Path) -> io::Result<FileDigests> {
    let file = File::open(path)?;
    digest_reader(file)
}

/// Digest the decompressed content of a gzip artifact.
pub fn digest_gzip_file(path: &Path) -> io::Result<FileDigests> {
    let file = File::open(path)?;
    digest_reader(GzDecoder::new(file))
}
