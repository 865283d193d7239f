//! Persisted run state at the destination root.
//!
//! Both records are written atomically: the JSON is written to a temporary
//! sibling, flushed to disk, then renamed over the previous version.

use crate::executor::manifest::{BackupRun, DigestTable, DIGEST_TABLE_FILE, MANIFEST_FILE};
use crate::utils::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use tracing::{info, warn};

pub fn manifest_path(dest_root: &Path) -> PathBuf {
    dest_root.join(MANIFEST_FILE)
}

pub fn digest_table_path(dest_root: &Path) -> PathBuf {
    dest_root.join(DIGEST_TABLE_FILE)
}

/// Load the previous run's digest table.
///
/// A missing table means "first run"; an unreadable or corrupt one is logged
/// and also treated as empty, which makes every file look new.
pub fn load_digest_table(dest_root: &Path) -> DigestTable {
    let path = digest_table_path(dest_root);
    if !path.exists() {
        info!("No previous digest table at {}, performing full backup", path.display());
        return DigestTable::new();
    }

    match read_digest_table(&path) {
        Ok(table) => {
            info!("Loaded {} previous digest records", table.len());
            table
        }
        Err(e) => {
            warn!("Ignoring unreadable digest table {}: {}", path.display(), e);
            DigestTable::new()
        }
    }
}

/// Read a digest table file, dropping entries whose key would resolve
/// outside the destination root.
pub fn read_digest_table(path: &Path) -> Result<DigestTable> {
    let mut table: DigestTable = read_json(path)?;
    table.retain(|key, _| {
        let contained = is_contained_relative(key);
        if !contained {
            warn!("Ignoring digest record with unsafe path {:?} in {}", key, path.display());
        }
        contained
    });
    Ok(table)
}

/// A non-empty relative path made only of plain components (no `..`, no
/// root, no drive prefix)
pub fn is_contained_relative(relative_path: &str) -> bool {
    !relative_path.is_empty()
        && Path::new(relative_path)
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
}

/// Persist the run summary and the new baseline digest table.
pub fn persist_run(dest_root: &Path, run: &BackupRun, table: &DigestTable) -> Result<()> {
    fs::create_dir_all(dest_root)?;
    write_json_atomic(&manifest_path(dest_root), run)?;
    write_json_atomic(&digest_table_path(dest_root), table)?;
    info!(
        "Persisted manifest {} with {} digest records",
        run.run_id,
        table.len()
    );
    Ok(())
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read(path)?;
    Ok(serde_json::from_slice(&content)?)
}

/// Serialize `value` as pretty JSON and atomically replace `path`.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)?;
    let tmp_path = tmp_sibling(path);

    let write = || -> io::Result<()> {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(&json)?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)
    };

    if let Err(e) = write() {
        let _ = fs::remove_file(&tmp_path);
        return Err(e.into());
    }
    Ok(())
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}
