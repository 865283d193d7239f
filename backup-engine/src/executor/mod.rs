//! Backup job executor - Orchestrates the actual backup process.
//!
//! A run moves through fixed stages, each finishing before the next starts:
//! scan → digest → diff → copy → prune → persist → summary. Digesting and
//! copying fan out over the bounded worker pool; every per-file failure is
//! folded into the run's error list and the run carries on. The executor
//! owns the run record and is the only place it is mutated.

pub mod manifest;
pub mod pool;
pub mod prune;

use crate::config::BackupConfig;
use crate::events::{EventSink, RunEvent};
use crate::fs::metadata::FileMetadata;
use crate::fs::walker::{scan_source, FileInfo, ScanResult, WalkOptions};
use crate::state::store::{load_digest_table, persist_run};
use crate::sync::diff::diff_against_table;
use crate::sync::digest::{digest_file, DigestAlgorithm};
use crate::transfer::copier::{
    artifact_path, compressed_alias, copy_file, CopyOptions, CopyOutcome,
};
use crate::utils::{BackupError, Result};
use manifest::{BackupRun, DigestTable, FileRecord};
use pool::TaskRunner;
use prune::prune_vanished;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Stages of a single run, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStage {
    Scan,
    Digest,
    Diff,
    Copy,
    Prune,
    Persist,
    Summary,
}

/// Terminal state of a completed run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    SuccessWithErrors,
}

impl BackupRun {
    pub fn status(&self) -> RunStatus {
        if self.has_errors() {
            RunStatus::SuccessWithErrors
        } else {
            RunStatus::Success
        }
    }
}

/// Backup job configuration
#[derive(Debug, Clone)]
pub struct BackupJob {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub algorithm: DigestAlgorithm,
    pub compress: bool,
    pub compression_level: u32,
    pub compression_threshold: u64,
    pub threads: usize,
    pub dry_run: bool,
    pub exclude_patterns: Vec<String>,
}

impl BackupJob {
    /// Job with default settings
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self::from_config(source, destination, &BackupConfig::default())
    }

    pub fn from_config(
        source: impl Into<PathBuf>,
        destination: impl Into<PathBuf>,
        config: &BackupConfig,
    ) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            algorithm: config.algorithm,
            compress: config.compress,
            compression_level: config.compression_level,
            compression_threshold: config.compression_threshold,
            threads: config.threads,
            dry_run: false,
            exclude_patterns: config.exclude.clone(),
        }
    }

    fn copy_options(&self) -> CopyOptions {
        CopyOptions {
            dry_run: self.dry_run,
            compress: self.compress,
            compression_level: self.compression_level,
            compression_threshold: self.compression_threshold,
            algorithm: self.algorithm,
        }
    }
}

/// State carried from the scan into the remaining stages
struct RunContext {
    source: PathBuf,
    dest: PathBuf,
    run: BackupRun,
    previous: DigestTable,
    started: std::time::Instant,
}

/// Main backup executor
pub struct BackupExecutor {
    events: EventSink,
    cancel_token: CancellationToken,
}

impl Default for BackupExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl BackupExecutor {
    /// Create a new backup executor (no cancellation support)
    pub fn new() -> Self {
        Self {
            events: EventSink::none(),
            cancel_token: CancellationToken::new(),
        }
    }

    /// Create a new backup executor with cancellation support
    pub fn with_cancel(cancel_token: CancellationToken) -> Self {
        Self {
            events: EventSink::none(),
            cancel_token,
        }
    }

    /// Report progress and per-file actions on `events`
    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    /// Execute a backup job.
    ///
    /// Returns the finished run record, whether or not per-file errors
    /// occurred. Errors are returned only for fatal startup conditions and
    /// for user interruption, in which case nothing is persisted.
    pub async fn execute(&self, job: BackupJob) -> Result<BackupRun> {
        let started = std::time::Instant::now();

        if !job.source.exists() {
            return Err(BackupError::SourceNotFound(job.source.clone()));
        }
        let source = std::fs::canonicalize(&job.source)?;
        let dest = absolute_path(&job.destination)?;

        let run = BackupRun::new(&source, &dest);
        let previous = load_digest_table(&dest);

        info!(
            "Starting backup {}: {} -> {} (algorithm: {}, compress: {}, threads: {}, dry-run: {})",
            run.run_id,
            source.display(),
            dest.display(),
            job.algorithm,
            job.compress,
            job.threads,
            job.dry_run
        );
        self.events.emit(RunEvent::Started {
            run_id: run.run_id.clone(),
            previous_records: previous.len(),
        });

        // SCAN
        self.enter(RunStage::Scan)?;
        let walk_options = WalkOptions::with_excludes(job.exclude_patterns.clone());
        let scan_root = source.clone();
        let scan = tokio::task::spawn_blocking(move || scan_source(&scan_root, &walk_options))
            .await
            .map_err(|e| BackupError::Task(e.to_string()))?;

        let context = RunContext {
            source,
            dest,
            run,
            previous,
            started,
        };
        self.process_scan(&job, context, scan).await
    }

    /// Every stage after the scan, driven by its result
    async fn process_scan(
        &self,
        job: &BackupJob,
        context: RunContext,
        scan: ScanResult,
    ) -> Result<BackupRun> {
        let RunContext {
            source,
            dest,
            mut run,
            previous,
            started,
        } = context;
        let options = job.copy_options();
        let runner = TaskRunner::new(job.threads, self.cancel_token.clone());

        run.total_bytes_scanned = scan.total_bytes;
        run.errors.extend(scan.errors.iter().cloned());

        // Paths still present in the source, including recorded files under
        // directories the scan could not read
        let mut current_paths: BTreeSet<String> =
            scan.files.iter().map(|f| f.relative_path.clone()).collect();
        current_paths.extend(
            previous
                .keys()
                .filter(|path| scan.is_unreadable(path))
                .cloned(),
        );
        // Every path that owns an artifact location during this run
        let claimed: BTreeSet<String> = current_paths
            .iter()
            .chain(previous.keys())
            .cloned()
            .collect();
        let source_paths: HashMap<String, PathBuf> = scan
            .files
            .iter()
            .map(|f| (f.relative_path.clone(), f.path.clone()))
            .collect();

        info!("Scanned {} files ({} bytes)", scan.files.len(), scan.total_bytes);
        self.events.emit(RunEvent::ScanCompleted {
            total_files: scan.files.len(),
            total_bytes: scan.total_bytes,
        });

        // DIGEST
        self.enter(RunStage::Digest)?;
        let digest_events = self.events.clone();
        let digested = runner
            .run(scan.files, digest_candidate, |processed, total| {
                digest_events.emit(RunEvent::DigestProgress { processed, total });
            })
            .await;
        self.check_interrupted(digested.cancelled)?;

        let mut records = Vec::with_capacity(digested.results.len());
        for result in digested.results {
            match result {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!("{}", e);
                    run.record_error(e.to_string());
                }
            }
        }
        let digested_count = records.len();
        info!("{} files hashed successfully", digested_count);

        // DIFF
        self.enter(RunStage::Diff)?;
        let diff = diff_against_table(records, &previous, job.algorithm);
        // An unchanged file whose compressed artifact location now belongs
        // to another file has lost its artifact and is written again plain
        let (unchanged, displaced): (Vec<FileRecord>, Vec<FileRecord>) =
            diff.unchanged.into_iter().partition(|record| {
                !claimed.contains(&compressed_alias(&record.relative_path))
                    || artifact_path(&dest, &record.relative_path, false).is_file()
            });
        if !displaced.is_empty() {
            debug!("{} unchanged files lost their compressed artifact", displaced.len());
        }

        run.files_skipped = unchanged.len();
        let mut to_copy = diff.changed;
        to_copy.extend(displaced);
        // Smallest first so many small files finish early
        to_copy.sort_by_key(|r| r.size);
        let copy_total = to_copy.len();

        info!("Files to backup: {} (skipped: {})", copy_total, run.files_skipped);
        self.events.emit(RunEvent::DiffCompleted {
            to_copy: copy_total,
            skipped: run.files_skipped,
        });

        let mut baseline: DigestTable = unchanged
            .into_iter()
            .map(|r| (r.relative_path.clone(), r))
            .collect();

        // COPY
        self.enter(RunStage::Copy)?;
        let items: Vec<(FileRecord, PathBuf)> = to_copy
            .into_iter()
            .map(|record| {
                let src = source_paths
                    .get(&record.relative_path)
                    .cloned()
                    .unwrap_or_else(|| source.join(&record.relative_path));
                (record, src)
            })
            .collect();

        let copy_dest = Arc::new(dest.clone());
        let copy_options = Arc::new(options.clone());
        let copy_claimed = Arc::new(claimed);
        let copy_events = self.events.clone();
        let copied = runner
            .run(
                items,
                move |(record, src): (FileRecord, PathBuf)| {
                    let outcome =
                        copy_file(&record, &src, &copy_dest, &copy_options, &copy_claimed)?;
                    Ok((outcome, record))
                },
                |processed, total| {
                    copy_events.emit(RunEvent::CopyProgress { processed, total });
                },
            )
            .await;
        self.check_interrupted(copied.cancelled)?;

        for result in copied.results {
            match result {
                Ok((outcome, record)) => {
                    run.files_copied += 1;
                    run.bytes_transferred += outcome.bytes;
                    self.emit_copied(&outcome);
                    baseline.insert(record.relative_path.clone(), record);
                }
                Err(e) => {
                    warn!("{}", e);
                    run.record_error(e.to_string());
                }
            }
        }
        let files_failed = copy_total - run.files_copied;
        debug_assert_eq!(run.files_copied + run.files_skipped + files_failed, digested_count);

        // Files that could not be read, digested or copied keep their
        // previous baseline so the next run re-examines them against it.
        for path in &current_paths {
            if !baseline.contains_key(path) {
                if let Some(record) = previous.get(path) {
                    baseline.insert(path.clone(), record.clone());
                }
            }
        }

        // PRUNE
        self.enter(RunStage::Prune)?;
        let prune_dest = dest.clone();
        let prune_options = options.clone();
        let pruned = tokio::task::spawn_blocking(move || {
            prune_vanished(&previous, &current_paths, &prune_dest, &prune_options)
        })
        .await
        .map_err(|e| BackupError::Task(e.to_string()))?;

        run.files_removed = pruned.removed.len();
        run.errors.extend(pruned.errors);
        for path in pruned.removed {
            self.events.emit(RunEvent::FileRemoved { path });
        }

        // PERSIST
        self.enter(RunStage::Persist)?;
        if job.dry_run {
            info!("Dry run: destination and state left untouched");
        } else if let Err(e) = persist_run(&dest, &run, &baseline) {
            warn!("Failed to persist run state: {}", e);
            run.record_error(format!("Cannot save manifest: {}", e));
        }

        // SUMMARY
        debug!("Entering stage {:?}", RunStage::Summary);
        info!(
            "Backup completed: {} copied, {} skipped, {} removed, {} bytes, {} errors, {}s",
            run.files_copied,
            run.files_skipped,
            run.files_removed,
            run.bytes_transferred,
            run.errors.len(),
            started.elapsed().as_secs()
        );
        self.events.emit(RunEvent::Completed {
            errors: run.errors.len(),
        });

        Ok(run)
    }

    /// Stage boundary: no stage starts once the user interrupted the run
    fn enter(&self, stage: RunStage) -> Result<()> {
        if self.cancel_token.is_cancelled() {
            info!("Backup interrupted before stage {:?}", stage);
            self.events.emit(RunEvent::Interrupted);
            return Err(BackupError::Interrupted);
        }
        debug!("Entering stage {:?}", stage);
        Ok(())
    }

    fn check_interrupted(&self, cancelled_tasks: usize) -> Result<()> {
        if cancelled_tasks > 0 || self.cancel_token.is_cancelled() {
            info!("Backup interrupted: {} tasks never started", cancelled_tasks);
            self.events.emit(RunEvent::Interrupted);
            return Err(BackupError::Interrupted);
        }
        Ok(())
    }

    fn emit_copied(&self, outcome: &CopyOutcome) {
        self.events.emit(RunEvent::FileCopied {
            path: outcome.relative_path.clone(),
            bytes: outcome.bytes,
            compressed: outcome.compressed,
        });
    }
}

/// Stat and digest one scanned file.
fn digest_candidate(file: FileInfo) -> Result<FileRecord> {
    let digest_err = |source: std::io::Error| BackupError::Digest {
        path: file.path.display().to_string(),
        source,
    };

    let metadata = FileMetadata::from_path(&file.path).map_err(digest_err)?;
    let digests = digest_file(&file.path).map_err(digest_err)?;

    Ok(FileRecord::new(
        file.relative_path.clone(),
        metadata.size,
        metadata.modified,
        digests,
    ))
}

/// Absolute form of a path that may not exist yet
fn absolute_path(path: &Path) -> Result<PathBuf> {
    if path.exists() {
        return Ok(std::fs::canonicalize(path)?);
    }
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}
