//! Backup Engine - Main entry point
//!
//! Incremental, verifiable file backup from the command line.

use anyhow::Result;
use backup_engine::events::{EventSink, RunEvent};
use backup_engine::executor::pool::TaskRunner;
use backup_engine::shutdown::ShutdownCoordinator;
use backup_engine::state::verify::verify;
use backup_engine::transfer::progress::{format_bytes, format_duration, PhaseProgress};
use backup_engine::{
    utils, BackupError, BackupExecutor, BackupJob, BackupRun, Config, DigestAlgorithm,
};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;

/// Problems listed when verification fails
const VERIFY_PROBLEMS_SHOWN: usize = 5;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Incremental file backup with integrity verification",
    long_about = None
)]
struct Args {
    /// Directory (or single file) to back up
    #[arg(required_unless_present = "verify")]
    source: Option<PathBuf>,

    /// Backup destination directory
    #[arg(required_unless_present = "verify")]
    dest: Option<PathBuf>,

    /// Gzip files larger than the compression threshold
    #[arg(short, long)]
    compress: bool,

    /// Digest algorithm used for change detection
    #[arg(short, long, value_enum)]
    algorithm: Option<DigestAlgorithm>,

    /// Number of worker threads
    #[arg(short, long)]
    threads: Option<usize>,

    /// Report what would change without touching the destination
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Skip paths containing PATTERN (repeatable)
    #[arg(short, long = "exclude", value_name = "PATTERN")]
    exclude: Vec<String>,

    /// Print per-file actions and the error list
    #[arg(short, long)]
    verbose: bool,

    /// Verify the backup described by this manifest and exit
    #[arg(long, value_name = "MANIFEST_PATH")]
    verify: Option<PathBuf>,

    /// Path to configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Load configuration
    let mut config = if let Some(config_path) = &args.config {
        Config::from_file(config_path)?
    } else {
        Config::default()
    };
    apply_overrides(&mut config, &args);
    config.validate()?;

    // Initialize logging
    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    utils::logger::init(log_level)?;

    tracing::info!("Starting backup-engine v{}", env!("CARGO_PKG_VERSION"));

    if let Some(manifest_path) = &args.verify {
        return run_verify(manifest_path, &config).await;
    }

    let (Some(source), Some(dest)) = (args.source.clone(), args.dest.clone()) else {
        anyhow::bail!("source and dest are required");
    };

    let mut job = BackupJob::from_config(source, dest, &config.backup);
    job.dry_run = args.dry_run;

    print_banner(&job);

    let shutdown = ShutdownCoordinator::new();
    let listener = shutdown.listen();

    let (events, rx) = EventSink::channel();
    let printer = tokio::spawn(print_events(rx, args.verbose));

    let executor = BackupExecutor::with_cancel(shutdown.token()).with_events(events);
    let start = std::time::Instant::now();
    let outcome = executor.execute(job).await;

    // Close the event channel so the printer drains and exits
    drop(executor);
    let _ = printer.await;
    listener.abort();

    match outcome {
        Ok(run) => {
            let elapsed = start.elapsed().as_secs();
            print_summary(&run, elapsed, args.verbose, config.log.max_errors_shown);
            Ok(if run.has_errors() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            })
        }
        Err(BackupError::Interrupted) => {
            eprintln!("\nBackup interrupted by user");
            Ok(ExitCode::from(130))
        }
        Err(e) => {
            tracing::error!("Backup failed: {}", e);
            eprintln!("Error: {}", e);
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Command-line flags win over the configuration file
fn apply_overrides(config: &mut Config, args: &Args) {
    if args.compress {
        config.backup.compress = true;
    }
    if let Some(algorithm) = args.algorithm {
        config.backup.algorithm = algorithm;
    }
    if let Some(threads) = args.threads {
        config.backup.threads = threads;
    }
    config.backup.exclude.extend(args.exclude.iter().cloned());
}

async fn run_verify(manifest_path: &Path, config: &Config) -> Result<ExitCode> {
    println!("Verifying backup: {}", manifest_path.display());

    let runner = TaskRunner::new(config.backup.threads, CancellationToken::new());
    let report = match verify(manifest_path, &runner).await {
        Ok(report) => report,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(ExitCode::FAILURE);
        }
    };

    if report.passed() {
        println!("Verification passed: {} files intact", report.checked);
        return Ok(ExitCode::SUCCESS);
    }

    let problems = report.problems();
    println!(
        "Verification failed: {} of {} files have problems",
        problems.len(),
        report.checked
    );
    for problem in problems.iter().take(VERIFY_PROBLEMS_SHOWN) {
        println!("  {}", problem);
    }
    if problems.len() > VERIFY_PROBLEMS_SHOWN {
        println!("  ... and {} more", problems.len() - VERIFY_PROBLEMS_SHOWN);
    }
    Ok(ExitCode::FAILURE)
}

fn print_banner(job: &BackupJob) {
    println!("{}", "=".repeat(60));
    println!("Backup Engine v{}", env!("CARGO_PKG_VERSION"));
    println!("{}", "=".repeat(60));
    println!("Source:      {}", job.source.display());
    println!("Destination: {}", job.destination.display());
    println!("Algorithm:   {}", job.algorithm);
    println!("Compression: {}", if job.compress { "enabled" } else { "disabled" });
    println!("Threads:     {}", job.threads);
    if job.dry_run {
        println!("Mode:        DRY RUN (no changes will be made)");
    }
    println!("{}", "=".repeat(60));
}

/// Render run events until the executor drops its sink
async fn print_events(mut rx: UnboundedReceiver<RunEvent>, verbose: bool) {
    let mut digest_progress = PhaseProgress::new(0, 100);
    let mut copy_progress = PhaseProgress::new(0, 10);

    while let Some(event) = rx.recv().await {
        match event {
            RunEvent::Started { run_id, previous_records } => {
                println!("Backup ID:   {}", run_id);
                if previous_records > 0 {
                    println!("Previous backup has {} files", previous_records);
                }
            }
            RunEvent::ScanCompleted { total_files, total_bytes } => {
                println!("Found {} files ({})", total_files, format_bytes(total_bytes));
                digest_progress = PhaseProgress::new(total_files, 100);
            }
            RunEvent::DigestProgress { processed, total } => {
                if digest_progress.update(processed) {
                    println!("  {}/{} files hashed", processed, total);
                }
            }
            RunEvent::DiffCompleted { to_copy, skipped } => {
                println!("Files to back up: {} (unchanged: {})", to_copy, skipped);
                copy_progress = PhaseProgress::new(to_copy, 10);
            }
            RunEvent::CopyProgress { processed, total } => {
                if copy_progress.update(processed) {
                    println!(
                        "  {}/{} files ({:.0}%)",
                        processed,
                        total,
                        copy_progress.percent_complete()
                    );
                }
            }
            RunEvent::FileCopied { path, bytes, compressed } => {
                if verbose {
                    let suffix = if compressed { ", gz" } else { "" };
                    println!("  + {} ({}{})", path, format_bytes(bytes), suffix);
                }
            }
            RunEvent::FileRemoved { path } => {
                if verbose {
                    println!("  - {}", path);
                }
            }
            RunEvent::Completed { .. } | RunEvent::Interrupted => {}
        }
    }
}

fn print_summary(run: &BackupRun, elapsed_secs: u64, verbose: bool, max_errors_shown: usize) {
    println!("{}", "=".repeat(60));
    println!("Backup Summary");
    println!("{}", "=".repeat(60));
    println!("Files backed up:   {}", run.files_copied);
    println!("Files skipped:     {}", run.files_skipped);
    println!("Files removed:     {}", run.files_removed);
    println!("Data transferred:  {}", format_bytes(run.bytes_transferred));
    println!("Total scanned:     {}", format_bytes(run.total_bytes_scanned));
    println!("Duration:          {}", format_duration(elapsed_secs));
    println!("Errors:            {}", run.errors.len());

    if verbose && run.has_errors() {
        println!("\nErrors:");
        for error in run.errors.iter().take(max_errors_shown) {
            println!("  - {}", error);
        }
        if run.errors.len() > max_errors_shown {
            println!("  ... and {} more", run.errors.len() - max_errors_shown);
        }
    }
    println!("{}", "=".repeat(60));
}
