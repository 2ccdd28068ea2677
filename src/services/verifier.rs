//! Verification run
//!
//! Wires one run together: discover the queue, probe it through a fresh
//! worker pool, wait for every classification, then hand the corrupt set to
//! the cleaner.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

use crate::config::ScanConfig;

use super::aggregator::{Classification, ResultAggregator};
use super::cleaner::{self, DeletionReport};
use super::pool::WorkerPool;
use super::probe::PlaybackProbe;
use super::scanner::discover;

/// Outcome of one run, printed at the end and optionally emitted as JSON
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub directory: PathBuf,
    pub total: usize,
    pub good: usize,
    pub corrupt: usize,
    pub unavailable: usize,
    /// Files never probed because the run was interrupted
    pub unclassified: usize,
    pub log_path: PathBuf,
    /// False for a zero-work run, which leaves the filesystem alone
    pub log_written: bool,
    pub dry_run: bool,
    pub interrupted: bool,
    /// Absent when deletion was skipped
    pub deletion: Option<DeletionReport>,
    pub classification: Classification,
    pub elapsed_ms: u64,
}

impl RunSummary {
    fn empty(run_id: Uuid, config: &ScanConfig) -> Self {
        Self {
            run_id,
            directory: config.directory.clone(),
            total: 0,
            good: 0,
            corrupt: 0,
            unavailable: 0,
            unclassified: 0,
            log_path: config.log_path.clone(),
            log_written: false,
            dry_run: config.dry_run,
            interrupted: false,
            deletion: None,
            classification: Classification::default(),
            elapsed_ms: 0,
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.total == 0 {
            return writeln!(f, "No video files found.");
        }

        writeln!(f, "=== Scan Complete ===")?;
        writeln!(f, "Good videos:      {}", self.good)?;
        writeln!(f, "Corrupted videos: {}", self.corrupt)?;
        if self.unavailable > 0 {
            writeln!(f, "Unavailable:      {}", self.unavailable)?;
        }
        writeln!(f, "Log written to:   {}", self.log_path.display())?;

        if self.interrupted {
            writeln!(f)?;
            writeln!(
                f,
                "Interrupted: {} files left unclassified. No files deleted.",
                self.unclassified
            )?;
        }

        if let Some(deletion) = &self.deletion {
            if !deletion.removed.is_empty() || !deletion.failures.is_empty() {
                writeln!(f)?;
                writeln!(f, "Deleting corrupted files...")?;
            }
            for path in &deletion.removed {
                writeln!(f, "Deleted: {}", path.display())?;
            }
            for failure in &deletion.failures {
                writeln!(f, "Could not delete {}: {}", failure.path.display(), failure.error)?;
            }
            for path in &deletion.would_remove {
                writeln!(f, "Would delete: {}", path.display())?;
            }
        }

        if self.dry_run {
            writeln!(f)?;
            writeln!(f, "Dry run mode: No files deleted.")?;
        }

        Ok(())
    }
}

/// Verify every media file under `config.directory`.
///
/// Errors only when the run cannot start (bad config, unreadable directory,
/// log file cannot be created). Per-file failures end up in the summary.
pub async fn verify(
    config: &ScanConfig,
    probe: Arc<dyn PlaybackProbe>,
    cancel: CancellationToken,
) -> Result<RunSummary> {
    config.validate()?;

    let run_id = Uuid::new_v4();
    let span = info_span!("verify", run_id = %run_id, directory = %config.directory.display());
    run(run_id, config, probe, cancel).instrument(span).await
}

async fn run(
    run_id: Uuid,
    config: &ScanConfig,
    probe: Arc<dyn PlaybackProbe>,
    cancel: CancellationToken,
) -> Result<RunSummary> {
    let started = Instant::now();

    let directory = config.directory.clone();
    let filter = config.extensions.clone();
    let queue = tokio::task::spawn_blocking(move || discover(&directory, &filter))
        .await
        .context("Discovery task failed")??;

    let total = queue.len();
    if total == 0 {
        info!("No media files found, nothing to do");
        let mut summary = RunSummary::empty(run_id, config);
        summary.elapsed_ms = started.elapsed().as_millis() as u64;
        return Ok(summary);
    }

    if !probe.is_available().await {
        warn!(
            program = %config.probe_program,
            "Player not found on this host; files will be recorded as UNAVAILABLE"
        );
    }

    let aggregator = Arc::new(
        ResultAggregator::create(&config.log_path, progress_bar(config, total)).with_context(
            || format!("Failed to create log file '{}'", config.log_path.display()),
        )?,
    );

    info!(
        files = total,
        workers = config.workers,
        timeout = ?config.timeout,
        dry_run = config.dry_run,
        "Scanning video files"
    );

    let pool = WorkerPool::with_cancellation(config.workers, cancel)?;
    let report = pool
        .run(queue, probe, config.timeout, Arc::clone(&aggregator))
        .await;

    let mut summary = RunSummary::empty(run_id, config);
    summary.total = total;
    summary.log_path = aggregator.log_path().to_path_buf();
    summary.log_written = true;
    summary.unclassified = report.unclassified;
    summary.interrupted = report.cancelled;

    // Nothing is deleted unless every queued file has a recorded verdict
    let classification = match aggregator.finish(total) {
        Ok(classification) => classification,
        Err(incomplete) => {
            warn!(
                observed = incomplete.observed,
                expected = incomplete.expected,
                "Classification incomplete, skipping deletion"
            );
            summary.interrupted = true;
            summary.unclassified = incomplete.expected.saturating_sub(incomplete.observed);
            fill_counts(&mut summary, incomplete.partial);
            summary.elapsed_ms = started.elapsed().as_millis() as u64;
            return Ok(summary);
        }
    };

    if report.cancelled {
        warn!("Run interrupted, skipping deletion");
        fill_counts(&mut summary, classification);
        summary.elapsed_ms = started.elapsed().as_millis() as u64;
        return Ok(summary);
    }

    if !classification.corrupt_unlogged.is_empty() {
        warn!(
            count = classification.corrupt_unlogged.len(),
            "Corrupt files without a log record are kept"
        );
    }

    // Irreversible: corrupt files are unlinked in place, with no backup and
    // no quarantine. --dry-run is the only preview.
    let deletion = cleaner::apply(&classification.corrupt, config.dry_run).await;
    summary.deletion = Some(deletion);

    fill_counts(&mut summary, classification);
    summary.elapsed_ms = started.elapsed().as_millis() as u64;

    info!(
        good = summary.good,
        corrupt = summary.corrupt,
        unavailable = summary.unavailable,
        elapsed_ms = summary.elapsed_ms,
        "Scan complete"
    );

    Ok(summary)
}

fn fill_counts(summary: &mut RunSummary, classification: Classification) {
    let classification = classification.normalized();
    summary.good = classification.good.len();
    summary.corrupt = classification.corrupt_count();
    summary.unavailable = classification.unavailable.len();
    summary.classification = classification;
}

fn progress_bar(config: &ScanConfig, total: usize) -> ProgressBar {
    if !config.show_progress {
        return ProgressBar::hidden();
    }

    let bar = ProgressBar::new(total as u64);
    let style = ProgressStyle::with_template(
        "{msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
    )
    .map(|s| s.progress_chars("=> "))
    .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style);
    bar.set_message("Checking videos");
    bar
}
