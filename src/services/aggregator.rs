//! Result aggregation
//!
//! Workers hand their classification straight to the aggregator as soon as a
//! probe finishes. Each record is appended to the durable log, sorted into the
//! good, corrupt or unavailable set, and counted, all under one short lock.
//! Nothing slow happens while the lock is held.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use indicatif::ProgressBar;
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::classification::{ClassificationResult, MediaFile, Verdict};

/// Fewer results were observed than files were submitted
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("classification incomplete: observed {observed} of {expected} results")]
pub struct IncompleteClassification {
    pub observed: usize,
    pub expected: usize,
    /// What was recorded before the run stopped; for reporting only
    pub partial: Classification,
}

/// Sealed outcome of a completed classification
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub good: Vec<MediaFile>,
    /// Corrupt files whose CORRUPT record reached the log
    pub corrupt: Vec<MediaFile>,
    /// Corrupt files whose record could not be written; never deleted
    pub corrupt_unlogged: Vec<MediaFile>,
    pub unavailable: Vec<MediaFile>,
}

impl Classification {
    pub fn corrupt_count(&self) -> usize {
        self.corrupt.len() + self.corrupt_unlogged.len()
    }

    pub fn total(&self) -> usize {
        self.good.len() + self.corrupt_count() + self.unavailable.len()
    }

    /// Sort every set by path so two runs over the same tree compare equal
    pub fn normalized(mut self) -> Self {
        self.good.sort();
        self.corrupt.sort();
        self.corrupt_unlogged.sort();
        self.unavailable.sort();
        self
    }
}

struct AggregatorState {
    log: Box<dyn Write + Send>,
    /// Per-file echoes when the progress bar is hidden
    console: Box<dyn Write + Send>,
    sets: Classification,
    observed: usize,
    warned_unavailable: bool,
}

/// Collects classification results from concurrent workers
pub struct ResultAggregator {
    state: Mutex<AggregatorState>,
    progress: ProgressBar,
    log_path: PathBuf,
}

impl ResultAggregator {
    /// Create (or truncate) the log file at `log_path`
    pub fn create(log_path: &Path, progress: ProgressBar) -> io::Result<Self> {
        let file = File::create(log_path)?;
        Ok(Self::with_writer(BufWriter::new(file), log_path, progress))
    }

    /// Aggregate into an arbitrary writer; `log_path` is only reported
    pub fn with_writer(
        writer: impl Write + Send + 'static,
        log_path: &Path,
        progress: ProgressBar,
    ) -> Self {
        Self {
            state: Mutex::new(AggregatorState {
                log: Box::new(writer),
                console: Box::new(io::stderr()),
                sets: Classification::default(),
                observed: 0,
                warned_unavailable: false,
            }),
            progress,
            log_path: log_path.to_path_buf(),
        }
    }

    /// Send per-file echoes to `console` instead of stderr
    pub fn with_console(self, console: impl Write + Send + 'static) -> Self {
        self.state.lock().console = Box::new(console);
        self
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Number of results recorded so far
    pub fn observed(&self) -> usize {
        self.state.lock().observed
    }

    /// Record one result: log line, set membership and progress, atomically
    pub fn record(&self, result: ClassificationResult) {
        let line = result.log_line();
        let mut state = self.state.lock();

        let logged = match state.log.write_all(line.as_bytes()).and_then(|_| state.log.flush()) {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    path = %result.file,
                    log = %self.log_path.display(),
                    error = %e,
                    "Failed to append classification to log"
                );
                false
            }
        };

        let first_result = state.observed == 0;
        state.observed += 1;
        self.progress.inc(1);

        match result.verdict {
            Verdict::Ok => {
                debug!(path = %result.file, "Playable");
                state.sets.good.push(result.file);
            }
            Verdict::Corrupt => {
                let reason = result.reason.as_deref().unwrap_or_default();
                info!(path = %result.file, reason = %reason, "Corrupt");
                self.echo(&mut state, line.trim_end());
                if logged {
                    state.sets.corrupt.push(result.file);
                } else {
                    state.sets.corrupt_unlogged.push(result.file);
                }
            }
            Verdict::Unavailable => {
                let reason = result.reason.as_deref().unwrap_or_default();
                if !state.warned_unavailable {
                    state.warned_unavailable = true;
                    if first_result {
                        warn!(
                            reason = %reason,
                            "The very first probe could not run; the player is probably not installed and this run is unlikely to mean anything"
                        );
                    } else {
                        warn!(reason = %reason, "Player became unavailable during the run");
                    }
                    let banner = format!("WARNING: player unavailable: {}", reason);
                    self.echo(&mut state, &banner);
                }
                debug!(path = %result.file, reason = %reason, "Unavailable");
                self.echo(&mut state, line.trim_end());
                state.sets.unavailable.push(result.file);
            }
        }
    }

    /// Print one line above the progress bar, or straight to the console
    /// when the bar is hidden and would swallow it
    fn echo(&self, state: &mut AggregatorState, text: &str) {
        if !self.progress.is_hidden() {
            self.progress.println(text);
            return;
        }
        if let Err(e) = writeln!(state.console, "{}", text) {
            debug!(error = %e, "Failed to echo result");
        }
    }

    /// Read barrier: hand out the sets only once exactly `expected` results
    /// have been recorded.
    pub fn finish(&self, expected: usize) -> Result<Classification, IncompleteClassification> {
        let mut state = self.state.lock();
        if let Err(e) = state.log.flush() {
            warn!(log = %self.log_path.display(), error = %e, "Failed to flush log");
        }
        self.progress.finish_and_clear();

        if state.observed != expected {
            return Err(IncompleteClassification {
                observed: state.observed,
                expected,
                partial: std::mem::take(&mut state.sets),
            });
        }

        Ok(std::mem::take(&mut state.sets))
    }
}
