//! Run configuration
//!
//! Values arrive from CLI flags, which fall back to environment variables
//! (a `.env` file is loaded first), which fall back to the defaults here.

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::services::probe::DEFAULT_PROBE_PROGRAM;
use crate::services::scanner::ExtensionFilter;

/// Per-file probe budget in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Log file written next to where the tool is run
pub const DEFAULT_LOG_PATH: &str = "video_scan.log";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("worker count must be at least 1")]
    ZeroWorkers,

    #[error("per-file timeout must be greater than zero")]
    ZeroTimeout,

    #[error("at least one media extension is required")]
    NoExtensions,

    #[error("probe program must not be empty")]
    EmptyProbeProgram,
}

/// Everything one verification run needs
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Directory to scan recursively
    pub directory: PathBuf,

    /// Probes allowed in flight at once
    pub workers: usize,

    /// Classify and report, but delete nothing
    pub dry_run: bool,

    /// Hard limit for one probe
    pub timeout: Duration,

    /// Append-only classification log (truncated at the start of a run)
    pub log_path: PathBuf,

    /// Extensions that make a file a candidate
    pub extensions: ExtensionFilter,

    /// Player binary used by the command probe
    pub probe_program: String,

    /// Draw a progress bar on stderr
    pub show_progress: bool,
}

impl ScanConfig {
    /// Defaults for scanning `directory`
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            workers: default_workers(),
            dry_run: false,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            log_path: PathBuf::from(DEFAULT_LOG_PATH),
            extensions: ExtensionFilter::default(),
            probe_program: DEFAULT_PROBE_PROGRAM.to_string(),
            show_progress: true,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::ZeroWorkers);
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.extensions.is_empty() {
            return Err(ConfigError::NoExtensions);
        }
        if self.probe_program.trim().is_empty() {
            return Err(ConfigError::EmptyProbeProgram);
        }
        Ok(())
    }
}

/// Host parallelism, or 1 when it cannot be determined
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}
