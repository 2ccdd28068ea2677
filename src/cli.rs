//! Command line interface

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::config::{ConfigError, DEFAULT_LOG_PATH, DEFAULT_TIMEOUT_SECS, ScanConfig, default_workers};
use crate::services::logging::LogFormat;
use crate::services::probe::DEFAULT_PROBE_PROGRAM;
use crate::services::scanner::ExtensionFilter;

#[derive(Debug, Parser)]
#[command(name = "playcheck", version, about = "Detect and delete media files that do not play")]
pub struct Cli {
    /// Diagnostic log format on stderr
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty, global = true)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Probe every media file and delete the ones that fail
    Scan(ScanArgs),
    /// Count files by extension
    Extensions(ExtensionsArgs),
    /// Copy files into one folder per extension
    Sort(SortArgs),
}

#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Directory to scan recursively
    pub directory: PathBuf,

    /// Number of probes to run in parallel [default: available CPUs]
    #[arg(long, env = "PLAYCHECK_WORKERS")]
    pub workers: Option<usize>,

    /// Report corrupt files without deleting them
    #[arg(long, env = "PLAYCHECK_DRY_RUN")]
    pub dry_run: bool,

    /// Seconds a single file may take before it counts as corrupt
    #[arg(long, env = "PLAYCHECK_TIMEOUT", default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout: u64,

    /// Path to the classification log
    #[arg(long = "log", env = "PLAYCHECK_LOG", default_value = DEFAULT_LOG_PATH)]
    pub log_path: PathBuf,

    /// Media extensions to check, comma separated [default: common video formats]
    #[arg(long = "ext", env = "PLAYCHECK_EXTENSIONS", value_delimiter = ',')]
    pub extensions: Vec<String>,

    /// Player binary used to probe files
    #[arg(long, env = "PLAYCHECK_PROBE", default_value = DEFAULT_PROBE_PROGRAM)]
    pub probe_program: String,

    /// Print the run summary as JSON on stdout
    #[arg(long)]
    pub json: bool,

    /// Hide the progress bar
    #[arg(long, short)]
    pub quiet: bool,
}

impl ScanArgs {
    pub fn to_config(&self) -> Result<ScanConfig, ConfigError> {
        let extensions = if self.extensions.is_empty() {
            ExtensionFilter::default()
        } else {
            ExtensionFilter::new(&self.extensions)
        };

        let config = ScanConfig {
            directory: self.directory.clone(),
            workers: self.workers.unwrap_or_else(default_workers),
            dry_run: self.dry_run,
            timeout: Duration::from_secs(self.timeout),
            log_path: self.log_path.clone(),
            extensions,
            probe_program: self.probe_program.clone(),
            show_progress: !self.quiet && !self.json,
        };
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Args)]
pub struct ExtensionsArgs {
    /// Directory to scan recursively
    pub directory: PathBuf,
}

#[derive(Debug, Args)]
pub struct SortArgs {
    /// Directory to read files from
    pub source: PathBuf,

    /// Directory receiving one subfolder per extension
    pub destination: PathBuf,
}
