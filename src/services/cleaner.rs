//! Removal of files classified as corrupt
//!
//! Deletion is permanent. Nothing is backed up or moved to a quarantine
//! directory first.

use std::io;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use super::classification::MediaFile;

/// The filesystem refused to remove one file
#[derive(Debug, Error)]
#[error("could not delete '{}': {source}", path.display())]
pub struct DeletionError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeletionFailure {
    pub path: PathBuf,
    pub error: String,
}

impl From<DeletionError> for DeletionFailure {
    fn from(err: DeletionError) -> Self {
        Self {
            error: err.source.to_string(),
            path: err.path,
        }
    }
}

/// What the deletion pass did, or would have done in a dry run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeletionReport {
    pub dry_run: bool,
    pub removed: Vec<PathBuf>,
    pub would_remove: Vec<PathBuf>,
    pub failures: Vec<DeletionFailure>,
}

impl DeletionReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Remove every file in `corrupt`, one at a time.
///
/// A failure on one path is recorded and the rest are still attempted. With
/// `dry_run` nothing on disk is touched and the report lists what would go.
pub async fn apply(corrupt: &[MediaFile], dry_run: bool) -> DeletionReport {
    let mut report = DeletionReport {
        dry_run,
        ..Default::default()
    };

    if dry_run {
        report.would_remove = corrupt.iter().map(|f| f.path().to_path_buf()).collect();
        info!(count = report.would_remove.len(), "Dry run, no files deleted");
        return report;
    }

    for file in corrupt {
        match remove(file).await {
            Ok(path) => {
                info!(path = %path.display(), "Deleted corrupt file");
                report.removed.push(path);
            }
            Err(e) => {
                warn!(error = %e, "Deletion failed");
                report.failures.push(e.into());
            }
        }
    }

    info!(
        removed = report.removed.len(),
        failed = report.failures.len(),
        "Deletion pass complete"
    );

    report
}

/// Unlink one file. Symlinks are removed themselves, never their targets.
async fn remove(file: &MediaFile) -> Result<PathBuf, DeletionError> {
    let path = file.path().to_path_buf();
    match tokio::fs::remove_file(&path).await {
        Ok(()) => Ok(path),
        Err(source) => Err(DeletionError { path, source }),
    }
}
