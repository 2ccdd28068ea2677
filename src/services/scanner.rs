//! Media file discovery
//!
//! Walks a directory tree and builds the queue of files to verify. The queue
//! is fixed for the rest of the run.

use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::classification::MediaFile;

/// Video file extensions recognized by default
pub const DEFAULT_VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mov", "avi", "wmv", "mkv", "flv", "mpeg", "mpg", "3gp",
];

/// The target directory cannot be scanned at all
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("directory '{0}' does not exist")]
    NotFound(PathBuf),

    #[error("'{0}' is not a directory")]
    NotADirectory(PathBuf),

    #[error("directory '{path}' is not readable: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Case-insensitive set of extensions, stored lower-case without the dot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionFilter(BTreeSet<String>);

impl ExtensionFilter {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            extensions
                .into_iter()
                .map(|e| e.as_ref().trim().trim_start_matches('.').to_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
        )
    }

    pub fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| self.0.contains(&e.to_lowercase()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl Default for ExtensionFilter {
    fn default() -> Self {
        Self::new(DEFAULT_VIDEO_EXTENSIONS)
    }
}

/// Files to verify, sorted by path
#[derive(Debug, Clone, Default)]
pub struct TaskQueue {
    files: Vec<MediaFile>,
    skipped: usize,
}

impl TaskQueue {
    pub fn from_files(mut files: Vec<MediaFile>) -> Self {
        files.sort();
        files.dedup();
        Self { files, skipped: 0 }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn files(&self) -> &[MediaFile] {
        &self.files
    }

    /// Entries below the root that could not be read during the walk
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn into_files(self) -> Vec<MediaFile> {
        self.files
    }
}

/// Resolve `root` to an absolute directory we are allowed to list
pub fn resolve_root(root: &Path) -> Result<PathBuf, DiscoveryError> {
    let canonical = root.canonicalize().map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => DiscoveryError::NotFound(root.to_path_buf()),
        _ => DiscoveryError::Unreadable {
            path: root.to_path_buf(),
            source: e,
        },
    })?;

    if !canonical.is_dir() {
        return Err(DiscoveryError::NotADirectory(root.to_path_buf()));
    }

    std::fs::read_dir(&canonical).map_err(|e| DiscoveryError::Unreadable {
        path: root.to_path_buf(),
        source: e,
    })?;

    Ok(canonical)
}

/// Walk `root` and queue every regular file whose extension is in `filter`.
/// Symlinks are not followed.
pub fn discover(root: &Path, filter: &ExtensionFilter) -> Result<TaskQueue, DiscoveryError> {
    let root = resolve_root(root)?;
    debug!(root = %root.display(), extensions = ?filter, "Discovering media files");

    let mut files = Vec::new();
    let mut skipped = 0;

    for entry in WalkDir::new(&root).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable entry");
                skipped += 1;
                continue;
            }
        };

        if entry.file_type().is_file() && filter.matches(entry.path()) {
            files.push(MediaFile::new(entry.into_path()));
        }
    }

    let mut queue = TaskQueue::from_files(files);
    queue.skipped = skipped;

    info!(
        root = %root.display(),
        total = queue.len(),
        skipped = queue.skipped,
        "Found media files to verify"
    );

    Ok(queue)
}
