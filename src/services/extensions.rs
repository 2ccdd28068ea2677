//! Extension census and extension-based sorting
//!
//! Both walk every file under a directory, regardless of type. Useful before
//! a scan to pick the `--ext` set, and for sorting recovered files.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::scanner::resolve_root;

/// Bucket for files without an extension
pub const NO_EXTENSION: &str = "no_extension";

/// Lower-cased extension of `path`, or [`NO_EXTENSION`]
pub fn extension_key(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .map(|e| e.to_lowercase())
        .unwrap_or_else(|| NO_EXTENSION.to_string())
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtensionCensus {
    pub total_files: usize,
    /// Sorted by descending count, then by extension
    pub counts: Vec<(String, usize)>,
}

/// Count every file under `root` by extension
pub fn census(root: &Path) -> Result<ExtensionCensus> {
    let root = resolve_root(root)?;
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut total_files = 0;

    for entry in WalkDir::new(&root).into_iter().filter_map(|e| e.ok()) {
        if entry.file_type().is_file() {
            total_files += 1;
            *counts.entry(extension_key(entry.path())).or_default() += 1;
        }
    }

    let mut counts: Vec<(String, usize)> = counts.into_iter().collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    info!(root = %root.display(), total_files, extensions = counts.len(), "Extension census complete");

    Ok(ExtensionCensus {
        total_files,
        counts,
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SortReport {
    pub copied: Vec<(PathBuf, PathBuf)>,
    pub failures: Vec<(PathBuf, String)>,
}

/// Copy every file under `source` into `dest/<extension>/`.
///
/// Existing files are never overwritten: a clash becomes `<stem>_1.<ext>`,
/// `<stem>_2.<ext>` and so on. A failed copy is recorded and the rest continue.
pub fn sort_by_extension(source: &Path, dest: &Path) -> Result<SortReport> {
    let source = resolve_root(source)?;
    fs::create_dir_all(dest)
        .with_context(|| format!("Failed to create destination '{}'", dest.display()))?;
    let dest = dest
        .canonicalize()
        .with_context(|| format!("Failed to resolve destination '{}'", dest.display()))?;

    let files: Vec<PathBuf> = WalkDir::new(&source)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        // Never re-sort our own output when dest sits inside source
        .filter(|p| !p.starts_with(&dest))
        .collect();

    let mut report = SortReport::default();

    for file in files {
        match copy_into_bucket(&file, &dest) {
            Ok(target) => {
                debug!(from = %file.display(), to = %target.display(), "Copied");
                report.copied.push((file, target));
            }
            Err(e) => {
                warn!(path = %file.display(), error = %e, "Failed to copy file");
                report.failures.push((file, format!("{:#}", e)));
            }
        }
    }

    info!(
        source = %source.display(),
        destination = %dest.display(),
        copied = report.copied.len(),
        failed = report.failures.len(),
        "Sorting complete"
    );

    Ok(report)
}

fn copy_into_bucket(file: &Path, dest: &Path) -> Result<PathBuf> {
    let bucket = dest.join(extension_key(file));
    fs::create_dir_all(&bucket)
        .with_context(|| format!("Failed to create '{}'", bucket.display()))?;

    let name = file.file_name().context("File has no name")?;
    let target = free_name(&bucket.join(name));
    fs::copy(file, &target)
        .with_context(|| format!("Failed to copy to '{}'", target.display()))?;
    Ok(target)
}

/// First of `path`, `<stem>_1<.ext>`, `<stem>_2<.ext>`... that does not exist
fn free_name(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut counter = 1;
    loop {
        let candidate = path.with_file_name(format!("{}_{}{}", stem, counter, ext));
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn test_extension_key() {
        assert_eq!(extension_key(Path::new("a/B.JPG")), "jpg");
        assert_eq!(extension_key(Path::new("archive.tar.gz")), "gz");
        assert_eq!(extension_key(Path::new("Makefile")), NO_EXTENSION);
        assert_eq!(extension_key(Path::new(".bashrc")), NO_EXTENSION);
    }

    #[test]
    fn test_census_orders_by_count_then_name() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("sub");
        fs::create_dir(&sub).unwrap();
        for name in ["a.mp4", "b.MP4", "c.jpg", "d.avi", "README"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        fs::write(sub.join("e.jpg"), b"x").unwrap();
        fs::write(sub.join("f.mp4"), b"x").unwrap();

        let census = census(dir.path()).unwrap();

        assert_eq!(census.total_files, 7);
        assert_eq!(
            census.counts,
            vec![
                ("mp4".to_string(), 3),
                ("jpg".to_string(), 2),
                ("avi".to_string(), 1),
                (NO_EXTENSION.to_string(), 1),
            ]
        );
    }

    #[test]
    fn test_census_empty_tree() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(census(dir.path()).unwrap(), ExtensionCensus::default());
    }

    #[test]
    fn test_sort_copies_into_buckets_without_overwriting() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let nested = src.path().join("nested");
        fs::create_dir(&nested).unwrap();
        fs::write(src.path().join("clip.mp4"), b"first").unwrap();
        fs::write(nested.join("clip.mp4"), b"second").unwrap();
        fs::write(src.path().join("notes"), b"n").unwrap();

        let report = sort_by_extension(src.path(), out.path()).unwrap();

        assert_eq!(report.copied.len(), 3);
        assert!(report.failures.is_empty());
        let bucket = out.path().join("mp4");
        let mut contents = vec![
            fs::read_to_string(bucket.join("clip.mp4")).unwrap(),
            fs::read_to_string(bucket.join("clip_1.mp4")).unwrap(),
        ];
        contents.sort();
        assert_eq!(contents, vec!["first".to_string(), "second".to_string()]);
        assert!(out.path().join(NO_EXTENSION).join("notes").exists());
        // Sources are copied, not moved
        assert!(src.path().join("clip.mp4").exists());
    }

    #[test]
    fn test_free_name_without_extension() {
        let dir = tempfile::tempdir().unwrap();
        let taken = dir.path().join("notes");
        fs::write(&taken, b"x").unwrap();
        assert_eq!(free_name(&taken), dir.path().join("notes_1"));
    }
}
