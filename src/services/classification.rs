//! Media files and the verdicts assigned to them

use std::borrow::Cow;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use super::probe::{ProbeError, ProbeOutcome, sanitize_reason};

/// A file queued for verification, identified by its absolute path
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct MediaFile(PathBuf);

impl MediaFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }

    pub fn into_path(self) -> PathBuf {
        self.0
    }
}

impl fmt::Display for MediaFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// Verdict for one file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Ok,
    Corrupt,
    /// The player could not run, so nothing is known about the file
    Unavailable,
}

impl Verdict {
    /// Tag written at the start of each log record
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Ok => "OK",
            Verdict::Corrupt => "CORRUPT",
            Verdict::Unavailable => "UNAVAILABLE",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classification of one file, written once to the log and never changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationResult {
    pub file: MediaFile,
    pub verdict: Verdict,
    /// Present for every verdict except `Ok`
    pub reason: Option<String>,
}

impl ClassificationResult {
    pub fn from_outcome(file: MediaFile, outcome: ProbeOutcome) -> Self {
        let (verdict, reason) = match outcome.into_error() {
            None => (Verdict::Ok, None),
            Some(err @ ProbeError::Unavailable(_)) => {
                (Verdict::Unavailable, Some(sanitize_reason(&err.to_string())))
            }
            Some(err) => (Verdict::Corrupt, Some(sanitize_reason(&err.to_string()))),
        };
        Self {
            file,
            verdict,
            reason,
        }
    }

    /// One complete log record, newline included:
    /// `OK\t<path>` or `<VERDICT>\t<reason>\t<path>`.
    ///
    /// Backslash, tab, carriage return and newline in the path are written as
    /// `\\`, `\t`, `\r` and `\n`.
    pub fn log_line(&self) -> String {
        let display = self.file.to_string();
        let path = escape_field(&display);
        match &self.reason {
            None => format!("{}\t{}\n", self.verdict, path),
            Some(reason) => format!("{}\t{}\t{}\n", self.verdict, reason, path),
        }
    }
}

fn escape_field(text: &str) -> Cow<'_, str> {
    if !text.contains(['\\', '\t', '\r', '\n']) {
        return Cow::Borrowed(text);
    }

    let mut escaped = String::with_capacity(text.len() + 8);
    for c in text.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\t' => escaped.push_str("\\t"),
            '\r' => escaped.push_str("\\r"),
            '\n' => escaped.push_str("\\n"),
            c => escaped.push(c),
        }
    }
    Cow::Owned(escaped)
}
