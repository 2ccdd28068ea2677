//! Shared fixtures for pipeline tests

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use playcheck::config::ScanConfig;
use playcheck::services::{PlaybackProbe, ProbeOutcome};

/// How the scripted probe treats a file, keyed by file name
#[derive(Debug, Clone)]
pub enum Behavior {
    Playable,
    Fail(&'static str),
    /// Sleeps far past any test timeout
    Hang,
    Unavailable,
    Panic,
}

/// Probe double that never starts a process
#[derive(Default)]
pub struct ScriptedProbe {
    behaviors: HashMap<String, Behavior>,
    calls: Mutex<HashMap<PathBuf, usize>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    watched_log: Option<PathBuf>,
    /// Log contents seen at the start of each call, by file name
    log_seen: Mutex<HashMap<String, String>>,
}

impl ScriptedProbe {
    pub fn new(behaviors: &[(&str, Behavior)]) -> Self {
        Self {
            behaviors: behaviors
                .iter()
                .map(|(name, b)| (name.to_string(), b.clone()))
                .collect(),
            ..Default::default()
        }
    }

    /// Read `log` at the start of every call
    pub fn watching_log(mut self, log: PathBuf) -> Self {
        self.watched_log = Some(log);
        self
    }

    /// Log contents observed when `name` started probing
    pub fn log_seen_by(&self, name: &str) -> Option<String> {
        self.log_seen.lock().get(name).cloned()
    }

    /// Times each path was probed
    pub fn calls(&self) -> HashMap<PathBuf, usize> {
        self.calls.lock().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlaybackProbe for ScriptedProbe {
    async fn probe(&self, path: &Path, timeout: Duration) -> ProbeOutcome {
        *self.calls.lock().entry(path.to_path_buf()).or_default() += 1;
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        if let Some(log) = &self.watched_log {
            let seen = fs::read_to_string(log).unwrap_or_default();
            self.log_seen.lock().insert(name.clone(), seen);
        }
        let behavior = self.behaviors.get(&name).cloned().unwrap_or(Behavior::Playable);

        // Give other workers a chance to overlap
        tokio::time::sleep(Duration::from_millis(5)).await;

        let outcome = match behavior {
            Behavior::Playable => ProbeOutcome::Playable,
            Behavior::Fail(reason) => ProbeOutcome::Failed(reason.to_string()),
            Behavior::Hang => {
                match tokio::time::timeout(timeout, tokio::time::sleep(Duration::from_secs(3600))).await {
                    Ok(()) => ProbeOutcome::Playable,
                    Err(_) => ProbeOutcome::TimedOut(timeout),
                }
            }
            Behavior::Unavailable => ProbeOutcome::Unavailable("cvlc not found".to_string()),
            Behavior::Panic => {
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                panic!("simulated probe crash on {}", name);
            }
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        outcome
    }
}

/// Media tree in a temp dir plus a log path outside it
pub struct Fixture {
    pub media: tempfile::TempDir,
    pub scratch: tempfile::TempDir,
}

impl Fixture {
    pub fn new(files: &[&str]) -> Self {
        let media = tempfile::tempdir().unwrap();
        for name in files {
            let path = media.path().join(name);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(&path, format!("contents of {}", name)).unwrap();
        }
        Self {
            media,
            scratch: tempfile::tempdir().unwrap(),
        }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.media.path().canonicalize().unwrap().join(name)
    }

    pub fn log_path(&self) -> PathBuf {
        self.scratch.path().join("video_scan.log")
    }

    pub fn config(&self, workers: usize, dry_run: bool) -> ScanConfig {
        let mut config = ScanConfig::new(self.media.path());
        config.workers = workers;
        config.dry_run = dry_run;
        config.timeout = Duration::from_millis(100);
        config.log_path = self.log_path();
        config.show_progress = false;
        config
    }

    pub fn log_lines(&self) -> Vec<String> {
        let mut lines: Vec<String> = fs::read_to_string(self.log_path())
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect();
        lines.sort();
        lines
    }

    /// Every file under the media root with its bytes
    pub fn snapshot(&self) -> BTreeMap<PathBuf, Vec<u8>> {
        walkdir::WalkDir::new(self.media.path())
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| (e.path().to_path_buf(), fs::read(e.path()).unwrap()))
            .collect()
    }
}
