//! Playback probe
//!
//! Asks an external player to open a file, play it to the end with no output
//! devices, and exit. The player's exit status decides playability and
//! whatever it writes to stderr becomes the failure reason.
//!
//! Every invocation is bounded by a caller-supplied timeout. A player that
//! overruns is killed, not merely abandoned.

use std::io;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::{ChildStderr, Command};
use tracing::{debug, warn};

/// Default player binary (VLC's console front end)
pub const DEFAULT_PROBE_PROGRAM: &str = "cvlc";

/// Headless, no-output, play-and-exit flags for VLC
pub const DEFAULT_PROBE_ARGS: &[&str] = &["--intf", "dummy", "--play-and-exit", "--no-sout-video"];

/// Longest failure reason kept in the log, in characters
const MAX_REASON_CHARS: usize = 512;

/// Diagnostic bytes kept per invocation; the rest of stderr is drained and dropped
const MAX_DIAGNOSTIC_BYTES: usize = 64 * 1024;

/// How long stderr may stay open once the player has exited with an error
const DIAGNOSTIC_GRACE: Duration = Duration::from_millis(250);

/// Upper bound for the `--version` availability check
const AVAILABILITY_TIMEOUT: Duration = Duration::from_secs(10);

/// Result of probing a single file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The player finished within the time budget with a success status
    Playable,
    /// The player reported an error; carries its diagnostic text
    Failed(String),
    /// The player was still running when the budget ran out and was killed
    TimedOut(Duration),
    /// The player itself could not be started on this host (missing, not
    /// executable, bad interpreter)
    Unavailable(String),
}

impl ProbeOutcome {
    /// The error this outcome represents, if any
    pub fn into_error(self) -> Option<ProbeError> {
        match self {
            ProbeOutcome::Playable => None,
            ProbeOutcome::Failed(reason) => Some(ProbeError::Failure(reason)),
            ProbeOutcome::TimedOut(after) => Some(ProbeError::Timeout(after)),
            ProbeOutcome::Unavailable(reason) => Some(ProbeError::Unavailable(reason)),
        }
    }
}

/// Per-file probe errors. These are recorded against the file, never
/// propagated as a failure of the run.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProbeError {
    #[error("timeout expired after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Failure(String),

    #[error("{0}")]
    Unavailable(String),
}

/// Something that can judge whether a file plays.
///
/// Implementations must return within roughly `timeout` no matter what the
/// underlying capability does, and must never write to the target file.
#[async_trait]
pub trait PlaybackProbe: Send + Sync {
    async fn probe(&self, path: &Path, timeout: Duration) -> ProbeOutcome;

    /// Whether the capability is installed at all
    async fn is_available(&self) -> bool {
        true
    }
}

/// Probe backed by an external player process
#[derive(Debug, Clone)]
pub struct CommandProbe {
    program: String,
    args: Vec<String>,
}

impl CommandProbe {
    /// VLC with the default flags
    pub fn new() -> Self {
        Self::with_program(DEFAULT_PROBE_PROGRAM)
    }

    /// A different player binary with the default VLC flags
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: DEFAULT_PROBE_ARGS.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// Fully custom command line; the target path is appended last
    pub fn with_command(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn unavailable_reason(&self, error: &io::Error) -> String {
        match error.kind() {
            io::ErrorKind::NotFound => format!(
                "{} not found, install it and ensure '{}' is in PATH",
                self.program, self.program
            ),
            _ => format!("failed to start {}: {}", self.program, error),
        }
    }
}

impl Default for CommandProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlaybackProbe for CommandProbe {
    async fn probe(&self, path: &Path, timeout: Duration) -> ProbeOutcome {
        debug!(path = %path.display(), program = %self.program, "Probing file");

        let spawned = Command::new(&self.program)
            .args(&self.args)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        // A spawn failure says nothing about the target file
        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => return ProbeOutcome::Unavailable(self.unavailable_reason(&e)),
        };

        let diagnostics = Arc::new(Mutex::new(Vec::new()));
        let mut drain = tokio::spawn(read_diagnostics(
            child.stderr.take(),
            Arc::clone(&diagnostics),
        ));

        let waited = tokio::time::timeout(timeout, child.wait()).await;
        let status = match waited {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                drain.abort();
                return ProbeOutcome::Failed(format!(
                    "failed waiting for {}: {}",
                    self.program, e
                ));
            }
            Err(_) => {
                // kill() also reaps the child
                if let Err(e) = child.kill().await {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to kill timed out player"
                    );
                }
                drain.abort();
                debug!(path = %path.display(), timeout = ?timeout, "Player timed out");
                return ProbeOutcome::TimedOut(timeout);
            }
        };

        if status.success() {
            drain.abort();
            return ProbeOutcome::Playable;
        }

        // Helpers that inherited stderr can hold the pipe open after the
        // player itself has exited
        if tokio::time::timeout(DIAGNOSTIC_GRACE, &mut drain).await.is_err() {
            debug!(path = %path.display(), "Player stderr still open after exit");
            drain.abort();
        }

        let text = String::from_utf8_lossy(&diagnostics.lock()).into_owned();
        let reason = failure_reason(&text, status.code());
        debug!(path = %path.display(), reason = %reason, "Player reported an error");
        ProbeOutcome::Failed(reason)
    }

    async fn is_available(&self) -> bool {
        let spawned = Command::new(&self.program)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                debug!(program = %self.program, error = %e, "Player cannot be started");
                return false;
            }
        };

        let waited = tokio::time::timeout(AVAILABILITY_TIMEOUT, child.wait()).await;
        match waited {
            Ok(Ok(status)) if status.success() => {}
            Ok(Ok(status)) => {
                debug!(program = %self.program, status = %status, "Player --version failed");
            }
            Ok(Err(e)) => {
                debug!(program = %self.program, error = %e, "Failed waiting for player --version");
            }
            Err(_) => {
                debug!(
                    program = %self.program,
                    timeout = ?AVAILABILITY_TIMEOUT,
                    "Player --version did not finish"
                );
            }
        }
        true
    }
}

/// Drain stderr to EOF into `kept`, keeping at most [`MAX_DIAGNOSTIC_BYTES`].
///
/// The pipe must keep being read after the cap, otherwise a chatty player
/// blocks on a full pipe and looks like a hang.
async fn read_diagnostics(stderr: Option<ChildStderr>, kept: Arc<Mutex<Vec<u8>>>) {
    let Some(mut stderr) = stderr else {
        return;
    };

    let mut chunk = [0u8; 4096];
    loop {
        match stderr.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                let mut kept = kept.lock();
                let room = MAX_DIAGNOSTIC_BYTES.saturating_sub(kept.len());
                kept.extend_from_slice(&chunk[..n.min(room)]);
            }
            Err(e) => {
                debug!(error = %e, "Stopped reading player diagnostics");
                break;
            }
        }
    }
}

fn failure_reason(diagnostics: &str, exit_code: Option<i32>) -> String {
    let reason = sanitize_reason(diagnostics);
    if !reason.is_empty() {
        return reason;
    }
    match exit_code {
        Some(code) => format!("exit status {}", code),
        None => "terminated by signal".to_string(),
    }
}

/// Collapse whitespace runs (including newlines and tabs) to single spaces and
/// cap the length, so a reason always fits in one tab-separated log field.
pub fn sanitize_reason(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= MAX_REASON_CHARS {
        collapsed
    } else {
        collapsed.chars().take(MAX_REASON_CHARS).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    use assert_matches::assert_matches;

    fn sh(script: &str) -> CommandProbe {
        // The target path is appended after the script and lands in $0
        CommandProbe::with_command("sh", vec!["-c".to_string(), script.to_string()])
    }

    #[test]
    fn test_sanitize_reason_flattens_lines() {
        assert_eq!(
            sanitize_reason("  main error:\tno decoder\nfound for 'h265'\n"),
            "main error: no decoder found for 'h265'"
        );
        assert_eq!(sanitize_reason(""), "");
    }

    #[test]
    fn test_sanitize_reason_caps_length() {
        let long = "x".repeat(MAX_REASON_CHARS * 2);
        assert_eq!(sanitize_reason(&long).chars().count(), MAX_REASON_CHARS);
    }

    #[test]
    fn test_failure_reason_falls_back_to_exit_status() {
        assert_eq!(failure_reason("", Some(3)), "exit status 3");
        assert_eq!(failure_reason("  \n", None), "terminated by signal");
        assert_eq!(failure_reason("bad header", Some(1)), "bad header");
    }

    #[test]
    fn test_outcome_into_error() {
        assert_eq!(ProbeOutcome::Playable.into_error(), None);
        assert_eq!(
            ProbeOutcome::TimedOut(Duration::from_secs(30))
                .into_error()
                .map(|e| e.to_string()),
            Some("timeout expired after 30s".to_string())
        );
        assert_matches!(
            ProbeOutcome::Unavailable("missing".into()).into_error(),
            Some(ProbeError::Unavailable(reason)) if reason == "missing"
        );
    }

    #[test]
    fn test_default_command_is_vlc() {
        let probe = CommandProbe::default();
        assert_eq!(probe.program(), "cvlc");
        assert!(probe.args.iter().any(|a| a == "--play-and-exit"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_successful_exit_is_playable() {
        let outcome = sh("exit 0")
            .probe(Path::new("/tmp/clip.mp4"), Duration::from_secs(5))
            .await;
        assert_eq!(outcome, ProbeOutcome::Playable);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_error_exit_carries_stderr() {
        let outcome = sh("echo 'decoder error' >&2; exit 1")
            .probe(Path::new("/tmp/clip.mp4"), Duration::from_secs(5))
            .await;
        assert_eq!(outcome, ProbeOutcome::Failed("decoder error".to_string()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_silent_error_exit_reports_status() {
        let outcome = sh("exit 7")
            .probe(Path::new("/tmp/clip.mp4"), Duration::from_secs(5))
            .await;
        assert_eq!(outcome, ProbeOutcome::Failed("exit status 7".to_string()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_hanging_player_is_killed_at_timeout() {
        let timeout = Duration::from_millis(200);
        let started = Instant::now();
        let outcome = sh("exec sleep 30")
            .probe(Path::new("/tmp/clip.mp4"), timeout)
            .await;

        assert_eq!(outcome, ProbeOutcome::TimedOut(timeout));
        assert!(
            started.elapsed() < Duration::from_secs(5),
            "probe blocked for {:?}",
            started.elapsed()
        );
    }

    #[tokio::test]
    async fn test_missing_program_is_unavailable() {
        let probe = CommandProbe::with_program("playcheck-no-such-player");
        let started = Instant::now();
        let outcome = probe
            .probe(Path::new("/tmp/clip.mp4"), Duration::from_secs(30))
            .await;

        assert_matches!(outcome, ProbeOutcome::Unavailable(reason) if reason.contains("playcheck-no-such-player"));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(!probe.is_available().await);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_executable_player_is_unavailable() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let player = dir.path().join("cvlc");
        std::fs::write(&player, "#!/bin/sh\nexit 0\n").unwrap();
        std::fs::set_permissions(&player, std::fs::Permissions::from_mode(0o644)).unwrap();

        let probe = CommandProbe::with_program(player.to_string_lossy());
        let outcome = probe
            .probe(Path::new("/tmp/clip.mp4"), Duration::from_secs(5))
            .await;

        assert_matches!(outcome, ProbeOutcome::Unavailable(reason)
            if reason.starts_with("failed to start") && reason.contains("ermission denied"));
        assert!(!probe.is_available().await);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_helper_holding_stderr_does_not_delay_success() {
        let started = Instant::now();
        let outcome = sh("sleep 3 & exit 0")
            .probe(Path::new("/tmp/clip.mp4"), Duration::from_secs(1))
            .await;

        assert_eq!(outcome, ProbeOutcome::Playable);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_helper_holding_stderr_keeps_error_reason() {
        let started = Instant::now();
        let outcome = sh("echo 'bad frame' >&2; sleep 3 & exit 2")
            .probe(Path::new("/tmp/clip.mp4"), Duration::from_secs(2))
            .await;

        assert_eq!(outcome, ProbeOutcome::Failed("bad frame".to_string()));
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
