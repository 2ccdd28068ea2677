//! Bounded worker pool for probe execution
//!
//! A pool is built for one run and dropped with it. It keeps at most `workers`
//! probes in flight, each on its own tokio task, and each worker hands its
//! result straight to the [`ResultAggregator`] when its probe finishes, so
//! results arrive in completion order, not queue order.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::task::{self, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::aggregator::ResultAggregator;
use super::classification::{ClassificationResult, MediaFile};
use super::probe::{PlaybackProbe, ProbeOutcome};
use super::scanner::TaskQueue;

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("worker pool needs at least one worker")]
pub struct ZeroWorkers;

/// What happened to the queue during one pool run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolReport {
    /// Files handed to a worker
    pub dispatched: usize,
    /// Dispatched files whose result reached the aggregator
    pub completed: usize,
    /// Probes that panicked and were recorded as failures
    pub panicked: usize,
    /// Files never dispatched because the run was cancelled
    pub unclassified: usize,
    pub cancelled: bool,
}

/// Fixed-size set of concurrent probe workers
pub struct WorkerPool {
    workers: usize,
    cancel: CancellationToken,
}

impl WorkerPool {
    pub fn new(workers: usize) -> Result<Self, ZeroWorkers> {
        Self::with_cancellation(workers, CancellationToken::new())
    }

    /// Pool that stops dispatching once `cancel` fires
    pub fn with_cancellation(workers: usize, cancel: CancellationToken) -> Result<Self, ZeroWorkers> {
        if workers == 0 {
            return Err(ZeroWorkers);
        }
        Ok(Self { workers, cancel })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Probe every queued file exactly once.
    ///
    /// Returns when every dispatched probe has finished. After cancellation no
    /// new file is dispatched; probes already running are left to finish
    /// (each is bounded by `timeout`) and the rest are counted as unclassified.
    pub async fn run(
        &self,
        queue: TaskQueue,
        probe: Arc<dyn PlaybackProbe>,
        timeout: Duration,
        aggregator: Arc<ResultAggregator>,
    ) -> PoolReport {
        let mut pending = queue.into_files().into_iter();
        let mut in_flight: JoinSet<()> = JoinSet::new();
        let mut files_by_task: HashMap<task::Id, MediaFile> = HashMap::new();
        let mut report = PoolReport::default();

        info!(workers = self.workers, "Worker pool started");

        loop {
            while in_flight.len() < self.workers && !self.cancel.is_cancelled() {
                let Some(file) = pending.next() else {
                    break;
                };

                let probe = Arc::clone(&probe);
                let aggregator = Arc::clone(&aggregator);
                let task_file = file.clone();
                let handle = in_flight.spawn(async move {
                    let outcome = probe.probe(task_file.path(), timeout).await;
                    aggregator.record(ClassificationResult::from_outcome(task_file, outcome));
                });

                debug!(path = %file, task = %handle.id(), "Dispatched probe");
                files_by_task.insert(handle.id(), file);
                report.dispatched += 1;
            }

            if in_flight.is_empty() {
                break;
            }

            let joined = tokio::select! {
                joined = in_flight.join_next_with_id() => joined,
                _ = self.cancel.cancelled(), if !report.cancelled => {
                    report.cancelled = true;
                    warn!(
                        dispatched = report.dispatched,
                        completed = report.completed,
                        "Run cancelled, waiting for dispatched probes to finish"
                    );
                    continue;
                }
            };

            match joined {
                Some(Ok((id, ()))) => {
                    files_by_task.remove(&id);
                    report.completed += 1;
                }
                Some(Err(e)) => {
                    let Some(file) = files_by_task.remove(&e.id()) else {
                        error!(task = %e.id(), error = %e, "Unknown probe task failed");
                        continue;
                    };
                    let reason = if e.is_panic() {
                        format!("probe panicked: {}", panic_message(e.into_panic()))
                    } else {
                        "probe task was aborted".to_string()
                    };
                    error!(path = %file, reason = %reason, "Probe task failed");
                    aggregator.record(ClassificationResult::from_outcome(
                        file,
                        ProbeOutcome::Failed(reason),
                    ));
                    report.completed += 1;
                    report.panicked += 1;
                }
                None => break,
            }
        }

        report.unclassified = pending.count();
        report.cancelled |= self.cancel.is_cancelled();

        info!(
            dispatched = report.dispatched,
            completed = report.completed,
            panicked = report.panicked,
            unclassified = report.unclassified,
            cancelled = report.cancelled,
            "Worker pool finished"
        );

        report
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
