//! Interrupt handling for a running scan
//!
//! The first interrupt cancels the run: no new probes start and the ones in
//! flight finish. A second interrupt asks the caller to exit immediately.

use std::future::Future;
use std::io;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Wait for interrupts from `next_signal`, cancelling `cancel` on the first.
///
/// Returns `true` once a second interrupt arrives, `false` if the signal
/// source fails first.
pub async fn watch_interrupts<S, F>(mut next_signal: S, cancel: CancellationToken) -> bool
where
    S: FnMut() -> F,
    F: Future<Output = io::Result<()>>,
{
    if let Err(e) = next_signal().await {
        debug!(error = %e, "Interrupt handler unavailable");
        return false;
    }

    warn!("Interrupt received, finishing probes already running (interrupt again to stop now)");
    cancel.cancel();

    match next_signal().await {
        Ok(()) => {
            warn!("Second interrupt received, stopping immediately");
            true
        }
        Err(e) => {
            debug!(error = %e, "Interrupt handler unavailable");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::sync::{Mutex, mpsc};

    /// Signal source fed by a channel; a closed channel is a failed source
    fn channel_signals() -> (
        mpsc::UnboundedSender<()>,
        impl FnMut() -> std::pin::Pin<Box<dyn Future<Output = io::Result<()>> + Send>>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let rx = Arc::new(Mutex::new(rx));
        let next = move || {
            let rx = Arc::clone(&rx);
            Box::pin(async move {
                rx.lock()
                    .await
                    .recv()
                    .await
                    .ok_or_else(|| io::Error::other("signal source closed"))
            }) as std::pin::Pin<Box<dyn Future<Output = io::Result<()>> + Send>>
        };
        (tx, next)
    }

    #[tokio::test]
    async fn test_first_interrupt_cancels_second_forces_exit() {
        let (tx, next) = channel_signals();
        let cancel = CancellationToken::new();
        let watcher = tokio::spawn(watch_interrupts(next, cancel.clone()));

        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), cancel.cancelled())
            .await
            .unwrap();
        assert!(!watcher.is_finished());

        tx.send(()).unwrap();
        let forced = tokio::time::timeout(Duration::from_secs(5), watcher)
            .await
            .unwrap()
            .unwrap();
        assert!(forced);
    }

    #[tokio::test]
    async fn test_failed_signal_source_changes_nothing() {
        let (tx, next) = channel_signals();
        drop(tx);
        let cancel = CancellationToken::new();

        assert!(!watch_interrupts(next, cancel.clone()).await);
        assert!(!cancel.is_cancelled());
    }
}
