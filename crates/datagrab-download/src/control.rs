//! Run control: a manually-reset pause barrier plus a latched cancel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

struct ControlInner {
    cancelled: AtomicBool,
    /// `true` while running; `false` parks workers at the next gate.
    pause_tx: watch::Sender<bool>,
}

/// Shared pause/cancel handle. Clones observe the same state, so a UI or
/// signal handler can drive a running scheduler.
#[derive(Clone)]
pub struct DownloadControl {
    inner: Arc<ControlInner>,
}

impl Default for DownloadControl {
    fn default() -> Self {
        Self::new()
    }
}

impl DownloadControl {
    /// Creates a control in the running state.
    #[must_use]
    pub fn new() -> Self {
        let (pause_tx, _) = watch::channel(true);
        Self {
            inner: Arc::new(ControlInner {
                cancelled: AtomicBool::new(false),
                pause_tx,
            }),
        }
    }

    /// Parks workers at their next suspension point. In-flight requests
    /// complete normally.
    pub fn pause(&self) {
        self.inner.pause_tx.send_replace(false);
    }

    /// Releases paused workers. Idempotent.
    pub fn resume(&self) {
        self.inner.pause_tx.send_replace(true);
    }

    /// Latches cancellation; irreversible within a run. Also releases the
    /// pause barrier so parked workers can observe the cancel.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.pause_tx.send_replace(true);
    }

    /// Returns true once [`DownloadControl::cancel`] has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Returns true while the barrier is down.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        !*self.inner.pause_tx.borrow()
    }

    /// Waits until the run is resumed or cancelled.
    pub async fn wait_if_paused(&self) {
        let mut rx = self.inner.pause_tx.subscribe();
        loop {
            if self.is_cancelled() || *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_pause_blocks_until_resume() {
        let control = DownloadControl::new();
        control.pause();
        assert!(control.is_paused());

        let waiter = {
            let control = control.clone();
            tokio::spawn(async move {
                control.wait_if_paused().await;
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        control.resume();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancel_releases_paused_waiters() {
        let control = DownloadControl::new();
        control.pause();
        let waiter = {
            let control = control.clone();
            tokio::spawn(async move {
                control.wait_if_paused().await;
                control.is_cancelled()
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        control.cancel();
        let observed_cancel = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(observed_cancel);
    }

    #[test]
    fn test_cancel_is_latched() {
        let control = DownloadControl::new();
        control.cancel();
        control.resume();
        control.pause();
        assert!(control.is_cancelled());
    }

    #[tokio::test]
    async fn test_running_control_does_not_block() {
        let control = DownloadControl::new();
        tokio::time::timeout(Duration::from_millis(100), control.wait_if_paused())
            .await
            .unwrap();
    }
}
