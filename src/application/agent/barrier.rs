//! Sample/report synchronization barrier.
//!
//! Every sampling sub-task holds an [`InFlightGuard`] for its whole run.
//! A report waits until the in-flight count drops to zero before reading
//! local storage, so it never ships a half-written sample.

use std::sync::Arc;
use tokio::sync::watch;

#[derive(Clone)]
pub struct InFlightBarrier {
    count: Arc<watch::Sender<usize>>,
}

impl InFlightBarrier {
    pub fn new() -> Self {
        let (count, _rx) = watch::channel(0);
        Self {
            count: Arc::new(count),
        }
    }

    /// Register one in-flight task; the returned guard deregisters on drop,
    /// including when the task panics.
    pub fn enter(&self) -> InFlightGuard {
        self.count.send_modify(|n| *n += 1);
        InFlightGuard {
            count: self.count.clone(),
        }
    }

    pub fn in_flight(&self) -> usize {
        *self.count.borrow()
    }

    /// Resolves once no task is in flight.
    pub async fn wait(&self) {
        let mut rx = self.count.subscribe();
        // The sender lives in `self`, so the channel cannot close while waiting
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}

impl Default for InFlightBarrier {
    fn default() -> Self {
        Self::new()
    }
}

#[must_use = "dropping the guard immediately releases the barrier"]
pub struct InFlightGuard {
    count: Arc<watch::Sender<usize>>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.count.send_modify(|n| *n = n.saturating_sub(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_wait_returns_immediately_when_idle() {
        let barrier = InFlightBarrier::new();
        tokio::time::timeout(Duration::from_millis(100), barrier.wait())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_wait_blocks_until_guards_drop() {
        let barrier = InFlightBarrier::new();
        let first = barrier.enter();
        let second = barrier.enter();
        assert_eq!(barrier.in_flight(), 2);

        let waiter = {
            let barrier = barrier.clone();
            tokio::spawn(async move { barrier.wait().await })
        };

        drop(first);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(second);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(barrier.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_panicking_task_releases_guard() {
        let barrier = InFlightBarrier::new();
        let guard = barrier.enter();
        let handle = tokio::spawn(async move {
            let _guard = guard;
            panic!("sampler blew up");
        });
        assert!(handle.await.is_err());

        tokio::time::timeout(Duration::from_secs(1), barrier.wait())
            .await
            .unwrap();
    }
}
