//! Checkpoint / restore between a hot primary tier and a durable backup.
//!
//! `restore` copies the backup into the primary and leaves the backup
//! untouched, so a crash before the first checkpoint loses nothing. The
//! primary then holds the whole history, so the first checkpoint after a
//! restore replaces the backup instead of merging into it. Every later
//! checkpoint drains the primary and merges it into the backup, so no
//! counter delta is ever counted twice.
//!
//! A checkpoint whose backup write fails puts the drained metrics back into
//! the primary for the next tick.

use crate::application::system::wait_for_shutdown;
use crate::domain::errors::MetricError;
use crate::domain::storage::{MetricStorage, merge_back};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointMode {
    /// Move primary into backup on every tick and once more at shutdown.
    Periodic(Duration),
    /// Every write already reaches the backup; no loop runs.
    WriteThrough,
}

impl CheckpointMode {
    pub fn from_interval(interval: Duration) -> Self {
        if interval.is_zero() {
            CheckpointMode::WriteThrough
        } else {
            CheckpointMode::Periodic(interval)
        }
    }
}

pub struct Restorer {
    primary: Arc<dyn MetricStorage>,
    backup: Arc<dyn MetricStorage>,
    // Primary holds everything the backup holds
    replace_backup: AtomicBool,
}

impl Restorer {
    pub fn new(primary: Arc<dyn MetricStorage>, backup: Arc<dyn MetricStorage>) -> Self {
        Self {
            primary,
            backup,
            replace_backup: AtomicBool::new(false),
        }
    }

    /// Copy the backup's collection into a freshly emptied primary.
    pub async fn restore(&self) -> Result<usize, MetricError> {
        let collection = self.backup.get_collection().await?;
        let count = collection.len();
        self.primary.clean_up().await?;
        self.primary.store_collection(collection).await?;
        self.replace_backup.store(true, Ordering::SeqCst);
        info!(
            "Restored {} metrics from {} storage",
            count,
            self.backup.backend()
        );
        Ok(count)
    }

    /// Move the primary's collection into the backup.
    pub async fn checkpoint(&self) -> Result<usize, MetricError> {
        let collection = self.primary.drain().await?;
        if collection.is_empty() {
            debug!("Checkpoint skipped, primary is empty");
            return Ok(0);
        }
        let count = collection.len();

        let replace = self.replace_backup.load(Ordering::SeqCst);
        let written = if replace {
            self.backup.replace_collection(collection.clone()).await
        } else {
            self.backup.store_collection(collection.clone()).await
        };

        if let Err(e) = written {
            if let Err(requeue) = merge_back(self.primary.as_ref(), collection).await {
                error!("Failed to return {} metrics to primary: {}", count, requeue);
            }
            return Err(e);
        }

        if replace {
            self.replace_backup.store(false, Ordering::SeqCst);
        }
        debug!("Checkpointed {} metrics", count);
        Ok(count)
    }

    /// In periodic mode, checkpoint on every tick and once more after
    /// `shutdown` fires. Returns at once in write-through mode.
    pub async fn run(&self, mode: CheckpointMode, mut shutdown: watch::Receiver<bool>) {
        let CheckpointMode::Periodic(period) = mode else {
            info!("Write-through mode, no periodic checkpoints");
            return;
        };

        info!("Checkpointing every {:?}", period);
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = wait_for_shutdown(&mut shutdown) => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.checkpoint().await {
                        warn!("Checkpoint failed, retrying next tick: {}", e);
                    }
                }
            }
        }

        match self.checkpoint().await {
            Ok(count) => info!("Final checkpoint stored {} metrics", count),
            Err(e) => error!("Final checkpoint failed: {}", e),
        }
    }
}
