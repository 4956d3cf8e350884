use crate::application::agent::barrier::InFlightBarrier;
use crate::application::system::wait_for_shutdown;
use crate::domain::errors::MetricError;
use crate::domain::ports::{MetricsTransport, Sampler};
use crate::domain::storage::{MetricStorage, merge_back};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, instrument, warn};

/// Periodic sample-and-report loop of the agent.
///
/// Samplers write into local storage; each report drains the accumulated
/// collection and ships it as one batch. Samples taken during the send
/// land in the emptied storage for the next report, and a failed send is
/// merged back so it is retried with everything accumulated since.
pub struct MetricsAgent {
    storage: Arc<dyn MetricStorage>,
    transport: Arc<dyn MetricsTransport>,
    samplers: Vec<Arc<dyn Sampler>>,
    barrier: InFlightBarrier,
}

impl MetricsAgent {
    pub fn new(
        storage: Arc<dyn MetricStorage>,
        transport: Arc<dyn MetricsTransport>,
        samplers: Vec<Arc<dyn Sampler>>,
    ) -> Self {
        Self {
            storage,
            transport,
            samplers,
            barrier: InFlightBarrier::new(),
        }
    }

    pub fn barrier(&self) -> &InFlightBarrier {
        &self.barrier
    }

    /// Start one sub-task per sampler.
    ///
    /// Barrier guards are taken before spawning, so a report issued right
    /// after this call already waits for these samples.
    pub fn sample_once(&self) -> Vec<JoinHandle<()>> {
        self.samplers
            .iter()
            .map(|sampler| {
                let guard = self.barrier.enter();
                let sampler = Arc::clone(sampler);
                let storage = Arc::clone(&self.storage);
                tokio::spawn(async move {
                    let _guard = guard;
                    if let Err(e) = sampler.sample(storage.as_ref()).await {
                        warn!("Sampler '{}' failed: {}", sampler.name(), e);
                    } else {
                        debug!("Sampler '{}' done", sampler.name());
                    }
                })
            })
            .collect()
    }

    /// Ship everything sampled so far. Returns how many metrics were sent.
    #[instrument(skip(self))]
    pub async fn report_once(&self) -> Result<usize, MetricError> {
        self.barrier.wait().await;

        let collection = self.storage.drain().await?;
        if collection.is_empty() {
            debug!("Nothing to report");
            return Ok(0);
        }

        let count = collection.len();
        if let Err(e) = self.transport.batch_update_metrics(collection.clone()).await {
            if let Err(requeue) = merge_back(self.storage.as_ref(), collection).await {
                error!("Failed to keep {} unsent metrics: {}", count, requeue);
            }
            return Err(e);
        }
        info!("Reported {} metrics", count);
        Ok(count)
    }

    async fn sample_loop(&self, period: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = wait_for_shutdown(&mut shutdown) => break,
                _ = ticker.tick() => {
                    self.sample_once();
                }
            }
        }
        debug!("Sample loop stopped");
    }

    async fn report_loop(&self, period: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick fires immediately; nothing has been sampled yet
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = wait_for_shutdown(&mut shutdown) => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.report_once().await {
                        warn!("Report failed, metrics kept for the next cycle: {}", e);
                    }
                }
            }
        }
        debug!("Report loop stopped");
    }

    /// Run both loops until `shutdown` fires, then flush once and close the
    /// transport.
    pub async fn run(
        &self,
        poll_interval: Duration,
        report_interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) {
        info!(
            "Agent started (poll: {:?}, report: {:?})",
            poll_interval, report_interval
        );

        tokio::join!(
            self.sample_loop(poll_interval, shutdown.clone()),
            self.report_loop(report_interval, shutdown),
        );

        match self.report_once().await {
            Ok(count) => info!("Final report sent {} metrics", count),
            Err(e) => error!("Final report failed: {}", e),
        }
        if let Err(e) = self.transport.close().await {
            warn!("Failed to close transport: {}", e);
        }
        info!("Agent stopped");
    }
}
