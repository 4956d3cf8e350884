use crate::domain::errors::MetricError;
use crate::domain::metric::{Collection, Metric, collect_merged};
use crate::domain::ports::Sampler;
use crate::domain::storage::MetricStorage;
use crate::infrastructure::sampling::alloc;
use async_trait::async_trait;
use rand::Rng;
use std::sync::Mutex;
use sysinfo::{Pid, ProcessExt, System, SystemExt};

/// Process-level sample: allocation counters, process memory and CPU,
/// a random gauge and the poll counter.
pub struct RuntimeSampler {
    system: Mutex<System>,
    pid: Option<Pid>,
}

impl RuntimeSampler {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
            pid: sysinfo::get_current_pid().ok(),
        }
    }

    fn collect(&self) -> Result<Collection, MetricError> {
        let stats = alloc::snapshot();
        let mut metrics = vec![
            Metric::counter("PollCount", 1),
            Metric::gauge("RandomValue", rand::rng().random::<f64>() * 10_000.0),
            Metric::gauge("Alloc", stats.heap_alloc as f64),
            Metric::gauge("HeapAlloc", stats.heap_alloc as f64),
            Metric::gauge("HeapObjects", stats.live_objects() as f64),
            Metric::gauge("Mallocs", stats.mallocs as f64),
            Metric::gauge("Frees", stats.frees as f64),
            Metric::gauge("TotalAlloc", stats.total_alloc as f64),
        ];

        if let Some(pid) = self.pid {
            let mut system = self
                .system
                .lock()
                .map_err(|_| MetricError::Storage("process sampler lock poisoned".to_string()))?;
            if system.refresh_process(pid)
                && let Some(process) = system.process(pid)
            {
                metrics.push(Metric::gauge("Sys", process.virtual_memory() as f64));
                metrics.push(Metric::gauge("HeapSys", process.memory() as f64));
                metrics.push(Metric::gauge("ProcessCpu", f64::from(process.cpu_usage())));
                metrics.push(Metric::gauge("Uptime", process.run_time() as f64));
            }
        }

        Ok(collect_merged(metrics))
    }
}

impl Default for RuntimeSampler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Sampler for RuntimeSampler {
    fn name(&self) -> &'static str {
        "main"
    }

    async fn sample(&self, storage: &dyn MetricStorage) -> Result<(), MetricError> {
        let collection = self.collect()?;
        storage.store_collection(collection).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::metric::MetricKind;
    use crate::infrastructure::persistence::MemoryStorage;

    #[tokio::test]
    async fn test_poll_count_increments_per_sample() {
        let storage = MemoryStorage::new();
        let sampler = RuntimeSampler::new();

        sampler.sample(&storage).await.unwrap();
        sampler.sample(&storage).await.unwrap();

        let poll = storage
            .get(&Metric::query("PollCount", MetricKind::Counter))
            .await
            .unwrap();
        assert_eq!(poll.delta, Some(2));

        let random = storage
            .get(&Metric::query("RandomValue", MetricKind::Gauge))
            .await
            .unwrap();
        let value = random.value.unwrap();
        assert!((0.0..10_000.0).contains(&value));
    }
}
