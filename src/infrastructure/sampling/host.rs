use crate::domain::errors::MetricError;
use crate::domain::metric::{Collection, Metric, collect_merged};
use crate::domain::ports::Sampler;
use crate::domain::storage::MetricStorage;
use async_trait::async_trait;
use std::sync::Mutex;
use sysinfo::{CpuExt, System, SystemExt};

/// Host-level sample: total and free memory plus per-CPU utilization
/// (`CPUutilization1`, `CPUutilization2`, ...).
///
/// CPU usage is a delta between two refreshes, so the first sample after
/// start reports zero.
pub struct HostSampler {
    system: Mutex<System>,
}

impl HostSampler {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }

    fn collect(&self) -> Result<Collection, MetricError> {
        let mut system = self
            .system
            .lock()
            .map_err(|_| MetricError::Storage("host sampler lock poisoned".to_string()))?;
        system.refresh_memory();
        system.refresh_cpu();

        let mut metrics = vec![
            Metric::gauge("TotalMemory", system.total_memory() as f64),
            Metric::gauge("FreeMemory", system.free_memory() as f64),
        ];
        for (index, cpu) in system.cpus().iter().enumerate() {
            metrics.push(Metric::gauge(
                format!("CPUutilization{}", index + 1),
                f64::from(cpu.cpu_usage()),
            ));
        }
        Ok(collect_merged(metrics))
    }
}

impl Default for HostSampler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Sampler for HostSampler {
    fn name(&self) -> &'static str {
        "additional"
    }

    async fn sample(&self, storage: &dyn MetricStorage) -> Result<(), MetricError> {
        let collection = self.collect()?;
        storage.store_collection(collection).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::persistence::MemoryStorage;

    #[tokio::test]
    async fn test_host_metrics_are_gauges() {
        let storage = MemoryStorage::new();
        HostSampler::new().sample(&storage).await.unwrap();

        let collection = storage.get_collection().await.unwrap();
        assert!(collection.contains_key("TotalMemory"));
        assert!(collection.contains_key("FreeMemory"));
        assert!(collection.contains_key("CPUutilization1"));
        assert!(collection.values().all(|m| m.value.is_some()));
    }
}
