//! In-Memory Metric Storage
//!
//! Thread-safe, in-memory implementation of `MetricStorage`.
//!
//! # Features
//!
//! - **Thread-safe**: a single `Mutex` guards the map, held only for the
//!   duration of each map access
//! - **Fast path**: the default primary tier when no persistence is configured
//!
//! # Limitations
//!
//! - Data is lost on restart unless a checkpoint restorer moves it to a
//!   backup tier
//! - Limited by available RAM

use crate::domain::errors::MetricError;
use crate::domain::metric::{Collection, Metric};
use crate::domain::storage::{MetricStorage, StorageResult};
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::Mutex;

pub struct MemoryStorage {
    metrics: Mutex<Collection>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            metrics: Mutex::new(Collection::new()),
        }
    }

    /// Number of stored metrics
    pub async fn len(&self) -> usize {
        self.metrics.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.metrics.lock().await.is_empty()
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetricStorage for MemoryStorage {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, query: &Metric) -> StorageResult<Metric> {
        query.validate_query()?;

        let metrics = self.metrics.lock().await;
        match metrics.get(&query.id) {
            Some(stored) if stored.kind == query.kind => Ok(stored.clone()),
            _ => Err(MetricError::NoValue),
        }
    }

    async fn store(&self, metric: Metric) -> StorageResult<()> {
        metric.validate()?;

        let mut metrics = self.metrics.lock().await;
        metrics
            .entry(metric.id.clone())
            .or_insert_with(|| Metric::zero(metric.id.clone(), metric.kind))
            .merge(&metric);
        Ok(())
    }

    async fn get_collection(&self) -> StorageResult<Collection> {
        Ok(self.metrics.lock().await.clone())
    }

    async fn store_collection(&self, collection: Collection) -> StorageResult<()> {
        for metric in collection.into_values() {
            self.store(metric).await?;
        }
        Ok(())
    }

    async fn drain(&self) -> StorageResult<Collection> {
        Ok(std::mem::take(&mut *self.metrics.lock().await))
    }

    async fn clean_up(&self) -> StorageResult<()> {
        self.metrics.lock().await.clear();
        Ok(())
    }

    async fn ping(&self, _timeout: Duration) -> StorageResult<()> {
        Ok(())
    }

    async fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::InvalidReason;
    use crate::domain::metric::MetricKind;
    use crate::domain::storage::merge_back;

    #[tokio::test]
    async fn test_store_and_get() {
        let storage = MemoryStorage::new();
        storage.store(Metric::gauge("Alloc", 12.5)).await.unwrap();

        let stored = storage
            .get(&Metric::query("Alloc", MetricKind::Gauge))
            .await
            .unwrap();
        assert_eq!(stored.value, Some(12.5));
    }

    #[tokio::test]
    async fn test_get_miss_is_no_value() {
        let storage = MemoryStorage::new();
        let result = storage
            .get(&Metric::query("Missing", MetricKind::Counter))
            .await;
        assert!(matches!(result, Err(MetricError::NoValue)));
    }

    #[tokio::test]
    async fn test_get_with_wrong_kind_is_no_value() {
        let storage = MemoryStorage::new();
        storage.store(Metric::counter("PollCount", 1)).await.unwrap();
        let result = storage
            .get(&Metric::query("PollCount", MetricKind::Gauge))
            .await;
        assert!(matches!(result, Err(MetricError::NoValue)));
    }

    #[tokio::test]
    async fn test_counter_accumulates_and_gauge_replaces() {
        let storage = MemoryStorage::new();
        for delta in 1..=4 {
            storage
                .store(Metric::counter("PollCount", delta))
                .await
                .unwrap();
        }
        storage.store(Metric::gauge("Alloc", 1.0)).await.unwrap();
        storage.store(Metric::gauge("Alloc", 2.0)).await.unwrap();

        let collection = storage.get_collection().await.unwrap();
        assert_eq!(collection["PollCount"].delta, Some(10));
        assert_eq!(collection["Alloc"].value, Some(2.0));
    }

    #[tokio::test]
    async fn test_invalid_metric_is_rejected() {
        let storage = MemoryStorage::new();
        let result = storage.store(Metric::counter("", 5)).await;
        assert!(matches!(
            result,
            Err(MetricError::InvalidMetric(InvalidReason::MissingId))
        ));
        assert!(storage.is_empty().await);
    }

    #[tokio::test]
    async fn test_snapshot_is_detached_from_store() {
        let storage = MemoryStorage::new();
        storage.store(Metric::counter("PollCount", 1)).await.unwrap();

        let snapshot = storage.get_collection().await.unwrap();
        storage.clean_up().await.unwrap();

        assert_eq!(snapshot.len(), 1);
        assert!(storage.is_empty().await);
    }

    #[tokio::test]
    async fn test_drain_empties_store() {
        let storage = MemoryStorage::new();
        storage.store(Metric::counter("PollCount", 3)).await.unwrap();

        let drained = storage.drain().await.unwrap();

        assert_eq!(drained["PollCount"].delta, Some(3));
        assert!(storage.is_empty().await);
    }

    #[tokio::test]
    async fn test_merge_back_keeps_fresher_gauges() {
        let storage = MemoryStorage::new();
        storage.store(Metric::counter("PollCount", 2)).await.unwrap();
        storage.store(Metric::gauge("Alloc", 1.0)).await.unwrap();
        storage.store(Metric::gauge("Frees", 4.0)).await.unwrap();
        let drained = storage.drain().await.unwrap();

        // Written while the drained batch was out
        storage.store(Metric::counter("PollCount", 1)).await.unwrap();
        storage.store(Metric::gauge("Alloc", 7.0)).await.unwrap();

        merge_back(&storage, drained).await.unwrap();

        let collection = storage.get_collection().await.unwrap();
        assert_eq!(collection["PollCount"].delta, Some(3));
        assert_eq!(collection["Alloc"].value, Some(7.0));
        assert_eq!(collection["Frees"].value, Some(4.0));
    }
}
