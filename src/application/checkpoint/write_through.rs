use crate::domain::metric::{Collection, Metric};
use crate::domain::storage::{MetricStorage, StorageResult};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Storage decorator that mirrors every successful write into a backup.
///
/// Used when the checkpoint interval is zero: the backup is then durable
/// after each write and no periodic move happens. Reads are served by the
/// primary only.
pub struct WriteThroughStorage {
    primary: Arc<dyn MetricStorage>,
    backup: Arc<dyn MetricStorage>,
}

impl WriteThroughStorage {
    pub fn new(primary: Arc<dyn MetricStorage>, backup: Arc<dyn MetricStorage>) -> Self {
        Self { primary, backup }
    }
}

#[async_trait]
impl MetricStorage for WriteThroughStorage {
    fn backend(&self) -> &'static str {
        self.primary.backend()
    }

    async fn get(&self, query: &Metric) -> StorageResult<Metric> {
        self.primary.get(query).await
    }

    async fn store(&self, metric: Metric) -> StorageResult<()> {
        self.primary.store(metric.clone()).await?;
        self.backup.store(metric).await
    }

    async fn get_collection(&self) -> StorageResult<Collection> {
        self.primary.get_collection().await
    }

    async fn store_collection(&self, collection: Collection) -> StorageResult<()> {
        self.primary.store_collection(collection.clone()).await?;
        self.backup.store_collection(collection).await
    }

    async fn clean_up(&self) -> StorageResult<()> {
        self.primary.clean_up().await
    }

    async fn ping(&self, timeout: Duration) -> StorageResult<()> {
        self.primary.ping(timeout).await?;
        self.backup.ping(timeout).await
    }

    async fn close(&self) {
        self.primary.close().await;
        self.backup.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::persistence::MemoryStorage;

    #[tokio::test]
    async fn test_writes_reach_both_tiers() {
        let primary = Arc::new(MemoryStorage::new());
        let backup = Arc::new(MemoryStorage::new());
        let storage = WriteThroughStorage::new(primary.clone(), backup.clone());

        storage.store(Metric::counter("PollCount", 2)).await.unwrap();
        storage.store(Metric::counter("PollCount", 3)).await.unwrap();

        assert_eq!(
            primary.get_collection().await.unwrap()["PollCount"].delta,
            Some(5)
        );
        assert_eq!(
            backup.get_collection().await.unwrap()["PollCount"].delta,
            Some(5)
        );
    }

    #[tokio::test]
    async fn test_rejected_metric_touches_neither_tier() {
        let primary = Arc::new(MemoryStorage::new());
        let backup = Arc::new(MemoryStorage::new());
        let storage = WriteThroughStorage::new(primary.clone(), backup.clone());

        assert!(storage.store(Metric::counter("", 1)).await.is_err());
        assert!(primary.is_empty().await);
        assert!(backup.is_empty().await);
    }
}
