//! Storage Engine abstraction
//!
//! This module defines the one contract every metric backend satisfies,
//! so the collector, the checkpoint restorer and the agent are written
//! against `MetricStorage` and never against a concrete backend.
//!
//! # Backends
//!
//! - `MemoryStorage`: mutex-guarded map, the default hot tier
//! - `FileStorage`: JSON document on disk, backup tier only
//! - `DatabaseStorage`: one SQLite row per metric
//!
//! All three apply [`Metric::merge`](crate::domain::metric::Metric::merge)
//! identically when a metric is stored over an existing id.

use crate::domain::errors::MetricError;
use crate::domain::metric::{Collection, Metric, MetricKind};
use async_trait::async_trait;
use std::time::Duration;

pub type StorageResult<T> = Result<T, MetricError>;

#[async_trait]
pub trait MetricStorage: Send + Sync {
    /// Short backend name for logs
    fn backend(&self) -> &'static str;

    /// Fetch the stored metric matching `query.id` and `query.kind`.
    ///
    /// Fails with `InvalidMetric` before touching storage if the query is
    /// malformed, and with `NoValue` on a miss.
    async fn get(&self, query: &Metric) -> StorageResult<Metric>;

    /// Validate, then merge into any existing entry with the same id.
    async fn store(&self, metric: Metric) -> StorageResult<()>;

    /// Consistent snapshot of every stored metric.
    async fn get_collection(&self) -> StorageResult<Collection>;

    /// Apply `store` to every entry.
    ///
    /// Not atomic across entries: on error, entries already applied stay
    /// applied and the remaining ones are skipped.
    async fn store_collection(&self, collection: Collection) -> StorageResult<()>;

    /// Take every stored metric out, leaving the store empty.
    ///
    /// The default is a snapshot followed by `clean_up`; writes landing in
    /// between are lost. Backends that can swap under one lock override it.
    async fn drain(&self) -> StorageResult<Collection> {
        let collection = self.get_collection().await?;
        self.clean_up().await?;
        Ok(collection)
    }

    /// Make `collection` the entire content of the store.
    ///
    /// The default empties the store first, so a crash in between leaves it
    /// empty. Backends that can swap contents in one step override this.
    async fn replace_collection(&self, collection: Collection) -> StorageResult<()> {
        self.clean_up().await?;
        self.store_collection(collection).await
    }

    /// Empty the store.
    async fn clean_up(&self) -> StorageResult<()>;

    /// Liveness probe bounded by `timeout`.
    async fn ping(&self, timeout: Duration) -> StorageResult<()>;

    /// Release held resources. Calling it twice is harmless.
    async fn close(&self);
}

/// Put a drained collection back after its hand-off failed.
///
/// Counter deltas add to whatever accumulated since the drain. A gauge is
/// only put back when no fresher value for its id arrived meanwhile.
pub async fn merge_back(storage: &dyn MetricStorage, drained: Collection) -> StorageResult<()> {
    let current = storage.get_collection().await?;
    let pending: Collection = drained
        .into_iter()
        .filter(|(id, metric)| metric.kind == MetricKind::Counter || !current.contains_key(id))
        .collect();
    storage.store_collection(pending).await
}
