//! SQLite metric storage.
//!
//! One row per `(id, type)`. Writes go through a read-merge-write cycle
//! inside a transaction per metric, so the merge rule stays identical to the
//! other backends.

use crate::domain::errors::MetricError;
use crate::domain::metric::{Collection, Metric, MetricKind};
use crate::domain::storage::{MetricStorage, StorageResult};
use crate::infrastructure::persistence::migrations;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, Transaction};
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::info;

pub struct DatabaseStorage {
    pool: SqlitePool,
    migrated: AtomicBool,
    // SQLite allows one writer; serialize read-merge-write cycles up front
    write_lock: Mutex<()>,
}

impl DatabaseStorage {
    /// Connect to `dsn` (`sqlite://path/to/file.db` or `sqlite::memory:`)
    /// and bring the schema up to date.
    pub async fn connect(dsn: &str) -> StorageResult<Self> {
        // Ensure the directory exists if it's a file path
        if let Some(path_part) = dsn.strip_prefix("sqlite://") {
            let path = Path::new(path_part);
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
                && !parent.exists()
            {
                fs::create_dir_all(parent).await.map_err(|e| {
                    MetricError::Storage(format!("creating database directory: {}", e))
                })?;
            }
        }

        let in_memory = dsn.contains(":memory:");
        let options = SqliteConnectOptions::from_str(dsn)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));
        let options = if in_memory {
            options
        } else {
            options.journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        };

        // Every connection to `:memory:` opens its own database
        let max_connections = if in_memory { 1 } else { 5 };
        let pool_options = SqlitePoolOptions::new().max_connections(max_connections);
        // Closing the only `:memory:` connection would drop the database
        let pool_options = if in_memory {
            pool_options.idle_timeout(None).max_lifetime(None)
        } else {
            pool_options
        };
        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| MetricError::Storage(format!("connecting to {}: {}", dsn, e)))?;

        info!("Connected to metrics database: {}", dsn);

        let storage = Self {
            pool,
            migrated: AtomicBool::new(false),
            write_lock: Mutex::new(()),
        };
        storage.migrate().await?;
        Ok(storage)
    }

    async fn migrate(&self) -> StorageResult<()> {
        if self.migrated.load(Ordering::Acquire) {
            return Ok(());
        }
        migrations::run(&self.pool).await?;
        self.migrated.store(true, Ordering::Release);
        Ok(())
    }

    async fn merge_row(tx: &mut Transaction<'_, Sqlite>, metric: &Metric) -> StorageResult<()> {
        let existing = sqlx::query("SELECT id, type, delta, value FROM metrics WHERE id = ? AND type = ?")
            .bind(&metric.id)
            .bind(metric.kind.as_str())
            .fetch_optional(&mut **tx)
            .await?;

        let mut merged = match existing {
            Some(row) => row_to_metric(&row)?,
            None => Metric::zero(metric.id.clone(), metric.kind),
        };
        merged.merge(metric);

        sqlx::query(
            r#"
            INSERT INTO metrics (id, type, delta, value, hash)
            VALUES (?, ?, ?, ?, NULL)
            ON CONFLICT(id, type) DO UPDATE SET
                delta = excluded.delta,
                value = excluded.value,
                hash = NULL
            "#,
        )
        .bind(&merged.id)
        .bind(merged.kind.as_str())
        .bind(merged.delta)
        .bind(merged.value)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

fn row_to_metric(row: &SqliteRow) -> StorageResult<Metric> {
    let kind: String = row.try_get("type")?;
    let kind = MetricKind::from_str(&kind)
        .map_err(|e| MetricError::Storage(format!("corrupt metric row: {}", e)))?;
    Ok(Metric {
        id: row.try_get("id")?,
        kind,
        delta: row.try_get("delta")?,
        value: row.try_get("value")?,
        hash: None,
    })
}

#[async_trait]
impl MetricStorage for DatabaseStorage {
    fn backend(&self) -> &'static str {
        "database"
    }

    async fn get(&self, query: &Metric) -> StorageResult<Metric> {
        query.validate_query()?;

        let row = sqlx::query("SELECT id, type, delta, value FROM metrics WHERE id = ? AND type = ?")
            .bind(&query.id)
            .bind(query.kind.as_str())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => row_to_metric(&row),
            None => Err(MetricError::NoValue),
        }
    }

    async fn store(&self, metric: Metric) -> StorageResult<()> {
        metric.validate()?;

        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;
        Self::merge_row(&mut tx, &metric).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_collection(&self) -> StorageResult<Collection> {
        let rows = sqlx::query("SELECT id, type, delta, value FROM metrics")
            .fetch_all(&self.pool)
            .await?;

        let mut collection = Collection::with_capacity(rows.len());
        for row in rows {
            let metric = row_to_metric(&row)?;
            collection.insert(metric.id.clone(), metric);
        }
        Ok(collection)
    }

    async fn store_collection(&self, collection: Collection) -> StorageResult<()> {
        for metric in collection.values() {
            metric.validate()?;
        }
        for metric in collection.into_values() {
            self.store(metric).await?;
        }
        Ok(())
    }

    async fn clean_up(&self) -> StorageResult<()> {
        let _guard = self.write_lock.lock().await;
        sqlx::query("DELETE FROM metrics")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn ping(&self, timeout: Duration) -> StorageResult<()> {
        match tokio::time::timeout(timeout, sqlx::query("SELECT 1").execute(&self.pool)).await {
            Ok(result) => {
                result?;
                Ok(())
            }
            Err(_) => Err(MetricError::Storage(format!(
                "database ping timed out after {:?}",
                timeout
            ))),
        }
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn storage() -> DatabaseStorage {
        DatabaseStorage::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_store_merges_rows() {
        let storage = storage().await;
        storage.store(Metric::counter("PollCount", 2)).await.unwrap();
        storage.store(Metric::counter("PollCount", 3)).await.unwrap();
        storage.store(Metric::gauge("Alloc", 1.0)).await.unwrap();
        storage.store(Metric::gauge("Alloc", 7.5)).await.unwrap();

        let counter = storage
            .get(&Metric::query("PollCount", MetricKind::Counter))
            .await
            .unwrap();
        assert_eq!(counter.delta, Some(5));

        let gauge = storage
            .get(&Metric::query("Alloc", MetricKind::Gauge))
            .await
            .unwrap();
        assert_eq!(gauge.value, Some(7.5));
    }

    #[tokio::test]
    async fn test_get_miss_is_no_value() {
        let storage = storage().await;
        storage.store(Metric::counter("PollCount", 1)).await.unwrap();

        let wrong_kind = storage
            .get(&Metric::query("PollCount", MetricKind::Gauge))
            .await;
        assert!(matches!(wrong_kind, Err(MetricError::NoValue)));
    }

    #[tokio::test]
    async fn test_store_collection_and_clean_up() {
        let storage = storage().await;
        let collection: Collection = [
            ("PollCount".to_string(), Metric::counter("PollCount", 4)),
            ("Alloc".to_string(), Metric::gauge("Alloc", 3.25)),
        ]
        .into_iter()
        .collect();

        storage.store_collection(collection.clone()).await.unwrap();
        storage.store_collection(collection).await.unwrap();

        let stored = storage.get_collection().await.unwrap();
        assert_eq!(stored["PollCount"].delta, Some(8));
        assert_eq!(stored["Alloc"].value, Some(3.25));

        storage.clean_up().await.unwrap();
        assert!(storage.get_collection().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ping_and_close() {
        let storage = storage().await;
        storage.ping(Duration::from_secs(1)).await.unwrap();

        storage.close().await;
        storage.close().await;
        assert!(storage.ping(Duration::from_secs(1)).await.is_err());
    }

    #[tokio::test]
    async fn test_file_database_survives_reconnect() {
        let dir = tempfile::tempdir().unwrap();
        let dsn = format!("sqlite://{}", dir.path().join("nested/metrics.db").display());

        let storage = DatabaseStorage::connect(&dsn).await.unwrap();
        storage.store(Metric::counter("PollCount", 9)).await.unwrap();
        storage.close().await;

        let reopened = DatabaseStorage::connect(&dsn).await.unwrap();
        let counter = reopened
            .get(&Metric::query("PollCount", MetricKind::Counter))
            .await
            .unwrap();
        assert_eq!(counter.delta, Some(9));
    }
}
