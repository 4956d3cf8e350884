//! Schema migrations for the SQLite backend.
//!
//! Scripts are embedded at build time and applied in order. Each script is
//! idempotent and its version is recorded in `schema_version`, so reopening
//! an existing database only runs what is missing.

use crate::domain::errors::MetricError;
use sqlx::SqlitePool;
use tracing::info;

const MIGRATIONS: &[(i64, &str, &str)] = &[
    (
        1,
        "create metrics table",
        include_str!("../../../migrations/0001_create_metrics.sql"),
    ),
    (
        2,
        "index metrics by type",
        include_str!("../../../migrations/0002_metrics_type_index.sql"),
    ),
];

pub fn latest_version() -> i64 {
    MIGRATIONS.last().map(|(version, _, _)| *version).unwrap_or(0)
}

pub async fn run(pool: &SqlitePool) -> Result<(), MetricError> {
    sqlx::query("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY)")
        .execute(pool)
        .await
        .map_err(|e| MetricError::Storage(format!("creating schema_version: {}", e)))?;

    let current: Option<i64> = sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
        .fetch_one(pool)
        .await
        .map_err(|e| MetricError::Storage(format!("reading schema version: {}", e)))?;
    let current = current.unwrap_or(0);

    if current >= latest_version() {
        info!("Database schema is up to date (version {})", current);
        return Ok(());
    }

    for (version, name, script) in MIGRATIONS.iter().filter(|(v, _, _)| *v > current) {
        info!("Running migration {} ({})", version, name);
        let mut tx = pool.begin().await?;
        sqlx::query(script)
            .execute(&mut *tx)
            .await
            .map_err(|e| MetricError::Storage(format!("migration {} failed: {}", version, e)))?;
        sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
            .bind(version)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();

        run(&pool).await.unwrap();
        run(&pool).await.unwrap();

        let version: i64 = sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(version, latest_version());

        let tables: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'metrics'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(tables, 1);
    }
}
