use crate::domain::storage::{MetricStorage, StorageResult};
use crate::infrastructure::persistence::{DatabaseStorage, FileStorage, MemoryStorage};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Picks a storage backend from configuration.
///
/// A database DSN wins over a file path; with neither, metrics live in memory.
#[derive(Debug, Clone, Default)]
pub struct StorageFactory {
    pub dsn: Option<String>,
    pub file_path: Option<PathBuf>,
}

impl StorageFactory {
    pub fn new(dsn: Option<String>, file_path: Option<PathBuf>) -> Self {
        Self {
            dsn: dsn.filter(|d| !d.is_empty()),
            file_path: file_path.filter(|p| !p.as_os_str().is_empty()),
        }
    }

    /// Hot tier of the collector: database when a DSN is set, memory otherwise.
    pub fn primary(dsn: Option<String>) -> Self {
        Self::new(dsn, None)
    }

    /// Backup tier of the collector, present only when a store file is set.
    pub fn backup(file_path: Option<PathBuf>) -> Option<Self> {
        let factory = Self::new(None, file_path);
        factory.file_path.is_some().then_some(factory)
    }

    pub async fn create(&self) -> StorageResult<Arc<dyn MetricStorage>> {
        if let Some(dsn) = &self.dsn {
            info!("Using database metric storage");
            return Ok(Arc::new(DatabaseStorage::connect(dsn).await?));
        }
        if let Some(path) = &self.file_path {
            info!("Using file metric storage at {}", path.display());
            return Ok(Arc::new(FileStorage::new(path.clone())?));
        }
        info!("Using in-memory metric storage");
        Ok(Arc::new(MemoryStorage::new()))
    }
}
