//! JSON file metric storage.
//!
//! There is no in-process cache: every call opens, encodes and closes the
//! file, so this backend is only suitable as the backup tier.
//!
//! Layout on disk is one collection document
//! (`{ "<id>": {"id":..,"type":..,"delta"?:..,"value"?:..,"hash"?:..} }`)
//! optionally followed by single-metric documents appended by `store`, one
//! per line. Reading folds the appended lines into the collection with the
//! merge rule.

use crate::domain::errors::MetricError;
use crate::domain::metric::{Collection, Metric};
use crate::domain::storage::{MetricStorage, StorageResult};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Deserialize)]
#[serde(untagged)]
enum FileDocument {
    Metric(Metric),
    Collection(Collection),
}

pub struct FileStorage {
    path: PathBuf,
    // Serializes read-modify-write cycles on the file
    lock: Mutex<()>,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> StorageResult<Self> {
        let path = path.into();
        if path.as_os_str().is_empty() {
            return Err(MetricError::Storage("empty file path".to_string()));
        }
        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_collection(&self) -> StorageResult<Collection> {
        let content = match fs::read(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Collection::new()),
            Err(e) => return Err(self.io_error("reading", e)),
        };

        let mut collection = Collection::new();
        let stream = serde_json::Deserializer::from_slice(&content).into_iter::<FileDocument>();
        for document in stream {
            let document = document.map_err(|e| {
                MetricError::Storage(format!(
                    "fetching collection from {}: {}",
                    self.path.display(),
                    e
                ))
            })?;
            match document {
                FileDocument::Collection(entries) => {
                    for metric in entries.into_values() {
                        merge_into(&mut collection, metric);
                    }
                }
                FileDocument::Metric(metric) => merge_into(&mut collection, metric),
            }
        }
        Ok(collection)
    }

    async fn write_collection(&self, collection: &Collection) -> StorageResult<()> {
        let mut content = serde_json::to_vec(collection)
            .map_err(|e| MetricError::Storage(format!("encoding collection: {}", e)))?;
        content.push(b'\n');

        // Write to temp file then rename so a crash never leaves half a document
        let temp_path = self.temp_path();
        fs::write(&temp_path, content)
            .await
            .map_err(|e| self.io_error("writing temp file for", e))?;
        fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| self.io_error("renaming temp file onto", e))?;
        Ok(())
    }

    /// Sibling of the store path with `.tmp` appended, never the path itself.
    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone().into_os_string();
        temp.push(".tmp");
        PathBuf::from(temp)
    }

    fn io_error(&self, action: &str, err: std::io::Error) -> MetricError {
        MetricError::Storage(format!("{} {}: {}", action, self.path.display(), err))
    }
}

fn merge_into(collection: &mut Collection, metric: Metric) {
    match collection.get_mut(&metric.id) {
        Some(existing) => existing.merge(&metric),
        None => {
            collection.insert(metric.id.clone(), metric);
        }
    }
}

#[async_trait]
impl MetricStorage for FileStorage {
    fn backend(&self) -> &'static str {
        "file"
    }

    async fn get(&self, _query: &Metric) -> StorageResult<Metric> {
        Err(MetricError::Unimplemented("get"))
    }

    async fn store(&self, metric: Metric) -> StorageResult<()> {
        metric.validate()?;

        let mut line = serde_json::to_vec(&metric)
            .map_err(|e| MetricError::Storage(format!("encoding metric: {}", e)))?;
        line.push(b'\n');

        let _guard = self.lock.lock().await;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| self.io_error("opening", e))?;
        file.write_all(&line)
            .await
            .map_err(|e| self.io_error("appending to", e))?;
        file.flush()
            .await
            .map_err(|e| self.io_error("flushing", e))?;
        Ok(())
    }

    async fn get_collection(&self) -> StorageResult<Collection> {
        let _guard = self.lock.lock().await;
        self.read_collection().await
    }

    async fn store_collection(&self, collection: Collection) -> StorageResult<()> {
        for metric in collection.values() {
            metric.validate()?;
        }

        let _guard = self.lock.lock().await;
        let mut stored = self.read_collection().await?;
        for metric in collection.into_values() {
            merge_into(&mut stored, metric);
        }
        self.write_collection(&stored).await?;

        debug!(
            "Stored collection of {} metrics to {}",
            stored.len(),
            self.path.display()
        );
        Ok(())
    }

    async fn replace_collection(&self, collection: Collection) -> StorageResult<()> {
        for metric in collection.values() {
            metric.validate()?;
        }

        let _guard = self.lock.lock().await;
        self.write_collection(&collection).await?;
        debug!(
            "Replaced {} with {} metrics",
            self.path.display(),
            collection.len()
        );
        Ok(())
    }

    async fn clean_up(&self) -> StorageResult<()> {
        let _guard = self.lock.lock().await;
        fs::File::create(&self.path)
            .await
            .map_err(|e| self.io_error("truncating", e))?;
        Ok(())
    }

    async fn ping(&self, _timeout: Duration) -> StorageResult<()> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        match fs::metadata(parent).await {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(MetricError::Storage(format!(
                "{} is not a directory",
                parent.display()
            ))),
            Err(e) => Err(MetricError::Storage(format!(
                "{} is not reachable: {}",
                parent.display(),
                e
            ))),
        }
    }

    async fn close(&self) {}
}
