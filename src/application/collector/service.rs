use crate::domain::errors::MetricError;
use crate::domain::metric::{Metric, collect_merged, validate_all};
use crate::domain::storage::MetricStorage;
use crate::infrastructure::security::Signer;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Collector operations shared by the HTTP and RPC servers.
///
/// Every write is validated and signature-checked before it reaches
/// storage.
#[derive(Clone)]
pub struct MetricService {
    storage: Arc<dyn MetricStorage>,
    signer: Signer,
}

impl MetricService {
    pub fn new(storage: Arc<dyn MetricStorage>, signer: Signer) -> Self {
        Self { storage, signer }
    }

    fn verify(&self, metric: &Metric) -> Result<(), MetricError> {
        if self.signer.verify(metric) {
            Ok(())
        } else {
            warn!("Signature mismatch for metric {}", metric.id);
            Err(MetricError::SignatureMismatch {
                id: metric.id.clone(),
            })
        }
    }

    #[instrument(skip(self, metric), fields(id = %metric.id, kind = %metric.kind))]
    pub async fn update_metric(&self, metric: Metric) -> Result<(), MetricError> {
        metric.validate()?;
        self.verify(&metric)?;
        self.storage.store(metric).await?;
        debug!("Metric updated");
        Ok(())
    }

    /// Path-parameter updates carry no hash, so only validation applies.
    pub async fn update_unsigned(&self, metric: Metric) -> Result<(), MetricError> {
        metric.validate()?;
        self.storage.store(metric).await
    }

    /// All-or-nothing validation, then one merged `store_collection` call.
    #[instrument(skip(self, metrics), fields(count = metrics.len()))]
    pub async fn batch_update(&self, metrics: Vec<Metric>) -> Result<(), MetricError> {
        validate_all(&metrics)?;
        for metric in &metrics {
            self.verify(metric)?;
        }
        let collection = collect_merged(metrics);
        self.storage.store_collection(collection).await?;
        Ok(())
    }

    /// Fetch a metric, signed when a key is configured.
    pub async fn get_metric(&self, query: &Metric) -> Result<Metric, MetricError> {
        query.validate_query()?;
        let mut metric = self.storage.get(query).await?;
        self.signer.sign(&mut metric);
        Ok(metric)
    }

    /// Every stored metric, sorted by id.
    pub async fn all_metrics(&self) -> Result<Vec<Metric>, MetricError> {
        let mut metrics: Vec<Metric> = self.storage.get_collection().await?.into_values().collect();
        metrics.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(metrics)
    }

    pub async fn ping(&self, timeout: Duration) -> Result<(), MetricError> {
        self.storage.ping(timeout).await
    }
}
