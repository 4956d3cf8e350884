use crate::domain::errors::MetricError;
use crate::domain::metric::{Collection, Metric};
use crate::domain::storage::MetricStorage;
use async_trait::async_trait;

/// Client side of the transport protocol, implemented by HTTP and RPC clients
#[async_trait]
pub trait MetricsTransport: Send + Sync {
    async fn update_metric(&self, metric: Metric) -> Result<(), MetricError>;
    async fn batch_update_metrics(&self, collection: Collection) -> Result<(), MetricError>;
    async fn close(&self) -> Result<(), MetricError>;
}

/// One sampling sub-task of the agent, writing straight into local storage
#[async_trait]
pub trait Sampler: Send + Sync {
    fn name(&self) -> &'static str;
    async fn sample(&self, storage: &dyn MetricStorage) -> Result<(), MetricError>;
}
