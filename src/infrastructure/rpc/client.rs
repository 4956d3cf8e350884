use crate::domain::errors::MetricError;
use crate::domain::metric::{Collection, Metric};
use crate::domain::ports::MetricsTransport;
use crate::infrastructure::rpc::codec::{
    RpcRequest, decode_response, encode_request, read_frame, write_frame,
};
use crate::infrastructure::security::Signer;
use async_trait::async_trait;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// RPC transport client.
///
/// Holds at most one connection, opened lazily and dropped after any I/O
/// failure so the next call reconnects.
pub struct RpcClient {
    addr: String,
    signer: Signer,
    timeout: Duration,
    stream: Mutex<Option<TcpStream>>,
}

impl RpcClient {
    pub fn new(addr: impl Into<String>, signer: Signer, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            signer,
            timeout,
            stream: Mutex::new(None),
        }
    }

    async fn call(&self, request: RpcRequest) -> Result<(), MetricError> {
        let payload = encode_request(&request)?;

        let mut slot = self.stream.lock().await;
        let exchange = async {
            if slot.is_none() {
                debug!("Connecting to RPC collector at {}", self.addr);
                let stream = TcpStream::connect(&self.addr).await.map_err(|e| {
                    MetricError::Transport(format!("connecting to {}: {}", self.addr, e))
                })?;
                stream.set_nodelay(true).ok();
                *slot = Some(stream);
            }
            let Some(stream) = slot.as_mut() else {
                return Err(MetricError::Transport("no connection".to_string()));
            };

            write_frame(stream, &payload).await?;
            match read_frame(stream).await? {
                Some(frame) => decode_response(&frame),
                None => Err(MetricError::Transport(
                    "collector closed the connection".to_string(),
                )),
            }
        };

        let outcome = match tokio::time::timeout(self.timeout, exchange).await {
            Ok(outcome) => outcome,
            Err(_) => Err(MetricError::Transport(format!(
                "request to {} timed out after {:?}",
                self.addr, self.timeout
            ))),
        };

        match outcome {
            Ok(response) => response.into_result(),
            Err(e) => {
                if slot.take().is_some() {
                    warn!("Dropping RPC connection to {}: {}", self.addr, e);
                }
                Err(e)
            }
        }
    }
}

#[async_trait]
impl MetricsTransport for RpcClient {
    async fn update_metric(&self, mut metric: Metric) -> Result<(), MetricError> {
        self.signer.sign(&mut metric);
        self.call(RpcRequest::UpdateMetric(metric)).await
    }

    async fn batch_update_metrics(&self, mut collection: Collection) -> Result<(), MetricError> {
        if collection.is_empty() {
            return Ok(());
        }
        self.signer.sign_all(&mut collection);
        self.call(RpcRequest::BatchUpdateMetrics(
            collection.into_values().collect(),
        ))
        .await
    }

    async fn close(&self) -> Result<(), MetricError> {
        self.stream.lock().await.take();
        Ok(())
    }
}
