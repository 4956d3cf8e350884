//! Agent-side transport selection.
//!
//! The agent talks to the collector through [`MetricsTransport`] only;
//! [`TransportClient`] picks HTTP or RPC from configuration.

pub mod http_client;
pub mod http_client_factory;

pub use http_client::HttpClient;
pub use http_client_factory::HttpClientFactory;

use crate::domain::errors::{ConfigError, MetricError};
use crate::domain::metric::{Collection, Metric};
use crate::domain::ports::MetricsTransport;
use crate::infrastructure::rpc::RpcClient;
use crate::infrastructure::security::{Decryptor, Encryptor, Envelope, Signer};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Http,
    #[serde(alias = "grpc")]
    Rpc,
}

impl FromStr for TransportKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(TransportKind::Http),
            "rpc" | "grpc" => Ok(TransportKind::Rpc),
            other => Err(ConfigError::InvalidValue {
                field: "server_type",
                reason: format!("unknown transport {:?}, expected http or rpc", other),
            }),
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Http => f.write_str("http"),
            TransportKind::Rpc => f.write_str("rpc"),
        }
    }
}

/// What a transport client needs to reach and authenticate to the collector.
#[derive(Debug, Clone)]
pub struct TransportSettings {
    pub address: String,
    pub signer: Signer,
    pub encryptor: Encryptor,
    pub request_timeout: Duration,
}

pub enum TransportClient {
    Http(HttpClient),
    Rpc(RpcClient),
}

impl TransportClient {
    pub async fn connect(
        kind: TransportKind,
        settings: TransportSettings,
    ) -> Result<Self, MetricError> {
        match kind {
            TransportKind::Http => {
                let client = HttpClientFactory::create_client(settings.request_timeout)?;
                let envelope =
                    Envelope::new(settings.signer, settings.encryptor, Decryptor::default());
                Ok(TransportClient::Http(
                    HttpClient::new(&settings.address, client, envelope).await,
                ))
            }
            TransportKind::Rpc => {
                if settings.encryptor.is_enabled() {
                    warn!("RPC transport does not encrypt payloads; crypto key ignored");
                }
                Ok(TransportClient::Rpc(RpcClient::new(
                    settings.address,
                    settings.signer,
                    settings.request_timeout,
                )))
            }
        }
    }

    pub fn kind(&self) -> TransportKind {
        match self {
            TransportClient::Http(_) => TransportKind::Http,
            TransportClient::Rpc(_) => TransportKind::Rpc,
        }
    }
}

#[async_trait]
impl MetricsTransport for TransportClient {
    async fn update_metric(&self, metric: Metric) -> Result<(), MetricError> {
        match self {
            TransportClient::Http(client) => client.update_metric(metric).await,
            TransportClient::Rpc(client) => client.update_metric(metric).await,
        }
    }

    async fn batch_update_metrics(&self, collection: Collection) -> Result<(), MetricError> {
        match self {
            TransportClient::Http(client) => client.batch_update_metrics(collection).await,
            TransportClient::Rpc(client) => client.batch_update_metrics(collection).await,
        }
    }

    async fn close(&self) -> Result<(), MetricError> {
        match self {
            TransportClient::Http(client) => client.close().await,
            TransportClient::Rpc(client) => client.close().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_kind_parsing() {
        assert_eq!("http".parse::<TransportKind>().unwrap(), TransportKind::Http);
        assert_eq!("gRPC".parse::<TransportKind>().unwrap(), TransportKind::Rpc);
        assert_eq!("rpc".parse::<TransportKind>().unwrap(), TransportKind::Rpc);
        assert!("carrier-pigeon".parse::<TransportKind>().is_err());
    }

    #[tokio::test]
    async fn test_connect_picks_variant() {
        let settings = TransportSettings {
            address: "127.0.0.1:9".to_string(),
            signer: Signer::disabled(),
            encryptor: Encryptor::default(),
            request_timeout: Duration::from_secs(1),
        };
        let http = TransportClient::connect(TransportKind::Http, settings.clone())
            .await
            .unwrap();
        assert_eq!(http.kind(), TransportKind::Http);

        let rpc = TransportClient::connect(TransportKind::Rpc, settings)
            .await
            .unwrap();
        assert_eq!(rpc.kind(), TransportKind::Rpc);
        // Empty batches never touch the network
        rpc.batch_update_metrics(Collection::new()).await.unwrap();
    }
}
