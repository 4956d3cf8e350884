use crate::domain::errors::MetricError;
use crate::domain::metric::{Collection, Metric};
use crate::domain::ports::MetricsTransport;
use crate::infrastructure::security::Envelope;
use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE};
use std::net::IpAddr;
use tokio::net::{UdpSocket, lookup_host};
use tracing::{debug, info, warn};

pub const REAL_IP_HEADER: &str = "X-Real-IP";

/// HTTP transport client.
///
/// Bodies go through the [`Envelope`]: signed, JSON encoded, encrypted when
/// a public key is configured, then gzipped.
pub struct HttpClient {
    client: Client,
    base_url: String,
    envelope: Envelope,
    real_ip: Option<IpAddr>,
}

impl HttpClient {
    pub async fn new(address: &str, client: Client, envelope: Envelope) -> Self {
        let real_ip = match outbound_ip(address).await {
            Ok(ip) => Some(ip),
            Err(e) => {
                warn!("Could not resolve outbound address towards {}: {}", address, e);
                None
            }
        };
        let base_url = if address.starts_with("http://") || address.starts_with("https://") {
            address.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", address.trim_end_matches('/'))
        };

        Self {
            client,
            base_url,
            envelope,
            real_ip,
        }
    }

    pub fn real_ip(&self) -> Option<IpAddr> {
        self.real_ip
    }

    async fn post(&self, path: &str, body: Vec<u8>) -> Result<(), MetricError> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .header(CONTENT_ENCODING, "gzip")
            .body(body);
        if let Some(ip) = self.real_ip {
            request = request.header(REAL_IP_HEADER, ip.to_string());
        }

        let response = request
            .send()
            .await
            .map_err(|e| MetricError::Transport(format!("POST {}: {}", url, e)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let message = response.text().await.unwrap_or_default();
        let message = message.trim();
        warn!("Collector answered {} for {}: {}", status, path, message);
        Err(MetricError::Transport(format!("{}: {}", status, message)))
    }
}

/// Local address the OS would use to reach `address`.
///
/// Connecting a UDP socket sends nothing; it only runs route selection.
async fn outbound_ip(address: &str) -> std::io::Result<IpAddr> {
    let target = address
        .trim_start_matches("http://")
        .trim_start_matches("https://")
        .trim_end_matches('/');
    let remote = lookup_host(target).await?.next().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::NotFound, "address did not resolve")
    })?;
    let local = if remote.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
    let socket = UdpSocket::bind(local).await?;
    socket.connect(remote).await?;
    Ok(socket.local_addr()?.ip())
}

#[async_trait]
impl MetricsTransport for HttpClient {
    async fn update_metric(&self, metric: Metric) -> Result<(), MetricError> {
        debug!("Sending metric {} to update", metric.id);
        let body = self.envelope.seal_metric(metric)?;
        self.post("/update", body).await
    }

    async fn batch_update_metrics(&self, collection: Collection) -> Result<(), MetricError> {
        if collection.is_empty() {
            return Ok(());
        }
        info!("Sending a batch of [{}] metrics", collection.len());
        let body = self.envelope.seal_metrics(collection.into_values())?;
        self.post("/updates", body).await
    }

    async fn close(&self) -> Result<(), MetricError> {
        Ok(())
    }
}
