use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use crate::application::agent::MetricsAgent;
use crate::config::AgentConfig;
use crate::domain::ports::Sampler;
use crate::infrastructure::persistence::MemoryStorage;
use crate::infrastructure::sampling::{HostSampler, RuntimeSampler};
use crate::infrastructure::security::{Encryptor, Signer};
use crate::infrastructure::transport::{TransportClient, TransportSettings};

pub struct AgentBootstrap;

impl AgentBootstrap {
    /// Agent with in-memory local storage and both samplers.
    pub async fn init(config: &AgentConfig) -> Result<MetricsAgent> {
        let encryptor = Encryptor::from_file(config.crypto_key.as_deref())
            .context("Failed to load RSA public key")?;
        let settings = TransportSettings {
            address: config.address.clone(),
            signer: Signer::new(config.key.as_deref()),
            encryptor,
            request_timeout: config.request_timeout,
        };
        let transport = TransportClient::connect(config.transport, settings)
            .await
            .context("Failed to set up transport")?;
        info!("Reporting to {} over {}", config.address, transport.kind());

        let samplers: Vec<Arc<dyn Sampler>> =
            vec![Arc::new(RuntimeSampler::new()), Arc::new(HostSampler::new())];

        Ok(MetricsAgent::new(
            Arc::new(MemoryStorage::new()),
            Arc::new(transport),
            samplers,
        ))
    }
}
