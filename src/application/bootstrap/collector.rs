use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::application::checkpoint::{CheckpointMode, Restorer, WriteThroughStorage};
use crate::application::collector::MetricService;
use crate::config::ServerConfig;
use crate::domain::storage::MetricStorage;
use crate::infrastructure::factory::StorageFactory;
use crate::infrastructure::security::{Decryptor, Encryptor, Envelope, Signer};

/// Everything the collector's transports need, wired from configuration.
pub struct CollectorHandle {
    pub service: MetricService,
    pub envelope: Envelope,
    pub storage: Arc<dyn MetricStorage>,
    restorer: Option<Arc<Restorer>>,
    mode: CheckpointMode,
}

pub struct CollectorBootstrap;

impl CollectorBootstrap {
    /// Build the storage tiers and restore the backup when asked to.
    ///
    /// The restore finishes before this returns, so no request can race it.
    pub async fn init(config: &ServerConfig) -> Result<CollectorHandle> {
        let primary = StorageFactory::primary(config.database_dsn.clone())
            .create()
            .await
            .context("Failed to open primary storage")?;

        // A database primary is durable on its own and is never checkpointed
        let backup_factory = match &config.database_dsn {
            Some(_) => {
                if config.store_file.is_some() {
                    info!("Database storage configured, store file is not used");
                }
                None
            }
            None => StorageFactory::backup(config.store_file.clone()),
        };
        let backup = match backup_factory {
            Some(factory) => Some(
                factory
                    .create()
                    .await
                    .context("Failed to open backup storage")?,
            ),
            None => None,
        };

        let mode = CheckpointMode::from_interval(config.store_interval);
        let restorer = backup
            .clone()
            .map(|backup| Arc::new(Restorer::new(primary.clone(), backup)));

        if config.restore
            && let Some(restorer) = &restorer
        {
            if let Err(e) = restorer.restore().await {
                error!("Restore failed, starting with empty storage: {}", e);
            }
        }

        let storage: Arc<dyn MetricStorage> = match (&backup, mode) {
            (Some(backup), CheckpointMode::WriteThrough) => {
                info!("Backup is written through on every update");
                Arc::new(WriteThroughStorage::new(primary.clone(), backup.clone()))
            }
            _ => primary,
        };

        let signer = Signer::new(config.key.as_deref());
        let decryptor = Decryptor::from_file(config.crypto_key.as_deref())
            .context("Failed to load RSA private key")?;
        let envelope = Envelope::new(signer.clone(), Encryptor::default(), decryptor);

        Ok(CollectorHandle {
            service: MetricService::new(storage.clone(), signer),
            envelope,
            storage,
            restorer,
            mode,
        })
    }
}

impl CollectorHandle {
    /// Start periodic checkpoints. `None` when there is no backup tier or
    /// every write already reaches it.
    pub fn spawn_checkpoints(&self, shutdown: watch::Receiver<bool>) -> Option<JoinHandle<()>> {
        let restorer = self.restorer.clone()?;
        if self.mode == CheckpointMode::WriteThrough {
            return None;
        }
        let mode = self.mode;
        Some(tokio::spawn(async move {
            restorer.run(mode, shutdown).await;
        }))
    }
}
