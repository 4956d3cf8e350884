//! Body pipeline shared by the HTTP client and server.
//!
//! Sealing: sign every metric, encode as JSON, encrypt, gzip.
//! Opening runs the layers in reverse; signature checks happen in the
//! collector service once the metrics are decoded.

use crate::domain::errors::MetricError;
use crate::domain::metric::Metric;
use crate::infrastructure::security::cipher::{Decryptor, Encryptor};
use crate::infrastructure::security::compression::{gunzip, gzip};
use crate::infrastructure::security::signer::Signer;

#[derive(Debug, Clone, Default)]
pub struct Envelope {
    signer: Signer,
    encryptor: Encryptor,
    decryptor: Decryptor,
}

impl Envelope {
    pub fn new(signer: Signer, encryptor: Encryptor, decryptor: Decryptor) -> Self {
        Self {
            signer,
            encryptor,
            decryptor,
        }
    }

    pub fn signer(&self) -> &Signer {
        &self.signer
    }

    pub fn seal_metric(&self, mut metric: Metric) -> Result<Vec<u8>, MetricError> {
        self.signer.sign(&mut metric);
        let json = serde_json::to_vec(&metric)
            .map_err(|e| MetricError::Decode(format!("encoding metric: {}", e)))?;
        self.wrap(&json)
    }

    pub fn seal_metrics(
        &self,
        metrics: impl IntoIterator<Item = Metric>,
    ) -> Result<Vec<u8>, MetricError> {
        let metrics: Vec<Metric> = metrics
            .into_iter()
            .map(|mut metric| {
                self.signer.sign(&mut metric);
                metric
            })
            .collect();
        let json = serde_json::to_vec(&metrics)
            .map_err(|e| MetricError::Decode(format!("encoding metrics: {}", e)))?;
        self.wrap(&json)
    }

    fn wrap(&self, json: &[u8]) -> Result<Vec<u8>, MetricError> {
        let encrypted = self.encryptor.encrypt(json)?;
        gzip(&encrypted)
    }

    /// Undo transport encoding: gunzip when `gzipped`, then decrypt.
    pub fn open(&self, body: &[u8], gzipped: bool) -> Result<Vec<u8>, MetricError> {
        let body = if gzipped { gunzip(body)? } else { body.to_vec() };
        self.decryptor.decrypt(&body)
    }

    pub fn decrypts(&self) -> bool {
        self.decryptor.is_enabled()
    }
}
