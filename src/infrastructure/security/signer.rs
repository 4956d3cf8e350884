use crate::domain::metric::{Collection, Metric};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 signer over a metric's canonical string.
///
/// Without a key the signer is disabled: nothing is signed and every metric
/// verifies.
#[derive(Clone)]
pub struct Signer {
    mac: Option<HmacSha256>,
}

impl Signer {
    pub fn new(key: Option<&str>) -> Self {
        let mac = key
            .filter(|k| !k.is_empty())
            .and_then(|k| HmacSha256::new_from_slice(k.as_bytes()).ok());
        Self { mac }
    }

    pub fn disabled() -> Self {
        Self { mac: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.mac.is_some()
    }

    /// Hex digest of `metric.canonical()`, or `None` when disabled.
    pub fn digest(&self, metric: &Metric) -> Option<String> {
        let mut mac = self.mac.clone()?;
        mac.update(metric.canonical().as_bytes());
        Some(hex::encode(mac.finalize().into_bytes()))
    }

    pub fn sign(&self, metric: &mut Metric) {
        if let Some(hash) = self.digest(metric) {
            metric.hash = Some(hash);
        }
    }

    pub fn sign_all(&self, collection: &mut Collection) {
        for metric in collection.values_mut() {
            self.sign(metric);
        }
    }

    /// Constant-time comparison of the attached hash against a fresh digest.
    pub fn verify(&self, metric: &Metric) -> bool {
        let Some(mac) = self.mac.clone() else {
            return true;
        };
        let Some(expected) = metric.hash.as_deref().and_then(|h| hex::decode(h).ok()) else {
            return false;
        };
        let mut mac = mac;
        mac.update(metric.canonical().as_bytes());
        mac.verify_slice(&expected).is_ok()
    }
}

impl Default for Signer {
    fn default() -> Self {
        Self::disabled()
    }
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}
