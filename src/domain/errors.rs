use crate::domain::metric::MetricKind;
use thiserror::Error;

/// Why a metric was rejected before it reached storage
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvalidReason {
    #[error("No metric ID specified")]
    MissingId,

    #[error("Invalid metric type: {0}")]
    UnknownKind(String),

    #[error("No value passed for {kind} metric")]
    MissingValue { kind: MetricKind },

    #[error("Invalid metric value: {0}")]
    BadValue(String),
}

/// Errors shared by storage backends, the security codec and both transports
#[derive(Debug, Error)]
pub enum MetricError {
    #[error("Invalid metric: {0}")]
    InvalidMetric(#[from] InvalidReason),

    #[error("No value")]
    NoValue,

    #[error("Signature for [{id}] does not match")]
    SignatureMismatch { id: String },

    #[error("Storage failure: {0}")]
    Storage(String),

    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Untrusted subnet: {0}")]
    UntrustedSource(String),

    #[error("{0} is not implemented by this backend")]
    Unimplemented(&'static str),

    #[error("Crypto failure: {0}")]
    Crypto(String),

    #[error("Malformed payload: {0}")]
    Decode(String),
}

impl MetricError {
    /// Local validation and integrity failures are never worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, MetricError::Storage(_) | MetricError::Transport(_))
    }
}

impl From<sqlx::Error> for MetricError {
    fn from(err: sqlx::Error) -> Self {
        MetricError::Storage(err.to_string())
    }
}

/// Errors raised while assembling configuration from flags, env and file
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {reason}")]
    Unreadable { path: String, reason: String },

    #[error("Failed to parse config file {path}: {reason}")]
    Malformed { path: String, reason: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}
