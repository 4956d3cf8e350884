use crate::config::{DEFAULT_ADDRESS, duration_field, load_json, non_empty, non_empty_path, parse_duration};
use crate::domain::errors::ConfigError;
use crate::infrastructure::transport::TransportKind;
use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Default, Parser)]
#[command(name = "agent", about = "Metrics sampling agent")]
pub struct AgentArgs {
    /// Collector address (host:port)
    #[arg(short = 'a', long, env = "ADDRESS")]
    pub address: Option<String>,

    /// Protocol to report with: http or rpc
    #[arg(short = 's', long = "server-type", env = "SERVER_TYPE")]
    pub server_type: Option<TransportKind>,

    #[arg(short = 'p', long = "poll-interval", env = "POLL_INTERVAL", value_parser = parse_duration)]
    pub poll_interval: Option<Duration>,

    #[arg(short = 'r', long = "report-interval", env = "REPORT_INTERVAL", value_parser = parse_duration)]
    pub report_interval: Option<Duration>,

    /// Per-request timeout for reports
    #[arg(long = "request-timeout", env = "REQUEST_TIMEOUT", value_parser = parse_duration)]
    pub request_timeout: Option<Duration>,

    /// HMAC-SHA256 key
    #[arg(short = 'k', long, env = "KEY")]
    pub key: Option<String>,

    /// PEM file with the collector's RSA public key
    #[arg(long = "crypto-key", env = "CRYPTO_KEY")]
    pub crypto_key: Option<String>,

    /// JSON config file
    #[arg(short = 'c', long, env = "CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AgentFile {
    address: Option<String>,
    server_type: Option<TransportKind>,
    poll_interval: Option<String>,
    report_interval: Option<String>,
    request_timeout: Option<String>,
    key: Option<String>,
    crypto_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub address: String,
    pub transport: TransportKind,
    pub poll_interval: Duration,
    pub report_interval: Duration,
    pub request_timeout: Duration,
    pub key: Option<String>,
    pub crypto_key: Option<PathBuf>,
}

impl AgentConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_args(AgentArgs::parse())
    }

    pub fn from_args(args: AgentArgs) -> Result<Self, ConfigError> {
        let file: AgentFile = load_json(args.config.as_deref())?;

        let resolve = |field: &'static str,
                       flag: Option<Duration>,
                       from_file: Option<&str>,
                       default: Duration|
         -> Result<Duration, ConfigError> {
            let value = match flag {
                Some(value) => value,
                None => duration_field(field, from_file)?.unwrap_or(default),
            };
            if value.is_zero() {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: "must be greater than zero".to_string(),
                });
            }
            Ok(value)
        };

        Ok(Self {
            address: non_empty(args.address.or(file.address))
                .unwrap_or_else(|| DEFAULT_ADDRESS.to_string()),
            transport: args.server_type.or(file.server_type).unwrap_or_default(),
            poll_interval: resolve(
                "poll_interval",
                args.poll_interval,
                file.poll_interval.as_deref(),
                DEFAULT_POLL_INTERVAL,
            )?,
            report_interval: resolve(
                "report_interval",
                args.report_interval,
                file.report_interval.as_deref(),
                DEFAULT_REPORT_INTERVAL,
            )?,
            request_timeout: resolve(
                "request_timeout",
                args.request_timeout,
                file.request_timeout.as_deref(),
                DEFAULT_REQUEST_TIMEOUT,
            )?,
            key: non_empty(args.key.or(file.key)),
            crypto_key: non_empty_path(args.crypto_key.or(file.crypto_key)),
        })
    }
}
