use crate::config::{DEFAULT_ADDRESS, duration_field, load_json, non_empty, non_empty_path, parse_duration};
use crate::domain::errors::ConfigError;
use crate::infrastructure::security::TrustedSubnet;
use crate::infrastructure::transport::TransportKind;
use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_STORE_INTERVAL: Duration = Duration::from_secs(300);
pub const DEFAULT_STORE_FILE: &str = "/tmp/devops-metrics-db.json";

#[derive(Debug, Clone, Default, Parser)]
#[command(name = "server", about = "Metrics collector server")]
pub struct ServerArgs {
    /// Listen address (host:port)
    #[arg(short = 'a', long, env = "ADDRESS")]
    pub address: Option<String>,

    /// Protocol to serve: http or rpc
    #[arg(short = 's', long = "server-type", env = "SERVER_TYPE")]
    pub server_type: Option<TransportKind>,

    /// Checkpoint interval; 0 writes every update through to the backup
    #[arg(short = 'i', long = "store-interval", env = "STORE_INTERVAL", value_parser = parse_duration)]
    pub store_interval: Option<Duration>,

    /// Backup file; empty disables the file tier
    #[arg(short = 'f', long = "store-file", env = "STORE_FILE")]
    pub store_file: Option<String>,

    /// Restore the backup on start
    #[arg(short = 'r', long, env = "RESTORE", action = clap::ArgAction::Set)]
    pub restore: Option<bool>,

    /// SQLite DSN for the primary storage
    #[arg(short = 'd', long = "database-dsn", env = "DATABASE_DSN")]
    pub database_dsn: Option<String>,

    /// HMAC-SHA256 key
    #[arg(short = 'k', long, env = "KEY")]
    pub key: Option<String>,

    /// PEM file with the RSA private key
    #[arg(long = "crypto-key", env = "CRYPTO_KEY")]
    pub crypto_key: Option<String>,

    /// CIDR that X-Real-IP must fall into
    #[arg(short = 't', long = "trusted-subnet", env = "TRUSTED_SUBNET")]
    pub trusted_subnet: Option<String>,

    /// JSON config file
    #[arg(short = 'c', long, env = "CONFIG")]
    pub config: Option<PathBuf>,
}

/// Server settings as read from the JSON config file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ServerFile {
    address: Option<String>,
    server_type: Option<TransportKind>,
    store_interval: Option<String>,
    store_file: Option<String>,
    restore: Option<bool>,
    database_dsn: Option<String>,
    key: Option<String>,
    crypto_key: Option<String>,
    trusted_subnet: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub address: String,
    pub transport: TransportKind,
    pub store_interval: Duration,
    pub store_file: Option<PathBuf>,
    pub restore: bool,
    pub database_dsn: Option<String>,
    pub key: Option<String>,
    pub crypto_key: Option<PathBuf>,
    pub trusted_subnet: Option<TrustedSubnet>,
}

impl ServerConfig {
    /// Parse process arguments and environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_args(ServerArgs::parse())
    }

    pub fn from_args(args: ServerArgs) -> Result<Self, ConfigError> {
        let file: ServerFile = load_json(args.config.as_deref())?;

        let store_interval = match args.store_interval {
            Some(interval) => interval,
            None => duration_field("store_interval", file.store_interval.as_deref())?
                .unwrap_or(DEFAULT_STORE_INTERVAL),
        };

        let store_file = match args.store_file.or(file.store_file) {
            Some(path) => non_empty_path(Some(path)),
            None => Some(PathBuf::from(DEFAULT_STORE_FILE)),
        };

        let trusted_subnet = non_empty(args.trusted_subnet.or(file.trusted_subnet))
            .map(|cidr| cidr.parse::<TrustedSubnet>())
            .transpose()?;

        Ok(Self {
            address: non_empty(args.address.or(file.address))
                .unwrap_or_else(|| DEFAULT_ADDRESS.to_string()),
            transport: args.server_type.or(file.server_type).unwrap_or_default(),
            store_interval,
            store_file,
            restore: args.restore.or(file.restore).unwrap_or(true),
            database_dsn: non_empty(args.database_dsn.or(file.database_dsn)),
            key: non_empty(args.key.or(file.key)),
            crypto_key: non_empty_path(args.crypto_key.or(file.crypto_key)),
            trusted_subnet,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::env_lock;
    use std::io::Write;

    fn parse(argv: &[&str]) -> ServerConfig {
        let args = ServerArgs::try_parse_from(std::iter::once("server").chain(argv.iter().copied()))
            .unwrap();
        ServerConfig::from_args(args).unwrap()
    }

    #[test]
    fn test_defaults() {
        let _guard = env_lock().lock().unwrap();
        let config = parse(&[]);
        assert_eq!(config.address, DEFAULT_ADDRESS);
        assert_eq!(config.transport, TransportKind::Http);
        assert_eq!(config.store_interval, DEFAULT_STORE_INTERVAL);
        assert_eq!(config.store_file, Some(PathBuf::from(DEFAULT_STORE_FILE)));
        assert!(config.restore);
        assert!(config.database_dsn.is_none());
        assert!(config.trusted_subnet.is_none());
    }

    #[test]
    fn test_flags() {
        let _guard = env_lock().lock().unwrap();
        let config = parse(&[
            "-a",
            "0.0.0.0:9090",
            "-i",
            "0",
            "-f",
            "",
            "-r",
            "false",
            "--server-type",
            "grpc",
            "-t",
            "10.0.0.0/8",
        ]);
        assert_eq!(config.address, "0.0.0.0:9090");
        assert_eq!(config.transport, TransportKind::Rpc);
        assert_eq!(config.store_interval, Duration::ZERO);
        assert!(config.store_file.is_none());
        assert!(!config.restore);
        assert!(config.trusted_subnet.is_some());
    }

    #[test]
    fn test_precedence_flag_env_file() {
        let _guard = env_lock().lock().unwrap();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"address": "file:1", "store_interval": "1s", "restore": false, "key": "from-file"}}"#
        )
        .unwrap();
        let path = file.path().to_string_lossy().to_string();

        unsafe { std::env::set_var("ADDRESS", "env:2") };
        let config = parse(&["-c", &path, "-k", "from-flag"]);
        unsafe { std::env::remove_var("ADDRESS") };

        assert_eq!(config.address, "env:2");
        assert_eq!(config.key.as_deref(), Some("from-flag"));
        assert_eq!(config.store_interval, Duration::from_secs(1));
        assert!(!config.restore);
    }

    #[test]
    fn test_bad_subnet_rejected() {
        let _guard = env_lock().lock().unwrap();
        let args = ServerArgs::try_parse_from(["server", "-t", "10.0.0.0"]).unwrap();
        assert!(matches!(
            ServerConfig::from_args(args),
            Err(ConfigError::InvalidValue { .. })
        ));
    }
}
