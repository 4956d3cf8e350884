//! Configuration for the server and agent binaries.
//!
//! Every setting resolves as: command-line flag, then environment variable
//! (both handled by clap), then the optional JSON config file, then the
//! built-in default.

mod agent_config;
mod server_config;

pub use agent_config::{AgentArgs, AgentConfig};
pub use server_config::{ServerArgs, ServerConfig};

use crate::domain::errors::ConfigError;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_ADDRESS: &str = "localhost:8080";

/// Durations accept humantime (`10s`, `1m30s`) or bare seconds (`10`).
pub fn parse_duration(raw: &str) -> Result<Duration, String> {
    let raw = raw.trim();
    if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
        return raw
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|e| e.to_string());
    }
    humantime::parse_duration(raw).map_err(|e| e.to_string())
}

/// Like [`parse_duration`] for values coming from the JSON file.
fn duration_field(field: &'static str, raw: Option<&str>) -> Result<Option<Duration>, ConfigError> {
    raw.map(|raw| {
        parse_duration(raw).map_err(|reason| ConfigError::InvalidValue { field, reason })
    })
    .transpose()
}

/// Read and decode the JSON config file, when one was given.
pub fn load_json<T: DeserializeOwned + Default>(path: Option<&Path>) -> Result<T, ConfigError> {
    let Some(path) = path else {
        return Ok(T::default());
    };
    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Unreadable {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    serde_json::from_str(&raw).map_err(|e| ConfigError::Malformed {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

/// Empty strings switch a setting off.
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn non_empty_path(value: Option<String>) -> Option<PathBuf> {
    non_empty(value).map(PathBuf::from)
}


/// Serialises tests that touch process environment variables.
#[cfg(test)]
pub(crate) fn env_lock() -> &'static std::sync::Mutex<()> {
    static ENV_LOCK: std::sync::OnceLock<std::sync::Mutex<()>> = std::sync::OnceLock::new();
    ENV_LOCK.get_or_init(|| std::sync::Mutex::new(()))
}
