use crate::domain::errors::MetricError;
use reqwest::Client;
use std::time::Duration;

pub struct HttpClientFactory;

impl HttpClientFactory {
    /// Creates the agent's HTTP client.
    ///
    /// No retry middleware: a failed report keeps its metrics in local
    /// storage and the next report cycle sends them again.
    pub fn create_client(request_timeout: Duration) -> Result<Client, MetricError> {
        Client::builder()
            .pool_max_idle_per_host(5)
            .timeout(request_timeout)
            .connect_timeout(request_timeout.min(Duration::from_secs(10)))
            .build()
            .map_err(|e| MetricError::Transport(format!("building http client: {}", e)))
    }
}
