use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

use crate::models::verification::BearerToken;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Base URL of the pipeline API (e.g., "http://127.0.0.1:8000/api").
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Bearer access token for the API. Submit and status calls fail without it.
    #[serde(default)]
    pub api_token: Option<String>,

    /// Seconds between status requests while a job is processing.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Per-request HTTP timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Prometheus scrape listener (e.g., "0.0.0.0:9000"). Disabled when unset.
    #[serde(default)]
    pub metrics_addr: Option<SocketAddr>,
}

fn default_api_base_url() -> String {
    "http://127.0.0.1:8000/api".to_string()
}

fn default_poll_interval_secs() -> u64 {
    3
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn bearer_token(&self) -> Option<BearerToken> {
        self.api_token.clone().and_then(BearerToken::new)
    }
}
