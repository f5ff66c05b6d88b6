use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use crate::retry::RetryConfig;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://calendar.db";
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:5000";
pub const DEFAULT_API_URL: &str = "http://localhost:5000/api";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Reads get up to four retries, each wait capped at 8s.
pub const QUERY_MAX_ATTEMPTS: u32 = 5;
pub const QUERY_MAX_DELAY: Duration = Duration::from_secs(8);

/// Writes get at most two retries.
pub const MUTATION_MAX_ATTEMPTS: u32 = 3;

/// Server configuration from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub database_url: String,
}

impl Config {
    /// Load configuration from environment variables.
    /// DATABASE_URL defaults to "sqlite://calendar.db",
    /// LISTEN_ADDR to "0.0.0.0:5000".
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string());

        let listen_addr = std::env::var("LISTEN_ADDR")
            .unwrap_or_else(|_| DEFAULT_LISTEN_ADDR.to_string())
            .parse()
            .map_err(|_| ConfigError::Invalid("LISTEN_ADDR", "must be a valid socket address"))?;

        Ok(Config {
            listen_addr,
            database_url,
        })
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}

/// Settings for [`crate::client::EventClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the API, including the `/api` prefix.
    pub base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Policy for reads (list and get).
    pub retry: RetryConfig,
    /// Policy for create, update and delete.
    pub mutation_retry: RetryConfig,
    /// Extra HTTP statuses to retry on top of 5xx (e.g. 429).
    pub retry_statuses: Vec<u16>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
            retry: RetryConfig {
                max_attempts: QUERY_MAX_ATTEMPTS,
                max_delay: QUERY_MAX_DELAY,
                ..RetryConfig::default()
            },
            mutation_retry: RetryConfig {
                max_attempts: MUTATION_MAX_ATTEMPTS,
                ..RetryConfig::default()
            },
            retry_statuses: Vec::new(),
        }
    }
}

impl ClientConfig {
    /// Defaults, with the base URL taken from CALENDAR_API_URL when set.
    pub fn from_env() -> Self {
        let base_url = std::env::var("CALENDAR_API_URL")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        Self {
            base_url,
            ..Self::default()
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_mutation_retry(mut self, retry: RetryConfig) -> Self {
        self.mutation_retry = retry;
        self
    }

    pub fn with_retry_statuses(mut self, statuses: impl IntoIterator<Item = u16>) -> Self {
        self.retry_statuses = statuses.into_iter().collect();
        self
    }
}
