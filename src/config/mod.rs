use std::time::Duration;

use garde::Validate;
use serde::Deserialize;

/// Environment variable prefix, e.g. `CLOUD_LABEL_API_KEY`.
pub const ENV_PREFIX: &str = "CLOUD_LABEL_";

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LabelerConfig {
    /// Bearer token for the detection service
    #[garde(length(min = 1))]
    pub api_key: String,

    /// Base URL of the detection service, without trailing slash
    #[serde(default = "default_api_base_url")]
    #[garde(url)]
    pub api_base_url: String,

    /// Free-form prompt sent with every job. Empty means "use the class list".
    #[serde(default)]
    #[garde(skip)]
    pub prompt: String,

    /// Interval between status poll ticks
    #[serde(default = "default_poll_interval_ms")]
    #[garde(range(min = 1))]
    pub poll_interval_ms: u64,

    /// Poll ticks before a job (or chunk) is declared timed out
    #[serde(default = "default_max_polls")]
    #[garde(range(min = 1))]
    pub max_polls: u32,

    /// Images per batch submit
    #[serde(default = "default_batch_size")]
    #[garde(range(min = 1, max = 500))]
    pub batch_size: usize,

    /// Retries after the first attempt for submit and fetch
    #[serde(default = "default_max_retries")]
    #[garde(range(max = 20))]
    pub max_retries: u32,

    /// Upper bound on status requests issued per batch poll tick
    #[serde(default = "default_max_concurrent_polls")]
    #[garde(range(min = 1))]
    pub max_concurrent_polls: usize,

    /// Pause before a retried submit/fetch
    #[serde(default = "default_retry_delay_ms")]
    #[garde(skip)]
    pub retry_delay_ms: u64,
}

fn default_api_base_url() -> String {
    "https://api.yololabel.com/v1".to_string()
}

fn default_poll_interval_ms() -> u64 {
    1500
}

fn default_max_polls() -> u32 {
    200
}

fn default_batch_size() -> usize {
    20
}

fn default_max_retries() -> u32 {
    3
}

fn default_max_concurrent_polls() -> usize {
    5
}

fn default_retry_delay_ms() -> u64 {
    500
}

impl LabelerConfig {
    /// Load from `CLOUD_LABEL_*` variables (a `.env` file is honoured) and validate.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let config: Self = envy::prefixed(ENV_PREFIX).from_env()?;
        config.check()?;
        Ok(config)
    }

    /// All defaults with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_base_url: default_api_base_url(),
            prompt: String::new(),
            poll_interval_ms: default_poll_interval_ms(),
            max_polls: default_max_polls(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            max_concurrent_polls: default_max_concurrent_polls(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }

    pub fn check(&self) -> Result<(), ConfigError> {
        self.validate().map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read configuration from environment: {0}")]
    Env(#[from] envy::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
