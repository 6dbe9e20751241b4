//! Configuration loaded from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use bulk_queue::{QueueConfig, BATCH_DELAY, DEFAULT_POLL_INTERVAL};
use groq_provider::DEFAULT_PROVIDER;

const DEFAULT_DATABASE_URL: &str = "sqlite:describer.db?mode=rwc";

/// Process configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite database URL.
    pub database_url: String,
    /// Registry name of the chat provider.
    pub provider: String,
    /// Seeds the stored API key when that one is empty.
    pub api_key: Option<String>,
    pub queue: QueueConfig,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Description | Default |
    /// |----------|-------------|---------|
    /// | `DESCRIBER_DATABASE_URL` | SQLite database URL | `sqlite:describer.db?mode=rwc` |
    /// | `DESCRIBER_PROVIDER` | Provider registry name | `groq` |
    /// | `GROQ_API_KEY` | API key used when none is stored | (none) |
    /// | `DESCRIBER_BATCH_DELAY_SECS` | Spacing between bulk jobs | `3` |
    /// | `DESCRIBER_STATUS_WINDOW_DAYS` | Queue status window | `7` |
    /// | `DESCRIBER_RECENT_JOBS` | Rows shown by `status` | `20` |
    /// | `DESCRIBER_POLL_SECS` | Worker rescan interval | `60` |
    ///
    /// `GROQ_API_URL` is read by the HTTP client config.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let defaults = QueueConfig::default();
        let queue = QueueConfig {
            batch_delay: Duration::from_secs(parse_or(
                "DESCRIBER_BATCH_DELAY_SECS",
                var("DESCRIBER_BATCH_DELAY_SECS"),
                BATCH_DELAY.as_secs(),
            )?),
            status_window_days: parse_or(
                "DESCRIBER_STATUS_WINDOW_DAYS",
                var("DESCRIBER_STATUS_WINDOW_DAYS"),
                defaults.status_window_days,
            )?,
            recent_jobs: parse_or(
                "DESCRIBER_RECENT_JOBS",
                var("DESCRIBER_RECENT_JOBS"),
                defaults.recent_jobs,
            )?,
            poll_interval: Duration::from_secs(parse_or(
                "DESCRIBER_POLL_SECS",
                var("DESCRIBER_POLL_SECS"),
                DEFAULT_POLL_INTERVAL.as_secs(),
            )?),
        };
        if queue.poll_interval.is_zero() {
            return Err(ConfigError::Invalid {
                name: "DESCRIBER_POLL_SECS",
                value: "0".to_string(),
            });
        }

        Ok(Self {
            database_url: var("DESCRIBER_DATABASE_URL")
                .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            provider: var("DESCRIBER_PROVIDER").unwrap_or_else(|| DEFAULT_PROVIDER.to_string()),
            api_key: var("GROQ_API_KEY"),
            queue,
        })
    }
}

fn parse_or<T: FromStr>(name: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError> {
    match value {
        None => Ok(default),
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: '{value}'")]
    Invalid { name: &'static str, value: String },
}
