//! Configuration types for release-mirror

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Environment variable holding the optional bearer credential
pub const TOKEN_ENV_VAR: &str = "GITHUB_TOKEN";

/// Main configuration for [`Mirror`](crate::mirror::Mirror)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Root of the local mirror (default: "./mirror")
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Also mirror each release's source archive (default: false)
    #[serde(default)]
    pub download_source: bool,

    /// What to do with a present asset whose digest uses an unknown algorithm
    #[serde(default)]
    pub unsupported_digest: UnsupportedDigestPolicy,

    /// Remote API settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Backoff settings for transient failures
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            download_source: false,
            unsupported_digest: UnsupportedDigestPolicy::default(),
            api: ApiConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl Config {
    /// Check the settings that would otherwise make the sync misbehave
    pub fn validate(&self) -> Result<()> {
        if self.api.page_size == 0 {
            return Err(Error::config("api.page_size", "page size must be positive"));
        }
        if url::Url::parse(&self.api.base_url).is_err() {
            return Err(Error::config(
                "api.base_url",
                format!("'{}' is not a valid URL", self.api.base_url),
            ));
        }
        self.retry.validate()
    }
}

/// Remote API configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// API root (default: "https://api.github.com")
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Value of the `X-GitHub-Api-Version` header (default: "2022-11-28")
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Value of the `User-Agent` header
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Items requested per page of the release listing (default: 100)
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Bearer credential attached to every request when present
    ///
    /// Never serialized; see [`ApiConfig::token_from_env`].
    #[serde(skip)]
    pub token: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_version: default_api_version(),
            user_agent: default_user_agent(),
            page_size: default_page_size(),
            token: None,
        }
    }
}

impl ApiConfig {
    /// Read the bearer credential from [`TOKEN_ENV_VAR`]
    ///
    /// Empty values are treated as absent.
    pub fn token_from_env() -> Option<String> {
        std::env::var(TOKEN_ENV_VAR)
            .ok()
            .filter(|token| !token.trim().is_empty())
    }

    /// Builder-style setter for the credential
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }
}

/// Backoff configuration for transient failures
///
/// There is deliberately no attempt limit: a retryable failure is retried until it
/// clears or the process is stopped.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Delay before the first retry (default: 8 seconds)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Ceiling for the delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: false)
    #[serde(default)]
    pub jitter: bool,

    /// Granularity of the sleep loop and spinner redraw (default: 200ms)
    #[serde(default = "default_poll_interval", with = "millis_serde")]
    pub poll_interval: Duration,

    /// HTTP statuses treated as transient (default: 403, 429, 502, 504)
    #[serde(default = "default_retryable_statuses")]
    pub retryable_statuses: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: false,
            poll_interval: default_poll_interval(),
            retryable_statuses: default_retryable_statuses(),
        }
    }
}

impl RetryConfig {
    fn validate(&self) -> Result<()> {
        if self.initial_delay.is_zero() {
            return Err(Error::config(
                "retry.initial_delay",
                "initial delay must be positive",
            ));
        }
        if self.max_delay < self.initial_delay {
            return Err(Error::config(
                "retry.max_delay",
                "max delay must not be below the initial delay",
            ));
        }
        if self.backoff_multiplier.is_nan() || self.backoff_multiplier < 1.0 {
            return Err(Error::config(
                "retry.backoff_multiplier",
                "multiplier must be at least 1.0",
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(Error::config(
                "retry.poll_interval",
                "poll interval must be positive",
            ));
        }
        Ok(())
    }
}

/// Handling of a present asset whose digest algorithm is not recognized
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnsupportedDigestPolicy {
    /// Log an error and compare byte sizes, as for an asset without digest (default)
    #[default]
    SizeFallback,
    /// Log an error and download again
    Refetch,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./mirror")
}

fn default_base_url() -> String {
    "https://api.github.com".to_string()
}

fn default_api_version() -> String {
    "2022-11-28".to_string()
}

fn default_user_agent() -> String {
    concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_page_size() -> u32 {
    100
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(8)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(200)
}

fn default_retryable_statuses() -> Vec<u16> {
    vec![403, 429, 502, 504]
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Duration serialization helper (milliseconds)
mod millis_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
