//! RateQueue configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main RateQueue configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Scheduler pacing and rate-limit header names
    pub scheduler: SchedulerConfig,

    /// HTTP transport configuration
    pub http: HttpConfig,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Checks that the bearer token environment variable is set.
    /// Call this early in startup to fail fast with clear error messages.
    pub fn validate(&self) -> Result<()> {
        if std::env::var(&self.http.bearer_token_env).is_err() {
            return Err(eyre::eyre!(
                "Bearer token not found. Set the {} environment variable.",
                self.http.bearer_token_env
            ));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    ///
    /// An explicit path must load. Otherwise `./.ratequeue.yml`, then
    /// `<config_dir>/ratequeue/ratequeue.yml`, then built-in defaults; an
    /// unreadable fallback file is logged and skipped.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .ratequeue.yml
        let local_config = PathBuf::from(".ratequeue.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/ratequeue/ratequeue.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("ratequeue").join("ratequeue.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Pause after each completed request before the queue is scanned again
    #[serde(rename = "request-delay-ms")]
    pub request_delay_ms: u64,

    /// Response headers carrying rate-limit metadata
    pub headers: LimitHeaders,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            request_delay_ms: 50,
            headers: LimitHeaders::default(),
        }
    }
}

impl SchedulerConfig {
    /// Get the inter-request delay as a Duration
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }
}

/// Names of the headers that carry an endpoint's quota, remaining count and
/// reset timestamp (seconds since the epoch)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitHeaders {
    pub limit: String,
    pub remaining: String,
    pub reset: String,
}

impl Default for LimitHeaders {
    fn default() -> Self {
        Self {
            limit: "x-rate-limit-limit".to_string(),
            remaining: "x-rate-limit-remaining".to_string(),
            reset: "x-rate-limit-reset".to_string(),
        }
    }
}

/// HTTP transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Appended to every endpoint when building the request URL
    #[serde(rename = "endpoint-suffix")]
    pub endpoint_suffix: String,

    /// Environment variable containing the bearer token
    #[serde(rename = "bearer-token-env")]
    pub bearer_token_env: String,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// User-Agent header sent with every request
    #[serde(rename = "user-agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.twitter.com/1.1".to_string(),
            endpoint_suffix: ".json".to_string(),
            bearer_token_env: "RATEQUEUE_BEARER_TOKEN".to_string(),
            timeout_ms: 30_000,
            user_agent: format!("ratequeue/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl HttpConfig {
    /// Read the bearer token from the configured environment variable
    pub fn get_bearer_token(&self) -> Result<String> {
        std::env::var(&self.bearer_token_env)
            .context(format!("Environment variable {} is not set", self.bearer_token_env))
    }

    /// Get the request timeout as a Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
