//! Client configuration.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use secrecy::{ExposeSecret, SecretString};

use crate::error::{MemuError, MemuResult};

/// Default API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.memu.so";
/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
/// Default maximum number of retries.
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Default interval between task status checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
/// Default maximum time to wait for a task to finish.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// User agent sent with every request.
pub const USER_AGENT_VALUE: &str = concat!("memu-rust-sdk/", env!("CARGO_PKG_VERSION"));

/// Settings for a [`MemuClient`](crate::MemuClient).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    api_key: SecretString,
    /// API base URL, without trailing slash.
    pub base_url: String,
    /// Per-request transport timeout.
    pub timeout: Duration,
    /// Retry ceiling for the default retry policy.
    pub max_retries: u32,
}

impl ClientConfig {
    /// Create a configuration with default settings.
    ///
    /// The key is trimmed; a blank key is rejected.
    pub fn new(api_key: &str) -> MemuResult<Self> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(MemuError::Configuration("API key is required".to_string()));
        }

        Ok(Self {
            api_key: SecretString::new(api_key.to_string()),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
        })
    }

    /// Load configuration from environment variables.
    ///
    /// `MEMU_API_KEY` is required. `MEMU_BASE_URL`, `MEMU_TIMEOUT_SECS` and
    /// `MEMU_MAX_RETRIES` override the defaults.
    pub fn from_env() -> MemuResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> MemuResult<Self> {
        let api_key = lookup("MEMU_API_KEY")
            .ok_or_else(|| MemuError::Configuration("MEMU_API_KEY not set".to_string()))?;
        let mut config = Self::new(&api_key)?;

        if let Some(base_url) = lookup("MEMU_BASE_URL") {
            config = config.with_base_url(base_url);
        }
        if let Some(secs) = lookup("MEMU_TIMEOUT_SECS") {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                MemuError::Configuration(format!("MEMU_TIMEOUT_SECS is not a number: {}", secs))
            })?;
            config = config.with_timeout(Duration::from_secs(secs));
        }
        if let Some(retries) = lookup("MEMU_MAX_RETRIES") {
            let retries: u32 = retries.trim().parse().map_err(|_| {
                MemuError::Configuration(format!(
                    "MEMU_MAX_RETRIES is not a number: {}",
                    retries
                ))
            })?;
            config = config.with_max_retries(retries);
        }

        Ok(config)
    }

    /// Builder: set the base URL. A trailing slash is dropped.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim().trim_end_matches('/').to_string();
        self
    }

    /// Builder: set the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Builder: set the retry ceiling used by the default policy.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Check that the configuration can be used to build a client.
    pub fn validate(&self) -> MemuResult<()> {
        let url = url::Url::parse(&self.base_url).map_err(|e| {
            MemuError::Configuration(format!("Invalid base URL '{}': {}", self.base_url, e))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(MemuError::Configuration(format!(
                "Base URL must use http or https: {}",
                self.base_url
            )));
        }
        if self.timeout.is_zero() {
            return Err(MemuError::Configuration(
                "Timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Headers sent with every request.
    pub(crate) fn default_headers(&self) -> MemuResult<HeaderMap> {
        let mut authorization =
            HeaderValue::from_str(&format!("Bearer {}", self.api_key.expose_secret()))
                .map_err(|_| MemuError::Configuration("Invalid API key format".to_string()))?;
        authorization.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, authorization);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
        Ok(headers)
    }
}
