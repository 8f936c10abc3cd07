//! Client configuration.
//!
//! Defaults suit local use; `from_env` layers the `FETCHSTATE_*` variables on
//! top and validates the result.
//!
//! # Example
//!
//! ```no_run
//! use fetchstate::ClientConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::from_env()?.with_header("accept", "application/json");
//! println!("Dedup scope: {}", config.dedup_scope);
//! # Ok(())
//! # }
//! ```

use fetchstate_core::transport::RequestConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Base URL for relative request targets
pub const ENV_BASE_URL: &str = "FETCHSTATE_BASE_URL";
/// Default transport timeout in seconds
pub const ENV_TIMEOUT_SECS: &str = "FETCHSTATE_TIMEOUT_SECS";
/// How long a caller waits for an outcome, in seconds
pub const ENV_WAIT_TIMEOUT_SECS: &str = "FETCHSTATE_WAIT_TIMEOUT_SECS";
/// `global` or `per-key`
pub const ENV_DEDUP_SCOPE: &str = "FETCHSTATE_DEDUP_SCOPE";
/// Action broadcast buffer size
pub const ENV_BROADCAST_CAPACITY: &str = "FETCHSTATE_BROADCAST_CAPACITY";

/// Configuration error
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable held an unusable value
    #[error("Invalid value for {var}: {value:?}")]
    InvalidValue {
        /// Variable name
        var: String,
        /// Offending value
        value: String,
    },
    /// Configuration validation failed
    #[error("Configuration validation failed: {0}")]
    Validation(String),
}

/// Which requests are compared when looking for duplicates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DedupScope {
    /// One shared "last request" for the whole client; a duplicate under any
    /// key cancels the in-flight request of another key
    Global,
    /// Only requests under the same key are compared
    #[default]
    PerKey,
}

impl FromStr for DedupScope {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "global" => Ok(Self::Global),
            "per-key" | "per_key" | "perkey" => Ok(Self::PerKey),
            _ => Err(ConfigError::InvalidValue {
                var: ENV_DEDUP_SCOPE.to_string(),
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for DedupScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => write!(f, "global"),
            Self::PerKey => write!(f, "per-key"),
        }
    }
}

/// Request client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Transport configuration every request starts from
    pub defaults: RequestConfig,
    /// Duplicate detection scope
    pub dedup_scope: DedupScope,
    /// Upper bound on how long `request` waits for the outcome
    pub wait_timeout: Duration,
    /// Actions buffered for slow observers
    pub broadcast_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            defaults: RequestConfig::new(),
            dedup_scope: DedupScope::default(),
            wait_timeout: Duration::from_secs(60),
            broadcast_capacity: 256,
        }
    }
}

impl ClientConfig {
    /// Load from the process environment
    ///
    /// # Errors
    ///
    /// Returns error if a variable cannot be parsed or the result is invalid
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load using `lookup` to read variables
    ///
    /// # Errors
    ///
    /// Returns error if a variable cannot be parsed or the result is invalid
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(base_url) = lookup(ENV_BASE_URL) {
            config.defaults.base_url = Some(base_url);
        }
        if let Some(value) = lookup(ENV_TIMEOUT_SECS) {
            config.defaults.timeout = Some(Duration::from_secs(parse(ENV_TIMEOUT_SECS, &value)?));
        }
        if let Some(value) = lookup(ENV_WAIT_TIMEOUT_SECS) {
            config.wait_timeout = Duration::from_secs(parse(ENV_WAIT_TIMEOUT_SECS, &value)?);
        }
        if let Some(value) = lookup(ENV_DEDUP_SCOPE) {
            config.dedup_scope = value.parse()?;
        }
        if let Some(value) = lookup(ENV_BROADCAST_CAPACITY) {
            config.broadcast_capacity = parse(ENV_BROADCAST_CAPACITY, &value)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns error if configuration is invalid
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(base_url) = &self.defaults.base_url {
            if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
                return Err(ConfigError::Validation(format!(
                    "base_url must be an http(s) URL, got {base_url}"
                )));
            }
        }
        if self.defaults.timeout.is_some_and(|t| t.is_zero()) {
            return Err(ConfigError::Validation("timeout must be > 0".to_string()));
        }
        if self.wait_timeout.is_zero() {
            return Err(ConfigError::Validation("wait_timeout must be > 0".to_string()));
        }
        if self.broadcast_capacity == 0 {
            return Err(ConfigError::Validation(
                "broadcast_capacity must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Set the base URL
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.defaults.base_url = Some(base_url.into());
        self
    }

    /// Add a default header
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.defaults.headers.insert(name.into(), value.into());
        self
    }

    /// Set the default transport timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.defaults.timeout = Some(timeout);
        self
    }

    /// Set the outcome wait timeout
    #[must_use]
    pub const fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = timeout;
        self
    }

    /// Set the duplicate detection scope
    #[must_use]
    pub const fn with_dedup_scope(mut self, scope: DedupScope) -> Self {
        self.dedup_scope = scope;
        self
    }

    /// Set the action broadcast capacity
    #[must_use]
    pub const fn with_broadcast_capacity(mut self, capacity: usize) -> Self {
        self.broadcast_capacity = capacity;
        self
    }
}

fn parse<T: FromStr>(var: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        var: var.to_string(),
        value: value.to_string(),
    })
}
