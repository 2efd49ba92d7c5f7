//! Client configuration
//!
//! Everything the surrounding application hands to the client: where the
//! API lives, how large pages should be, how long a transfer may stall,
//! and which credential to present. Configs can be built in code, loaded
//! with serde, or read from the environment.

use crate::error::{Error, Result};
use crate::http::RateLimiterConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Default API endpoint
pub const DEFAULT_BASE_URL: &str = "https://api.github.com";

/// Largest page size the API accepts; the server default is 30
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Idle window after which a stalled transfer is killed
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Number of pages allowed in flight or unconsumed at once
pub const DEFAULT_QUEUE_CAPACITY: usize = 5;

/// Environment variable overriding the base URL
pub const ENV_API_URL: &str = "GITHUB_API";

/// Environment variable holding the API token
pub const ENV_TOKEN: &str = "GITHUB_TOKEN";

// ============================================================================
// Credential
// ============================================================================

/// Credential sent in the `Authorization` header
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Credential {
    /// `Authorization: token <value>`
    Token(String),
    /// `Authorization: Bearer <value>`
    Bearer(String),
}

impl Credential {
    /// Header value for this credential
    pub fn header_value(&self) -> String {
        match self {
            Credential::Token(t) => format!("token {t}"),
            Credential::Bearer(t) => format!("Bearer {t}"),
        }
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::Token(_) => f.write_str("Token(REDACTED)"),
            Credential::Bearer(_) => f.write_str("Bearer(REDACTED)"),
        }
    }
}

// ============================================================================
// ClientConfig
// ============================================================================

/// Configuration for [`crate::Client`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL relative URIs are resolved against
    pub base_url: String,
    /// Value sent as the `per_page` query parameter
    pub page_size: u32,
    /// Idle window for reads and writes
    #[serde(with = "duration_secs")]
    pub idle_timeout: Duration,
    /// Dial timeout for new connections
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,
    /// Bound on pages in flight or awaiting consumption
    pub queue_capacity: usize,
    /// Maximum number of pages to follow (None = unlimited)
    pub max_pages: Option<usize>,
    /// User agent string
    pub user_agent: String,
    /// Optional pacing of page requests
    pub rate_limit: Option<RateLimiterConfig>,
    /// Credential to present, if any
    pub credential: Option<Credential>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            connect_timeout: Duration::from_secs(30),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_pages: None,
            user_agent: format!("pagerelay/{}", env!("CARGO_PKG_VERSION")),
            rate_limit: None,
            credential: None,
        }
    }
}

impl ClientConfig {
    /// Create a new config builder
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Defaults overridden by `GITHUB_API` and `GITHUB_TOKEN` when set and non-empty
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(url) = lookup(ENV_API_URL).filter(|v| !v.is_empty()) {
            config.base_url = url;
        }
        if let Some(token) = lookup(ENV_TOKEN).filter(|v| !v.is_empty()) {
            config.credential = Some(Credential::Token(token));
        }
        config
    }

    /// Check the config for values the client cannot work with
    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.base_url)?;
        if self.page_size == 0 {
            return Err(Error::config("page_size must be at least 1"));
        }
        if self.queue_capacity == 0 {
            return Err(Error::config("queue_capacity must be at least 1"));
        }
        if self.idle_timeout.is_zero() {
            return Err(Error::config("idle_timeout must be non-zero"));
        }
        if self.max_pages == Some(0) {
            return Err(Error::config("max_pages must be at least 1"));
        }
        Ok(())
    }
}

/// Builder for client config
#[derive(Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Override the base URL; empty values are ignored
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        if !url.is_empty() {
            self.config.base_url = url;
        }
        self
    }

    /// Set the page size
    pub fn page_size(mut self, size: u32) -> Self {
        self.config.page_size = size;
        self
    }

    /// Set the idle timeout
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    /// Set the connect timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set the response queue capacity
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    /// Cap the number of pages followed
    pub fn max_pages(mut self, pages: usize) -> Self {
        self.config.max_pages = Some(pages);
        self
    }

    /// Set user agent
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.config.user_agent = agent.into();
        self
    }

    /// Pace page requests
    pub fn rate_limit(mut self, config: RateLimiterConfig) -> Self {
        self.config.rate_limit = Some(config);
        self
    }

    /// Use a `token` credential
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.config.credential = Some(Credential::Token(token.into()));
        self
    }

    /// Set the credential
    pub fn credential(mut self, credential: Credential) -> Self {
        self.config.credential = Some(credential);
        self
    }

    /// Build the config
    pub fn build(self) -> ClientConfig {
        self.config
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
