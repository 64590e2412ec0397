//! Resource client configuration.

use std::time::Duration;

use crate::retry::RetryConfig;
use crate::upload::UploadLimits;

pub const DEFAULT_API_URL: &str = "http://localhost:8000/api/v1";

/// Configuration for the HTTP resource client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API prefix, e.g. `http://localhost:8000/api/v1`
    pub base_url: String,
    /// Request timeout
    pub timeout: Duration,
    /// Connect timeout
    pub connect_timeout: Duration,
    /// Retry policy for idempotent reads
    pub retry: RetryConfig,
    /// Client-side upload checks
    pub upload: UploadLimits,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
            retry: RetryConfig::default(),
            upload: UploadLimits::default(),
        }
    }
}

impl ClientConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("JOBSYNC_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
            timeout: Duration::from_secs(
                std::env::var("JOBSYNC_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            connect_timeout: Duration::from_secs(
                std::env::var("JOBSYNC_CONNECT_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            ),
            retry: RetryConfig::from_env(),
            upload: UploadLimits::from_env(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// API prefix without a trailing slash.
    pub fn api_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// Server root, where `/health` lives.
    pub fn root_url(&self) -> &str {
        let api = self.api_url();
        api.strip_suffix("/api/v1").unwrap_or(api)
    }
}
