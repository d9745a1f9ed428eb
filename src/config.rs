//! Fetch and registry configuration
//!
//! Both structs deserialize from JSON and fall back to defaults for missing
//! fields. `RegistryConfig::from_env` layers environment variables on top.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default number of history points requested per run.
pub const DEFAULT_SAMPLES: usize = 500;

/// Default number of runs whose history is retrieved concurrently.
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Default W&B API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.wandb.ai";

/// Options controlling a history fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Upper bound on points retrieved per run (the registry may subsample).
    pub samples: usize,
    /// Maximum in-flight per-run history requests.
    pub concurrency: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            samples: DEFAULT_SAMPLES,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

/// Connection settings for a remote run registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Base URL of the registry API (without the `/graphql` suffix).
    pub base_url: String,
    /// API key; sent as HTTP basic auth `api:<key>`.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Retries for transient failures (408, 429, 5xx, connect errors).
    pub max_retries: u32,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            timeout_secs: 30,
            max_retries: 3,
        }
    }
}

impl RegistryConfig {
    /// Defaults overridden by `WANDB_BASE_URL`, `WANDB_API_KEY` and
    /// `FANDA_HTTP_TIMEOUT_SECS`.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env(|name| std::env::var(name).ok())
    }

    fn with_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = lookup("WANDB_BASE_URL").filter(|v| !v.is_empty()) {
            self.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(key) = lookup("WANDB_API_KEY").filter(|v| !v.is_empty()) {
            self.api_key = Some(key);
        }
        if let Some(secs) = lookup("FANDA_HTTP_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.timeout_secs = secs;
        }
        self
    }

    /// Request timeout as a `Duration`.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
