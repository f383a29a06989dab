//! Manager and OpenSearch client configuration.

use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Document manager configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Base index name shared by all document types.
    pub index: String,
    /// Retry policy for document fetches.
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl ManagerConfig {
    /// Create a configuration for the given base index.
    pub fn new(index: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            retry: RetryPolicy::default(),
        }
    }

    /// Set the default number of fetch retries.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retry.retries = retries;
        self
    }

    /// Set the backoff time unit.
    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.retry.unit = unit;
        self
    }

    /// Load configuration from environment variables.
    ///
    /// Reads `ODM_INDEX`, `ODM_FETCH_RETRIES` and `ODM_BACKOFF_UNIT_MS`;
    /// unset or unparsable values keep their defaults.
    pub fn from_env(default_index: impl Into<String>) -> Self {
        let index = std::env::var("ODM_INDEX").unwrap_or_else(|_| default_index.into());
        let mut config = Self::new(index);

        if let Ok(retries) = std::env::var("ODM_FETCH_RETRIES")
            && let Ok(retries) = retries.parse()
        {
            config = config.with_retries(retries);
        }

        if let Ok(unit) = std::env::var("ODM_BACKOFF_UNIT_MS")
            && let Ok(millis) = unit.parse()
        {
            config = config.with_backoff_unit(Duration::from_millis(millis));
        }

        config
    }
}

/// OpenSearch client configuration.
#[derive(Debug, Clone)]
pub struct OpenSearchConfig {
    /// OpenSearch URL(s).
    pub urls: Vec<String>,
    /// Basic auth username.
    pub username: Option<String>,
    /// Basic auth password.
    pub password: Option<String>,
    /// Request timeout.
    pub request_timeout: Duration,
}

impl OpenSearchConfig {
    /// Create a new configuration with a single URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: None,
            password: None,
            request_timeout: Duration::from_secs(30),
        }
    }

    /// Create configuration with multiple URLs for a cluster.
    pub fn cluster(urls: Vec<String>) -> Self {
        Self {
            urls,
            ..Self::new("")
        }
    }

    /// Load configuration from environment variables.
    ///
    /// `OPENSEARCH_URL` may hold a comma-separated list of nodes.
    pub fn from_env() -> Self {
        let mut config = match std::env::var("OPENSEARCH_URL") {
            Ok(urls) => Self::cluster(urls.split(',').map(|s| s.trim().to_string()).collect()),
            Err(_) => Self::new("http://localhost:9200"),
        };

        if let (Ok(username), Ok(password)) = (
            std::env::var("OPENSEARCH_USERNAME"),
            std::env::var("OPENSEARCH_PASSWORD"),
        ) {
            config = config.with_basic_auth(username, password);
        }

        if let Ok(timeout) = std::env::var("OPENSEARCH_TIMEOUT_SECS")
            && let Ok(secs) = timeout.parse()
        {
            config = config.with_request_timeout(Duration::from_secs(secs));
        }

        config
    }

    /// Set basic authentication credentials.
    pub fn with_basic_auth(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Set request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}
