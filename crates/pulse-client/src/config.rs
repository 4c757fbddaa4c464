//! Client configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Bound on one session resolution attempt
    pub resolve_timeout: Duration,
    /// Bound on every other remote call
    pub request_timeout: Duration,
    /// Prefix for every storage key
    pub storage_namespace: String,
}

impl ClientConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With session resolution bound
    #[inline]
    #[must_use]
    pub fn with_resolve_timeout(mut self, timeout: Duration) -> Self {
        self.resolve_timeout = timeout;
        self
    }

    /// With per-call bound
    #[inline]
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// With storage namespace
    #[inline]
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.storage_namespace = namespace.into();
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            resolve_timeout: Duration::from_millis(2500),
            request_timeout: Duration::from_secs(10),
            storage_namespace: "voter-pulse".to_string(),
        }
    }
}
