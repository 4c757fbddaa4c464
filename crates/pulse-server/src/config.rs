//! Server configuration
//!
//! Loaded from an optional TOML file; CLI flags override individual fields.
//!
//! ```toml
//! bind = "127.0.0.1:8080"
//! disclosure_threshold = 25
//! seed_catalog = true
//! ```

use crate::error::ServerError;
use pulse_model::DISCLOSURE_THRESHOLD;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

/// Server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Listen address
    pub bind: SocketAddr,
    /// Minimum sample count before per-candidate counts are disclosed
    pub disclosure_threshold: u64,
    /// Load the sample catalog at start
    pub seed_catalog: bool,
}

impl ServerConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With listen address
    #[inline]
    #[must_use]
    pub fn with_bind(mut self, bind: SocketAddr) -> Self {
        self.bind = bind;
        self
    }

    /// With disclosure threshold (checked by [`ServerConfig::validate`])
    #[inline]
    #[must_use]
    pub fn with_threshold(mut self, threshold: u64) -> Self {
        self.disclosure_threshold = threshold;
        self
    }

    /// With or without the sample catalog
    #[inline]
    #[must_use]
    pub fn with_seed_catalog(mut self, seed: bool) -> Self {
        self.seed_catalog = seed;
        self
    }

    /// Parse TOML
    ///
    /// # Errors
    /// `Config` for malformed TOML or an invalid value
    pub fn from_toml_str(source: &str) -> Result<Self, ServerError> {
        let config: Self =
            toml::from_str(source).map_err(|e| ServerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file
    ///
    /// # Errors
    /// `Config` when the file cannot be read or parsed
    pub fn load(path: &Path) -> Result<Self, ServerError> {
        let source = std::fs::read_to_string(path)
            .map_err(|e| ServerError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&source)
    }

    /// Reject a threshold below the k-anonymity floor
    ///
    /// # Errors
    /// `Config` describing the violation
    pub fn validate(&self) -> Result<(), ServerError> {
        if self.disclosure_threshold < DISCLOSURE_THRESHOLD {
            return Err(ServerError::Config(format!(
                "disclosure_threshold must be at least {DISCLOSURE_THRESHOLD}, got {}",
                self.disclosure_threshold
            )));
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8080)),
            disclosure_threshold: DISCLOSURE_THRESHOLD,
            seed_catalog: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = ServerConfig::new();
        assert!(config.validate().is_ok());
        assert_eq!(config.disclosure_threshold, 25);
        assert!(config.seed_catalog);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = ServerConfig::from_toml_str("disclosure_threshold = 40").unwrap();
        assert_eq!(config.disclosure_threshold, 40);
        assert_eq!(config.bind, ServerConfig::default().bind);
    }

    #[test]
    fn low_threshold_is_rejected() {
        let err = ServerConfig::from_toml_str("disclosure_threshold = 5").unwrap_err();
        assert!(matches!(err, ServerError::Config(_)));
        assert!(ServerConfig::new().with_threshold(24).validate().is_err());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(ServerConfig::from_toml_str("threshold = 30").is_err());
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "bind = \"0.0.0.0:9000\"\nseed_catalog = false").unwrap();

        let config = ServerConfig::load(file.path()).unwrap();
        assert_eq!(config.bind.port(), 9000);
        assert!(!config.seed_catalog);
    }

    #[test]
    fn missing_file_is_config_error() {
        let err = ServerConfig::load(Path::new("/nonexistent/pulse.toml")).unwrap_err();
        assert_eq!(err.status(), 500);
    }
}
