//! Configuration for the gateway
//!
//! This module provides configuration options for the query gateway. Values
//! come from built-in defaults, an optional file (TOML, YAML or JSON) and
//! `QUERY_GUARD__`-prefixed environment variables, in that order.

use query_guard_core::ValidatorConfig;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{GatewayError, Result};
use crate::interception::GateOptions;
use crate::security::RateLimiterConfig;
use crate::warehouse::environment::SESSION_TOKEN_PATH;

/// Prefix of environment variables that override configuration values
pub const ENV_PREFIX: &str = "QUERY_GUARD";

/// Gateway configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listening address for the HTTP surface
    pub listen_addr: SocketAddr,

    /// Query validator configuration
    pub validator: ValidatorConfig,

    /// Rate limiter configuration
    pub rate_limiter: RateLimiterConfig,

    /// Timeout for one warehouse call, in seconds
    pub query_timeout_secs: u64,

    /// Log level used when `RUST_LOG` is not set
    pub log_level: String,

    /// Session token file that marks the container environment
    pub token_path: PathBuf,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8080),
            validator: ValidatorConfig::default(),
            rate_limiter: RateLimiterConfig::default(),
            query_timeout_secs: 30,
            log_level: "info".to_string(),
            token_path: PathBuf::from(SESSION_TOKEN_PATH),
        }
    }
}

impl GatewayConfig {
    /// Create a new gateway configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a file, with environment overrides on top
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(GatewayError::Config(format!(
                "config file {} does not exist",
                path.display()
            )));
        }
        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(Self::env_source())
            .build()?;
        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(Self::env_source())
            .build()?;
        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn env_source() -> config::Environment {
        config::Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true)
    }

    /// Create a configuration for local development
    pub fn for_development() -> Self {
        Self {
            validator: ValidatorConfig::for_development(),
            // Generous limit so iterating on a query is not throttled
            rate_limiter: RateLimiterConfig {
                max_requests: 300,
                ..Default::default()
            },
            log_level: "debug".to_string(),
            ..Default::default()
        }
    }

    /// Create a configuration for production
    pub fn for_production() -> Self {
        Self {
            // Listen on all interfaces in production
            listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 8080),
            ..Default::default()
        }
    }

    /// Create a configuration for testing
    pub fn for_testing() -> Self {
        Self {
            listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0),
            validator: ValidatorConfig::for_testing(),
            rate_limiter: RateLimiterConfig {
                max_requests: 5,
                window_secs: 60,
                ..Default::default()
            },
            query_timeout_secs: 2,
            log_level: "debug".to_string(),
            ..Default::default()
        }
    }

    /// Warehouse call timeout
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    /// Options for the execution gate
    pub fn gate_options(&self) -> GateOptions {
        GateOptions {
            max_rows: self.validator.effective_max_rows(),
            query_timeout: self.query_timeout(),
        }
    }

    /// Check that the configuration is usable
    pub fn validate(&self) -> Result<()> {
        self.validator.validate()?;
        self.rate_limiter.validate()?;
        if self.query_timeout_secs == 0 {
            return Err(GatewayError::Config(
                "query_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::default();
        assert_eq!(config.rate_limiter.max_requests, 30);
        assert_eq!(config.rate_limiter.window_secs, 60);
        assert_eq!(config.query_timeout(), Duration::from_secs(30));
        assert_eq!(config.gate_options().max_rows, 10_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_presets_are_valid() {
        assert!(GatewayConfig::for_development().validate().is_ok());
        assert!(GatewayConfig::for_production().validate().is_ok());
        assert!(GatewayConfig::for_testing().validate().is_ok());
        assert_eq!(GatewayConfig::for_testing().listen_addr.port(), 0);
    }

    #[test]
    fn test_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
query_timeout_secs = 10
listen_addr = "0.0.0.0:9000"

[rate_limiter]
max_requests = 12

[validator]
max_joins = 3
allowed_databases = ["ANALYTICS"]
"#
        )
        .unwrap();

        let config = GatewayConfig::from_file(file.path()).unwrap();
        assert_eq!(config.query_timeout_secs, 10);
        assert_eq!(config.listen_addr.port(), 9000);
        assert_eq!(config.rate_limiter.max_requests, 12);
        assert_eq!(config.rate_limiter.window_secs, 60);
        assert_eq!(config.validator.max_joins, 3);
        assert_eq!(config.validator.allowed_databases, vec!["ANALYTICS".to_string()]);
        assert_eq!(config.validator.max_query_length, 10_000);
    }

    #[test]
    fn test_invalid_file_values_are_rejected() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "query_timeout_secs = 0").unwrap();
        assert!(GatewayConfig::from_file(file.path()).is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = GatewayConfig::from_file("/nonexistent/query-guard.toml").unwrap_err();
        assert!(matches!(err, GatewayError::Config(_)));
    }
}
