//! Runtime environment detection
//!
//! Inside the managed container service the platform mounts a short-lived
//! OAuth token at [`SESSION_TOKEN_PATH`] and injects the connection details as
//! environment variables. Everywhere else the gateway runs with a user's own
//! programmatic access token.

use log::{debug, info};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{GatewayError, Result};

/// Token file mounted by the container service
pub const SESSION_TOKEN_PATH: &str = "/snowflake/session/token";

/// Warehouse used when none is configured
pub const DEFAULT_WAREHOUSE: &str = "COMPUTE_WH";

/// Schema used when none is configured
pub const DEFAULT_SCHEMA: &str = "PUBLIC";

/// Where the gateway is running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentKind {
    /// Managed container service with a mounted session token
    Container,

    /// Developer machine or any other host
    Local,
}

impl fmt::Display for EnvironmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvironmentKind::Container => write!(f, "container"),
            EnvironmentKind::Local => write!(f, "local"),
        }
    }
}

/// Bearer credentials for the SQL API
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Session token issued by the container service
    OAuth(String),

    /// User-issued programmatic access token
    ProgrammaticAccessToken(String),
}

impl Credentials {
    /// Value of the token-type header expected by the SQL API
    pub fn token_type(&self) -> &'static str {
        match self {
            Credentials::OAuth(_) => "OAUTH",
            Credentials::ProgrammaticAccessToken(_) => "PROGRAMMATIC_ACCESS_TOKEN",
        }
    }

    /// Raw token
    pub fn token(&self) -> &str {
        match self {
            Credentials::OAuth(token) | Credentials::ProgrammaticAccessToken(token) => token,
        }
    }
}

// Tokens must never reach a log line
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credentials({}, <redacted>)", self.token_type())
    }
}

/// Everything needed to open a warehouse connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionParameters {
    /// Detected environment
    pub kind: EnvironmentKind,

    /// Explicit API host (container service provides one)
    pub host: Option<String>,

    /// Account identifier
    pub account: String,

    /// Login name (local only)
    pub user: Option<String>,

    /// Virtual warehouse
    pub warehouse: String,

    /// Default database
    pub database: Option<String>,

    /// Default schema
    pub schema: String,

    /// Bearer credentials
    #[serde(skip)]
    pub credentials: Credentials,
}

impl ConnectionParameters {
    /// Base URL of the SQL API
    pub fn base_url(&self) -> String {
        match &self.host {
            Some(host) if host.starts_with("http://") || host.starts_with("https://") => {
                host.trim_end_matches('/').to_string()
            }
            Some(host) => format!("https://{}", host),
            None => format!("https://{}.snowflakecomputing.com", self.account),
        }
    }
}

/// Snapshot of the process environment used for detection
#[derive(Debug, Clone)]
pub struct Environment {
    token_path: PathBuf,
    vars: HashMap<String, String>,
}

impl Environment {
    /// Read the real process environment
    pub fn from_process() -> Self {
        Self::new(SESSION_TOKEN_PATH, std::env::vars().collect())
    }

    /// Build from an explicit token path and variable set
    pub fn new(token_path: impl AsRef<Path>, vars: HashMap<String, String>) -> Self {
        Self {
            token_path: token_path.as_ref().to_path_buf(),
            vars,
        }
    }

    /// Token path that is checked for the container environment
    pub fn token_path(&self) -> &Path {
        &self.token_path
    }

    /// Which environment we are in
    pub fn kind(&self) -> EnvironmentKind {
        if self.token_path.exists() {
            EnvironmentKind::Container
        } else {
            EnvironmentKind::Local
        }
    }

    fn var(&self, name: &str) -> Option<String> {
        self.vars
            .get(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, name: &str) -> Result<String> {
        self.var(name).ok_or_else(|| {
            GatewayError::Config(format!("missing environment variable {}", name))
        })
    }

    /// Read the session token mounted by the container service
    pub fn session_token(&self) -> Result<String> {
        let token = fs::read_to_string(&self.token_path)?;
        let token = token.trim();
        if token.is_empty() {
            return Err(GatewayError::Config(format!(
                "session token file {} is empty",
                self.token_path.display()
            )));
        }
        Ok(token.to_string())
    }

    /// Resolve connection parameters for the detected environment
    pub fn connection_parameters(&self) -> Result<ConnectionParameters> {
        let kind = self.kind();
        let warehouse = self
            .var("SNOWFLAKE_WAREHOUSE")
            .unwrap_or_else(|| DEFAULT_WAREHOUSE.to_string());
        let schema = self
            .var("SNOWFLAKE_SCHEMA")
            .unwrap_or_else(|| DEFAULT_SCHEMA.to_string());

        let params = match kind {
            EnvironmentKind::Container => {
                debug!("Using container session token from {}", self.token_path.display());
                ConnectionParameters {
                    kind,
                    host: self.var("SNOWFLAKE_HOST"),
                    account: self.required("SNOWFLAKE_ACCOUNT")?,
                    user: None,
                    warehouse,
                    database: self.var("SNOWFLAKE_DATABASE"),
                    schema,
                    credentials: Credentials::OAuth(self.session_token()?),
                }
            }
            EnvironmentKind::Local => ConnectionParameters {
                kind,
                host: self.var("SNOWFLAKE_HOST"),
                account: self.required("SNOWFLAKE_ACCOUNT")?,
                user: Some(self.required("SNOWFLAKE_USER")?),
                warehouse,
                database: self.var("SNOWFLAKE_DATABASE"),
                schema,
                credentials: Credentials::ProgrammaticAccessToken(
                    self.required("SNOWFLAKE_TOKEN")?,
                ),
            },
        };

        info!(
            "Resolved {} connection for account {} (warehouse {})",
            params.kind, params.account, params.warehouse
        );
        Ok(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_local_environment() {
        let env = Environment::new(
            "/nonexistent/session/token",
            vars(&[
                ("SNOWFLAKE_ACCOUNT", "xy12345"),
                ("SNOWFLAKE_USER", "analyst"),
                ("SNOWFLAKE_TOKEN", "pat-secret"),
            ]),
        );
        assert_eq!(env.kind(), EnvironmentKind::Local);

        let params = env.connection_parameters().unwrap();
        assert_eq!(params.warehouse, DEFAULT_WAREHOUSE);
        assert_eq!(params.schema, DEFAULT_SCHEMA);
        assert_eq!(params.user.as_deref(), Some("analyst"));
        assert_eq!(params.credentials.token_type(), "PROGRAMMATIC_ACCESS_TOKEN");
        assert_eq!(params.base_url(), "https://xy12345.snowflakecomputing.com");
    }

    #[test]
    fn test_container_environment() {
        let mut token = NamedTempFile::new().unwrap();
        writeln!(token, "oauth-secret").unwrap();

        let env = Environment::new(
            token.path(),
            vars(&[
                ("SNOWFLAKE_ACCOUNT", "xy12345"),
                ("SNOWFLAKE_HOST", "xy12345.internal.example"),
                ("SNOWFLAKE_WAREHOUSE", "ANALYTICS_WH"),
            ]),
        );
        assert_eq!(env.kind(), EnvironmentKind::Container);

        let params = env.connection_parameters().unwrap();
        assert_eq!(params.credentials, Credentials::OAuth("oauth-secret".to_string()));
        assert_eq!(params.warehouse, "ANALYTICS_WH");
        assert_eq!(params.base_url(), "https://xy12345.internal.example");
    }

    #[test]
    fn test_missing_and_empty_variables() {
        let env = Environment::new(
            "/nonexistent/session/token",
            vars(&[("SNOWFLAKE_ACCOUNT", "xy12345"), ("SNOWFLAKE_USER", "  ")]),
        );
        let err = env.connection_parameters().unwrap_err();
        assert!(err.to_string().contains("SNOWFLAKE_USER"));
    }

    #[test]
    fn test_empty_token_file() {
        let token = NamedTempFile::new().unwrap();
        let env = Environment::new(token.path(), vars(&[("SNOWFLAKE_ACCOUNT", "a")]));
        assert!(env.connection_parameters().is_err());
    }

    #[test]
    fn test_credentials_are_redacted() {
        let credentials = Credentials::OAuth("super-secret".to_string());
        let printed = format!("{:?}", credentials);
        assert!(!printed.contains("super-secret"));
        assert!(printed.contains("OAUTH"));
    }
}
