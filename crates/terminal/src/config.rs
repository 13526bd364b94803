//! Terminal configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! All optional:
//! - `PRICECHECK_DATA_DIR` - Directory for the databases and `local-storage.json` (default: ./data)
//! - `PRICECHECK_HOST` - Bind address (default: 127.0.0.1)
//! - `PRICECHECK_PORT` - Listen port (default: 4173)
//! - `PRICECHECK_UPSTREAM_URL` - Origin serving the web app (default: <http://127.0.0.1:5173>)
//! - `PRICECHECK_STORE_ID` - Store new devices are bound to (default: 1)
//! - `PRICECHECK_CLIENT_NAME` - Client identification string sent at registration
//! - `PRICECHECK_HEARTBEAT_SECS` - Heartbeat period in seconds (default: 30)
//! - `PRICECHECK_PROXY_MODE` - `cache` or `kill-switch` (default: cache)
//! - `PRICECHECK_API_TOKEN` - Session token for backend calls made by the agent itself
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use url::Url;

use pricecheck_core::StoreId;

use crate::db::StoreLocation;
use crate::db::catalog::DATABASE_NAME;
use crate::identity::EPHEMERAL_FILE_NAME;
use crate::proxy::{CACHE_DATABASE_NAME, ProxyMode};
use crate::session::SessionContext;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A variable is set but its value cannot be used.
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Terminal agent configuration.
///
/// Implements `Debug` manually to redact the API token.
#[derive(Clone)]
pub struct TerminalConfig {
    /// Directory holding every local file
    pub data_dir: PathBuf,
    /// IP address to bind the local server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Origin the proxy forwards to
    pub upstream_url: Url,
    /// Default store binding for registration
    pub store_id: StoreId,
    /// Client identification string
    pub client_name: String,
    /// Heartbeat period
    pub heartbeat_interval: Duration,
    /// Proxy variant
    pub proxy_mode: ProxyMode,
    /// Token for backend calls not made on behalf of a browser request
    pub api_token: Option<SecretString>,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
}

impl std::fmt::Debug for TerminalConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminalConfig")
            .field("data_dir", &self.data_dir)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("upstream_url", &self.upstream_url.as_str())
            .field("store_id", &self.store_id)
            .field("client_name", &self.client_name)
            .field("heartbeat_interval", &self.heartbeat_interval)
            .field("proxy_mode", &self.proxy_mode)
            .field("api_token", &self.api_token.as_ref().map(|_| "[REDACTED]"))
            .field("sentry_dsn", &self.sentry_dsn.as_ref().map(|_| "[REDACTED]"))
            .field("sentry_environment", &self.sentry_environment)
            .finish()
    }
}

impl TerminalConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is set to a value that cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`, which returns a variable's value.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvVar` for values that cannot be parsed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let heartbeat_secs: u64 = parse_or(&get, "PRICECHECK_HEARTBEAT_SECS", 30)?;
        if heartbeat_secs == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "PRICECHECK_HEARTBEAT_SECS".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            data_dir: get("PRICECHECK_DATA_DIR").map_or_else(|| PathBuf::from("data"), PathBuf::from),
            host: parse_or(&get, "PRICECHECK_HOST", IpAddr::from([127, 0, 0, 1]))?,
            port: parse_or(&get, "PRICECHECK_PORT", 4173)?,
            upstream_url: parse_url(&get, "PRICECHECK_UPSTREAM_URL", "http://127.0.0.1:5173")?,
            store_id: parse_or(&get, "PRICECHECK_STORE_ID", StoreId::default())?,
            client_name: get("PRICECHECK_CLIENT_NAME").unwrap_or_else(default_client_name),
            heartbeat_interval: Duration::from_secs(heartbeat_secs),
            proxy_mode: parse_or(&get, "PRICECHECK_PROXY_MODE", ProxyMode::default())?,
            api_token: get("PRICECHECK_API_TOKEN").map(SecretString::from),
            sentry_dsn: get("SENTRY_DSN"),
            sentry_environment: get("SENTRY_ENVIRONMENT"),
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Location of the catalog database.
    #[must_use]
    pub fn catalog_location(&self) -> StoreLocation {
        StoreLocation::File(self.data_dir.join(DATABASE_NAME))
    }

    /// Location of the asset cache database.
    #[must_use]
    pub fn cache_location(&self) -> StoreLocation {
        StoreLocation::File(self.data_dir.join(CACHE_DATABASE_NAME))
    }

    /// Path of the ephemeral key/value file.
    #[must_use]
    pub fn ephemeral_path(&self) -> PathBuf {
        self.data_dir.join(EPHEMERAL_FILE_NAME)
    }

    /// Session built from the configured API token, if any.
    #[must_use]
    pub fn session(&self) -> Option<SessionContext> {
        self.api_token
            .as_ref()
            .map(|token| SessionContext::with_token(token.expose_secret()))
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Client identification string used when none is configured.
fn default_client_name() -> String {
    format!(
        "pricecheck-terminal/{} ({})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS
    )
}

/// Parse a variable, falling back to `default` when unset.
fn parse_or<T>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get(key).map_or(Ok(default), |value| {
        value
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    })
}

/// Parse an absolute http(s) URL, falling back to `default` when unset.
fn parse_url(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: &str,
) -> Result<Url, ConfigError> {
    let raw = get(key).unwrap_or_else(|| default.to_string());
    let url = Url::parse(raw.trim())
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("unsupported scheme '{}'", url.scheme()),
        ));
    }
    Ok(url)
}
