//! Request-intercepting cache proxy.
//!
//! Every request the kiosk browser makes that is not part of the local API
//! lands here (see [`crate::routes::proxy`]). Two variants exist, picked by
//! configuration at startup:
//!
//! - [`CacheProxy`] - installs a versioned namespace of shell and build assets
//!   and serves from it, falling back to the upstream origin
//! - [`KillSwitchProxy`] - purges every namespace on activation and forwards
//!   everything to the upstream
//!
//! # Lifecycle
//!
//! `Installing -> Installed -> Activating -> Active`, or `Redundant` for the
//! kill switch. Requests are served in every state; a proxy whose install
//! failed keeps answering from whatever older namespace is still on disk.

pub mod cache;
mod kill_switch;
pub mod manifest;
mod request;
mod worker;

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::db::StoreError;

pub use cache::{CACHE_DATABASE_NAME, CacheStorage};
pub use kill_switch::KillSwitchProxy;
pub use manifest::{CACHE_VERSION, Manifest};
pub use request::{
    Fetcher, HttpFetcher, InterceptedRequest, ProxyResponse, ResponseSource, SOURCE_HEADER,
    is_navigation, upstream_url,
};
pub use worker::CacheProxy;

/// Errors from the cache proxy.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// A shell asset could not be fetched during installation.
    #[error("Asset missing: {url} ({reason})")]
    AssetMissing {
        /// Asset URL.
        url: String,
        /// What went wrong.
        reason: String,
    },

    /// The upstream could not be reached.
    #[error("Network unreachable: {0}")]
    NetworkUnreachable(String),

    /// The request target does not name a path on the upstream origin.
    #[error("Request target outside the upstream origin: {0}")]
    ForeignTarget(String),

    /// The cache database failed.
    #[error("Cache storage error: {0}")]
    Storage(#[from] StoreError),

    /// A lifecycle step was attempted out of order.
    #[error("Proxy is {actual}, expected {expected}")]
    InvalidState {
        /// Required state.
        expected: ProxyState,
        /// Actual state.
        actual: ProxyState,
    },
}

/// Proxy lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyState {
    /// Populating the namespace.
    Installing,
    /// Populated, waiting to activate.
    Installed,
    /// Purging older namespaces.
    Activating,
    /// Serving from the current namespace.
    Active,
    /// Unregistered; passing everything through.
    Redundant,
}

impl ProxyState {
    /// Lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Installing => "installing",
            Self::Installed => "installed",
            Self::Activating => "activating",
            Self::Active => "active",
            Self::Redundant => "redundant",
        }
    }
}

impl fmt::Display for ProxyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a successful installation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
    /// Namespace populated.
    pub version: String,
    /// Shell assets stored.
    pub shell_cached: usize,
    /// Build assets stored.
    pub build_cached: usize,
    /// Build assets that could not be fetched.
    pub build_skipped: usize,
}

/// Result of a successful activation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationReport {
    /// Namespaces deleted.
    pub purged: Vec<String>,
}

/// Which proxy variant to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProxyMode {
    /// Versioned offline cache.
    #[default]
    Cache,
    /// Purge and pass through.
    KillSwitch,
}

impl FromStr for ProxyMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cache" => Ok(Self::Cache),
            "kill-switch" | "kill_switch" | "killswitch" => Ok(Self::KillSwitch),
            other => Err(format!("unknown proxy mode '{other}'")),
        }
    }
}

/// The proxy variant chosen for this deployment.
pub enum ProxyWorker<F> {
    /// Caching proxy.
    Caching(CacheProxy<F>),
    /// Kill switch.
    KillSwitch(KillSwitchProxy<F>),
}

impl<F> Clone for ProxyWorker<F> {
    fn clone(&self) -> Self {
        match self {
            Self::Caching(proxy) => Self::Caching(proxy.clone()),
            Self::KillSwitch(proxy) => Self::KillSwitch(proxy.clone()),
        }
    }
}

impl<F: Fetcher> ProxyWorker<F> {
    /// Build the variant for `mode`.
    pub fn new(mode: ProxyMode, fetcher: F, storage: CacheStorage) -> Self {
        match mode {
            ProxyMode::Cache => Self::Caching(CacheProxy::new(fetcher, storage, Manifest::default())),
            ProxyMode::KillSwitch => Self::KillSwitch(KillSwitchProxy::new(fetcher, storage)),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ProxyState {
        match self {
            Self::Caching(proxy) => proxy.state(),
            Self::KillSwitch(proxy) => proxy.state(),
        }
    }

    /// Install, then activate immediately.
    ///
    /// # Errors
    ///
    /// Returns the first install or activation error.
    pub async fn install_and_activate(&self) -> Result<ActivationReport, ProxyError> {
        match self {
            Self::Caching(proxy) => proxy.install_and_activate().await,
            Self::KillSwitch(proxy) => proxy.install_and_activate().await,
        }
    }

    /// Serve one intercepted request.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError::NetworkUnreachable` when neither cache nor network
    /// can answer a non-navigation request.
    pub async fn handle(&self, request: &InterceptedRequest) -> Result<ProxyResponse, ProxyError> {
        match self {
            Self::Caching(proxy) => proxy.handle(request).await,
            Self::KillSwitch(proxy) => proxy.handle(request).await,
        }
    }
}
