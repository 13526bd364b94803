//! Backend REST client.
//!
//! # Endpoints
//!
//! Relative to the resolved API base (see [`resolve_api_base`]):
//!
//! - `GET devices` - registered devices
//! - `POST devices` - register a device (`{ store_id, name, identifier }`)
//! - `POST devices/{identifier}/heartbeat` - liveness signal, body ignored
//! - `GET products` - full catalog download
//!
//! Requests that need authentication take the caller's [`SessionContext`]
//! explicitly; the client itself holds no credentials.

mod types;

pub use types::{CatalogDownload, DeviceSummary, NewDevice};

use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, instrument, warn};
use url::Url;

use pricecheck_core::DeviceIdentifier;

use crate::session::SessionContext;

/// Port the backend listens on when no override is configured.
pub const DEFAULT_API_PORT: u16 = 8000;

/// Path prefix of the backend API.
pub const API_PATH: &str = "/api/";

/// Compile-time backend override.
pub const BUILD_API_URL: Option<&str> = option_env!("PRICECHECK_API_URL");

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Errors that can occur when talking to the backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The request could not be sent or the response not read.
    #[error("Network unreachable: {0}")]
    NetworkUnreachable(#[from] reqwest::Error),

    /// The backend answered with a non-success status.
    #[error("Backend returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: StatusCode,
        /// Start of the response body.
        body: String,
    },

    /// The response body was not the expected JSON.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// An endpoint URL could not be built.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

/// Pick the backend base URL.
///
/// Order: the compile-time override, then the locally persisted override, then
/// the upstream origin's host on [`DEFAULT_API_PORT`]. Overrides that do not
/// parse as URLs are skipped with a warning. The result always ends in `/` so
/// endpoint paths join beneath it.
#[must_use]
pub fn resolve_api_base(build: Option<&str>, persisted: Option<&str>, origin: &Url) -> Url {
    for (source, candidate) in [("build", build), ("persisted", persisted)] {
        let Some(raw) = candidate.map(str::trim).filter(|s| !s.is_empty()) else {
            continue;
        };
        match Url::parse(raw) {
            Ok(url) => return with_trailing_slash(url),
            Err(e) => warn!(source, value = raw, error = %e, "Ignoring invalid API URL override"),
        }
    }

    let mut url = origin.clone();
    url.set_path(API_PATH);
    url.set_query(None);
    url.set_fragment(None);
    // Only fails for cannot-be-a-base URLs, which never reach here as an origin
    let _ = url.set_port(Some(DEFAULT_API_PORT));
    url
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

/// Client for the backend REST API.
#[derive(Clone)]
pub struct BackendClient {
    inner: Arc<BackendClientInner>,
}

struct BackendClientInner {
    client: reqwest::Client,
    base: Url,
}

impl BackendClient {
    /// Create a client rooted at `base`.
    #[must_use]
    pub fn new(base: Url) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Backend client setup failed, using reqwest defaults");
                reqwest::Client::new()
            });

        Self {
            inner: Arc::new(BackendClientInner {
                client,
                base: with_trailing_slash(base),
            }),
        }
    }

    /// The API base this client talks to.
    #[must_use]
    pub fn base(&self) -> &Url {
        &self.inner.base
    }

    fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        Ok(self.inner.base.join(path)?)
    }

    /// List the devices the backend knows about.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, the status is not 2xx, or the
    /// body is not a device list.
    #[instrument(skip_all)]
    pub async fn list_devices(
        &self,
        session: &SessionContext,
    ) -> Result<Vec<DeviceSummary>, BackendError> {
        let url = self.endpoint("devices")?;
        let request = session.authorize(self.inner.client.get(url));
        let body: types::DeviceListBody = read_json(request).await?;
        Ok(body.into_devices())
    }

    /// Register a device.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the status is not 2xx.
    #[instrument(skip_all, fields(identifier = %device.identifier))]
    pub async fn create_device(
        &self,
        session: &SessionContext,
        device: &NewDevice,
    ) -> Result<(), BackendError> {
        let url = self.endpoint("devices")?;
        let request = session.authorize(self.inner.client.post(url).json(device));
        send(request).await.map(|_| ())
    }

    /// Signal that a device is alive. The response body is ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the status is not 2xx.
    pub async fn heartbeat(&self, identifier: &DeviceIdentifier) -> Result<(), BackendError> {
        let url = self.endpoint(&format!("devices/{}/heartbeat", identifier.as_str()))?;
        send(self.inner.client.post(url)).await.map(|_| ())
    }

    /// Download the full catalog.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, the status is not 2xx, or the
    /// body is not a JSON array. Individual entries that are not products are
    /// counted in [`CatalogDownload::malformed`] instead.
    #[instrument(skip_all)]
    pub async fn fetch_catalog(
        &self,
        session: &SessionContext,
    ) -> Result<CatalogDownload, BackendError> {
        let url = self.endpoint("products")?;
        let request = session.authorize(self.inner.client.get(url));
        let entries: Vec<serde_json::Value> = read_json(request).await?;
        let download = CatalogDownload::from_entries(entries);
        debug!(
            count = download.records.len(),
            malformed = download.malformed,
            "Downloaded catalog"
        );
        Ok(download)
    }
}

/// Send a request and reject non-success statuses.
async fn send(request: reqwest::RequestBuilder) -> Result<reqwest::Response, BackendError> {
    let response = request.send().await?;
    let status = response.status();

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(BackendError::Status {
            status,
            body: body.chars().take(200).collect(),
        });
    }

    Ok(response)
}

/// Send a request and parse the JSON body.
async fn read_json<T: DeserializeOwned>(request: reqwest::RequestBuilder) -> Result<T, BackendError> {
    let response_text = send(request).await?.text().await?;

    serde_json::from_str(&response_text).map_err(|e| {
        warn!(
            error = %e,
            body = %response_text.chars().take(500).collect::<String>(),
            "Failed to parse backend response"
        );
        BackendError::Parse(e)
    })
}
