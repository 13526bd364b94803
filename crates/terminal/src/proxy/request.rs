//! Intercepted requests, proxy responses, and the upstream fetcher.

use std::future::Future;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use tracing::{debug, warn};
use url::Url;

use super::ProxyError;

/// Response header naming where a proxied response came from.
pub const SOURCE_HEADER: &str = "x-pricecheck-source";

/// Largest request body forwarded upstream.
pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

const FETCH_TIMEOUT: Duration = Duration::from_secs(20);

/// A request the proxy decides how to serve.
#[derive(Debug, Clone)]
pub struct InterceptedRequest {
    /// HTTP method.
    pub method: Method,
    /// Path and query, relative to the upstream origin. Also the cache key.
    pub url: String,
    /// Request headers.
    pub headers: HeaderMap,
    /// Request body.
    pub body: Bytes,
}

impl InterceptedRequest {
    /// A plain `GET` for `url`.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// A top-level browser navigation to `url`.
    #[must_use]
    pub fn navigation(url: impl Into<String>) -> Self {
        let mut request = Self::get(url);
        request
            .headers
            .insert("sec-fetch-mode", HeaderValue::from_static("navigate"));
        request
            .headers
            .insert(header::ACCEPT, HeaderValue::from_static("text/html"));
        request
    }

    /// Buffer an incoming axum request.
    ///
    /// # Errors
    ///
    /// Returns an error if the body cannot be read or exceeds [`MAX_BODY_BYTES`].
    pub async fn from_axum(request: axum::extract::Request) -> Result<Self, axum::Error> {
        let (parts, body) = request.into_parts();
        let url = parts
            .uri
            .path_and_query()
            .map_or_else(|| parts.uri.path().to_string(), ToString::to_string);
        let body = axum::body::to_bytes(body, MAX_BODY_BYTES).await?;

        Ok(Self {
            method: parts.method,
            url,
            headers: parts.headers,
            body,
        })
    }

    /// The path, without the query string.
    #[must_use]
    pub fn path(&self) -> &str {
        self.url.split_once('?').map_or(self.url.as_str(), |(path, _)| path)
    }

    /// Whether the method is `GET`, the only one ever served from cache.
    #[must_use]
    pub fn is_get(&self) -> bool {
        self.method == Method::GET
    }

    /// Whether this is a top-level navigation rather than a subresource fetch.
    #[must_use]
    pub fn is_navigation(&self) -> bool {
        is_navigation(&self.method, &self.headers)
    }
}

/// Whether a request is a top-level navigation.
///
/// Browsers mark navigations with `Sec-Fetch-Mode: navigate`; clients that do
/// not send fetch metadata are treated as navigating when a `GET` accepts HTML.
#[must_use]
pub fn is_navigation(method: &Method, headers: &HeaderMap) -> bool {
    if method != Method::GET {
        return false;
    }
    if let Some(mode) = headers.get("sec-fetch-mode") {
        return mode.as_bytes().eq_ignore_ascii_case(b"navigate");
    }
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("text/html"))
}

/// Where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    /// Served from the local cache.
    Cache,
    /// Fetched from the upstream origin.
    Network,
    /// Synthesized because nothing else was available.
    Offline,
}

impl ResponseSource {
    /// Value of the [`SOURCE_HEADER`] header.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::Network => "network",
            Self::Offline => "offline",
        }
    }
}

/// A fully buffered response.
#[derive(Debug, Clone)]
pub struct ProxyResponse {
    /// Status code.
    pub status: StatusCode,
    /// End-to-end headers.
    pub headers: HeaderMap,
    /// Body.
    pub body: Bytes,
    /// Provenance.
    pub source: ResponseSource,
}

impl ProxyResponse {
    /// The response served to a navigation when neither cache nor network can
    /// answer.
    #[must_use]
    pub fn offline() -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            headers,
            body: Bytes::from_static(b"Offline"),
            source: ResponseSource::Offline,
        }
    }

    /// Re-tag the provenance.
    #[must_use]
    pub fn with_source(mut self, source: ResponseSource) -> Self {
        self.source = source;
        self
    }
}

impl IntoResponse for ProxyResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response.headers_mut().insert(
            SOURCE_HEADER,
            HeaderValue::from_static(self.source.as_str()),
        );
        response
    }
}

/// Drop headers that describe one connection and must not be forwarded.
fn end_to_end(headers: &HeaderMap) -> HeaderMap {
    let hop_by_hop = [
        header::CONNECTION,
        header::PROXY_AUTHENTICATE,
        header::PROXY_AUTHORIZATION,
        header::TE,
        header::TRAILER,
        header::TRANSFER_ENCODING,
        header::UPGRADE,
        header::HOST,
        header::CONTENT_LENGTH,
        HeaderName::from_static("keep-alive"),
    ];

    let mut filtered = headers.clone();
    for name in &hop_by_hop {
        filtered.remove(name);
    }
    filtered
}

/// The network behind the proxy.
pub trait Fetcher: Send + Sync + 'static {
    /// Perform `request` against the upstream.
    ///
    /// Non-success statuses are returned as responses, not errors.
    fn fetch(
        &self,
        request: &InterceptedRequest,
    ) -> impl Future<Output = Result<ProxyResponse, ProxyError>> + Send;
}

/// [`Fetcher`] that forwards to an HTTP origin.
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    origin: Url,
}

impl HttpFetcher {
    /// Create a fetcher for `origin`.
    #[must_use]
    pub fn new(origin: Url) -> Self {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Upstream client setup failed, using reqwest defaults");
                reqwest::Client::new()
            });
        Self { client, origin }
    }

    /// The upstream origin.
    #[must_use]
    pub const fn origin(&self) -> &Url {
        &self.origin
    }
}

/// Resolve a request target against `origin`.
///
/// Only origin-form targets (`/path?query`) are accepted, and the result must
/// stay on the origin's host and port. A scheme-relative target such as
/// `//elsewhere/x` would otherwise name a different host.
///
/// # Errors
///
/// Returns `ProxyError::ForeignTarget` for anything else.
pub fn upstream_url(origin: &Url, target: &str) -> Result<Url, ProxyError> {
    let (path, query) = target
        .split_once('?')
        .map_or((target, None), |(path, query)| (path, Some(query)));

    if !path.starts_with('/') || path.starts_with("//") {
        return Err(ProxyError::ForeignTarget(target.to_owned()));
    }

    let mut url = origin.clone();
    url.set_path(path);
    url.set_query(query);
    url.set_fragment(None);

    if url.host() != origin.host() || url.port_or_known_default() != origin.port_or_known_default()
    {
        return Err(ProxyError::ForeignTarget(target.to_owned()));
    }
    Ok(url)
}

impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &InterceptedRequest) -> Result<ProxyResponse, ProxyError> {
        let url = upstream_url(&self.origin, &request.url)?;

        debug!(method = %request.method, %url, "Fetching from upstream");

        let response = self
            .client
            .request(request.method.clone(), url)
            .headers(end_to_end(&request.headers))
            .body(request.body.clone())
            .send()
            .await
            .map_err(|e| ProxyError::NetworkUnreachable(e.to_string()))?;

        let status = response.status();
        let headers = end_to_end(response.headers());
        let body = response
            .bytes()
            .await
            .map_err(|e| ProxyError::NetworkUnreachable(e.to_string()))?;

        Ok(ProxyResponse {
            status,
            headers,
            body,
            source: ResponseSource::Network,
        })
    }
}
