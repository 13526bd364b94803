//! The caching proxy: install, activate, then serve by routing rule.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info, instrument, warn};

use super::cache::CacheStorage;
use super::manifest::{self, Manifest, SCOPE_ROOT, SHELL_DOCUMENT};
use super::request::{Fetcher, InterceptedRequest, ProxyResponse, ResponseSource};
use super::{ActivationReport, InstallReport, ProxyError, ProxyState};

/// Versioned caching proxy.
///
/// Cheap to clone; clones share state.
pub struct CacheProxy<F> {
    inner: Arc<CacheProxyInner<F>>,
}

impl<F> Clone for CacheProxy<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct CacheProxyInner<F> {
    fetcher: F,
    storage: CacheStorage,
    manifest: Manifest,
    state: Mutex<ProxyState>,
}

impl<F: Fetcher> CacheProxy<F> {
    /// Create a proxy in the `Installing` state.
    pub fn new(fetcher: F, storage: CacheStorage, manifest: Manifest) -> Self {
        Self {
            inner: Arc::new(CacheProxyInner {
                fetcher,
                storage,
                manifest,
                state: Mutex::new(ProxyState::Installing),
            }),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ProxyState {
        *self
            .inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: ProxyState) {
        *self
            .inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// The cache version this proxy installs.
    pub fn version(&self) -> &str {
        &self.inner.manifest.version
    }

    /// Populate this version's namespace.
    ///
    /// Shell assets are fetched first and stored in one batch; if any is
    /// missing nothing is stored and the previous version stays in place.
    /// Build assets are then cached one by one, skipping failures.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError::AssetMissing` for the first shell asset that could
    /// not be fetched, or a storage error if the batch could not be written.
    #[instrument(skip(self), fields(version = %self.version()))]
    pub async fn install(&self) -> Result<InstallReport, ProxyError> {
        self.set_state(ProxyState::Installing);
        let manifest = &self.inner.manifest;

        let mut shell = Vec::with_capacity(manifest.shell.len());
        for url in &manifest.shell {
            let response = self.fetch_asset(url).await?;
            shell.push((url.clone(), response));
        }
        self.inner.storage.put_all(&manifest.version, &shell).await?;

        let mut build_cached = 0;
        for url in &manifest.build {
            let stored = match self.fetch_asset(url).await {
                Ok(response) => self.inner.storage.put(&manifest.version, url, &response).await,
                Err(e) => {
                    debug!(url, error = %e, "Build asset not pre-cached");
                    continue;
                }
            };
            match stored {
                Ok(()) => build_cached += 1,
                Err(e) => warn!(url, error = %e, "Failed to cache build asset"),
            }
        }

        self.set_state(ProxyState::Installed);

        let report = InstallReport {
            version: manifest.version.clone(),
            shell_cached: shell.len(),
            build_cached,
            build_skipped: manifest.build.len() - build_cached,
        };
        info!(
            shell = report.shell_cached,
            build = report.build_cached,
            skipped = report.build_skipped,
            "Cache installed"
        );
        Ok(report)
    }

    /// Purge every namespace other than this version and start serving.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError::InvalidState` unless installation completed, or a
    /// storage error if namespaces cannot be listed or deleted.
    #[instrument(skip(self), fields(version = %self.version()))]
    pub async fn activate(&self) -> Result<ActivationReport, ProxyError> {
        let state = self.state();
        if state != ProxyState::Installed {
            return Err(ProxyError::InvalidState {
                expected: ProxyState::Installed,
                actual: state,
            });
        }
        self.set_state(ProxyState::Activating);

        let mut purged = Vec::new();
        for namespace in self.inner.storage.namespaces().await? {
            if namespace != self.inner.manifest.version {
                self.inner.storage.delete_namespace(&namespace).await?;
                purged.push(namespace);
            }
        }

        self.set_state(ProxyState::Active);
        info!(purged = purged.len(), "Cache activated, claiming clients");
        Ok(ActivationReport { purged })
    }

    /// Install, then activate without waiting.
    ///
    /// # Errors
    ///
    /// Returns the first install or activation error.
    pub async fn install_and_activate(&self) -> Result<ActivationReport, ProxyError> {
        self.install().await?;
        self.activate().await
    }

    /// Serve one request.
    ///
    /// 1. Build assets: cache, then network.
    /// 2. Navigations: shell document, then the scope root, then network, then
    ///    the offline response.
    /// 3. Anything else: cache, then network.
    ///
    /// Only `GET` consults the cache.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError::NetworkUnreachable` when a non-navigation request
    /// misses the cache and the network fails.
    pub async fn handle(&self, request: &InterceptedRequest) -> Result<ProxyResponse, ProxyError> {
        if !request.is_get() {
            return self.inner.fetcher.fetch(request).await;
        }

        if manifest::is_build_asset(request.path()) {
            return self.cache_first(request).await;
        }

        if request.is_navigation() {
            for key in [SHELL_DOCUMENT, SCOPE_ROOT] {
                if let Some(hit) = self.lookup(key).await {
                    return Ok(hit);
                }
            }
            return match self.inner.fetcher.fetch(request).await {
                Err(ProxyError::NetworkUnreachable(reason)) => {
                    warn!(url = %request.url, %reason, "Navigation failed, serving offline page");
                    Ok(ProxyResponse::offline())
                }
                other => other,
            };
        }

        self.cache_first(request).await
    }

    async fn cache_first(&self, request: &InterceptedRequest) -> Result<ProxyResponse, ProxyError> {
        if let Some(hit) = self.lookup(&request.url).await {
            return Ok(hit);
        }
        self.inner.fetcher.fetch(request).await
    }

    /// Cache lookup. Storage failures are treated as misses.
    async fn lookup(&self, url: &str) -> Option<ProxyResponse> {
        match self.inner.storage.match_url(url, self.version()).await {
            Ok(hit) => hit.map(|response| response.with_source(ResponseSource::Cache)),
            Err(e) => {
                warn!(url, error = %e, "Cache lookup failed, treating as miss");
                None
            }
        }
    }

    async fn fetch_asset(&self, url: &str) -> Result<ProxyResponse, ProxyError> {
        let response = self
            .inner
            .fetcher
            .fetch(&InterceptedRequest::get(url))
            .await
            .map_err(|e| ProxyError::AssetMissing {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        if !response.status.is_success() {
            return Err(ProxyError::AssetMissing {
                url: url.to_string(),
                reason: response.status.to_string(),
            });
        }
        Ok(response)
    }
}
