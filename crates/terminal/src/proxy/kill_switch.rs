//! Proxy variant that removes every cached asset and then stays out of the way.
//!
//! Deployed instead of [`super::CacheProxy`] when a build must be served fresh
//! from the network, for example while debugging a bad release.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::{info, instrument};

use super::cache::CacheStorage;
use super::request::{Fetcher, InterceptedRequest, ProxyResponse};
use super::{ActivationReport, InstallReport, ProxyError, ProxyState};

/// Self-removing proxy.
pub struct KillSwitchProxy<F> {
    inner: Arc<KillSwitchInner<F>>,
}

impl<F> Clone for KillSwitchProxy<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct KillSwitchInner<F> {
    fetcher: F,
    storage: CacheStorage,
    state: Mutex<ProxyState>,
}

impl<F: Fetcher> KillSwitchProxy<F> {
    /// Create the proxy.
    pub fn new(fetcher: F, storage: CacheStorage) -> Self {
        Self {
            inner: Arc::new(KillSwitchInner {
                fetcher,
                storage,
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

    /// Nothing to pre-cache.
    pub fn install(&self) -> InstallReport {
        self.set_state(ProxyState::Installed);
        InstallReport::default()
    }

    /// Delete every namespace and unregister.
    ///
    /// # Errors
    ///
    /// Returns a storage error if namespaces cannot be listed or deleted; the
    /// proxy still stops intercepting.
    #[instrument(skip(self))]
    pub async fn activate(&self) -> Result<ActivationReport, ProxyError> {
        self.set_state(ProxyState::Activating);

        let result = self.purge().await;
        self.set_state(ProxyState::Redundant);

        let purged = result?;
        info!(purged = purged.len(), "Kill switch purged all caches and unregistered");
        Ok(ActivationReport { purged })
    }

    async fn purge(&self) -> Result<Vec<String>, ProxyError> {
        let mut purged = Vec::new();
        for namespace in self.inner.storage.namespaces().await? {
            self.inner.storage.delete_namespace(&namespace).await?;
            purged.push(namespace);
        }
        Ok(purged)
    }

    /// Install, then activate.
    ///
    /// # Errors
    ///
    /// Returns a storage error from activation.
    pub async fn install_and_activate(&self) -> Result<ActivationReport, ProxyError> {
        self.install();
        self.activate().await
    }

    /// Pass `request` straight to the network.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError::NetworkUnreachable` if the upstream cannot be reached.
    pub async fn handle(&self, request: &InterceptedRequest) -> Result<ProxyResponse, ProxyError> {
        self.inner.fetcher.fetch(request).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::body::Bytes;
    use axum::http::{HeaderMap, StatusCode};

    use super::*;
    use crate::db::StoreLocation;
    use crate::proxy::ResponseSource;

    struct EchoOrigin;

    impl Fetcher for EchoOrigin {
        async fn fetch(&self, request: &InterceptedRequest) -> Result<ProxyResponse, ProxyError> {
            Ok(ProxyResponse {
                status: StatusCode::OK,
                headers: HeaderMap::new(),
                body: Bytes::from(request.url.clone()),
                source: ResponseSource::Network,
            })
        }
    }

    #[tokio::test]
    async fn test_activation_purges_everything() {
        let storage = CacheStorage::new(StoreLocation::Memory);
        let cached = ProxyResponse::offline();
        storage.put("v1", "/index.html", &cached).await.unwrap();
        storage.put("v2", "/index.html", &cached).await.unwrap();

        let proxy = KillSwitchProxy::new(EchoOrigin, storage.clone());
        let report = proxy.install_and_activate().await.unwrap();

        assert_eq!(report.purged.len(), 2);
        assert!(storage.namespaces().await.unwrap().is_empty());
        assert_eq!(proxy.state(), ProxyState::Redundant);
    }

    #[tokio::test]
    async fn test_requests_pass_through() {
        let proxy = KillSwitchProxy::new(EchoOrigin, CacheStorage::new(StoreLocation::Memory));
        proxy.install_and_activate().await.unwrap();

        let response = proxy
            .handle(&InterceptedRequest::navigation("/checkout"))
            .await
            .unwrap();
        assert_eq!(response.source, ResponseSource::Network);
        assert_eq!(response.body, Bytes::from_static(b"/checkout"));
    }
}
