//! Application state shared across handlers.

use std::sync::Arc;

use url::Url;

use pricecheck_core::DeviceIdentifier;

use crate::backend::{BUILD_API_URL, BackendClient, resolve_api_base};
use crate::config::TerminalConfig;
use crate::db::LocalCatalogStore;
use crate::identity::{EphemeralStore, keys};
use crate::proxy::{CacheStorage, HttpFetcher, ProxyWorker};
use crate::session::SessionContext;

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// the local stores, the proxy and the backend client.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: TerminalConfig,
    store: LocalCatalogStore,
    ephemeral: Arc<dyn EphemeralStore>,
    proxy: ProxyWorker<HttpFetcher>,
    backend: BackendClient,
    identity: DeviceIdentifier,
}

impl AppState {
    /// Wire up every component from configuration.
    ///
    /// Nothing here touches the network and the cache database opens lazily,
    /// so construction cannot fail.
    #[must_use]
    pub fn from_config(
        config: TerminalConfig,
        store: LocalCatalogStore,
        ephemeral: Arc<dyn EphemeralStore>,
        identity: DeviceIdentifier,
    ) -> Self {
        let backend = backend_for(&config, ephemeral.as_ref());
        let proxy = ProxyWorker::new(
            config.proxy_mode,
            HttpFetcher::new(config.upstream_url.clone()),
            CacheStorage::new(config.cache_location()),
        );

        Self::new(config, store, ephemeral, proxy, backend, identity)
    }

    /// Assemble state from prebuilt parts.
    #[must_use]
    pub fn new(
        config: TerminalConfig,
        store: LocalCatalogStore,
        ephemeral: Arc<dyn EphemeralStore>,
        proxy: ProxyWorker<HttpFetcher>,
        backend: BackendClient,
        identity: DeviceIdentifier,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config,
                store,
                ephemeral,
                proxy,
                backend,
                identity,
            }),
        }
    }

    /// Get a reference to the terminal configuration.
    #[must_use]
    pub fn config(&self) -> &TerminalConfig {
        &self.inner.config
    }

    /// Get a reference to the local catalog store.
    #[must_use]
    pub fn store(&self) -> &LocalCatalogStore {
        &self.inner.store
    }

    /// Get a reference to the cache proxy.
    #[must_use]
    pub fn proxy(&self) -> &ProxyWorker<HttpFetcher> {
        &self.inner.proxy
    }

    /// Get a reference to the backend client.
    #[must_use]
    pub fn backend(&self) -> &BackendClient {
        &self.inner.backend
    }

    /// The resolved device identity.
    #[must_use]
    pub fn identity(&self) -> &DeviceIdentifier {
        &self.inner.identity
    }

    /// Session for calls the agent makes on its own behalf: the configured
    /// token, else the one stored locally.
    #[must_use]
    pub fn agent_session(&self) -> SessionContext {
        self.inner
            .config
            .session()
            .unwrap_or_else(|| SessionContext::from_store(self.inner.ephemeral.as_ref()))
    }
}

/// Backend client for `config`, honoring any persisted API URL override.
#[must_use]
pub fn backend_for(config: &TerminalConfig, ephemeral: &dyn EphemeralStore) -> BackendClient {
    let persisted = ephemeral.get(keys::API_URL);
    let base: Url = resolve_api_base(BUILD_API_URL, persisted.as_deref(), &config.upstream_url);
    BackendClient::new(base)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod test_support {
    use super::*;
    use crate::db::StoreLocation;
    use crate::identity::MemoryEphemeralStore;
    use crate::proxy::ProxyMode;

    /// In-memory state whose upstream and backend refuse connections.
    pub(crate) fn offline_state() -> AppState {
        offline_state_with_cache(CacheStorage::new(StoreLocation::Memory))
    }

    /// Like [`offline_state`], with the proxy reading from `cache`.
    pub(crate) fn offline_state_with_cache(cache: CacheStorage) -> AppState {
        let config = TerminalConfig::from_lookup(|key| {
            (key == "PRICECHECK_UPSTREAM_URL").then(|| "http://127.0.0.1:9".to_string())
        })
        .unwrap();

        let proxy = ProxyWorker::new(
            ProxyMode::Cache,
            HttpFetcher::new(config.upstream_url.clone()),
            cache,
        );
        let backend = BackendClient::new(Url::parse("http://127.0.0.1:9/api/").unwrap());

        AppState::new(
            config,
            LocalCatalogStore::new(StoreLocation::Memory),
            Arc::new(MemoryEphemeralStore::new()),
            proxy,
            backend,
            DeviceIdentifier::generate(),
        )
    }
}
