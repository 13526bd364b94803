//! Startup sequence.
//!
//! ```text
//! resolve identity -> register (best effort) -> arm heartbeat
//!                  \-> install + activate proxy (best effort, independent)
//! ```
//!
//! Nothing here is fatal: the terminal serves whatever it can while the
//! background tasks succeed or fail on their own.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

use crate::best_effort;
use crate::config::TerminalConfig;
use crate::db::LocalCatalogStore;
use crate::error::set_sentry_device;
use crate::heartbeat::HeartbeatScheduler;
use crate::identity::{
    DeviceIdentityManager, EphemeralStore, FileEphemeralStore, Registration, RegistrationProfile,
    register_device,
};
use crate::proxy::ActivationReport;
use crate::state::AppState;

/// Handles to the detached startup tasks. Dropping them leaves the tasks running.
pub struct Background {
    /// Device registration.
    pub registration: JoinHandle<Option<Registration>>,
    /// Heartbeat loop; `None` for reserved identities.
    pub heartbeat: Option<JoinHandle<()>>,
    /// Proxy install and activation.
    pub proxy: JoinHandle<Option<ActivationReport>>,
}

/// Open the local stores from `config` and start the terminal.
pub async fn start(config: TerminalConfig) -> (AppState, Background) {
    let ephemeral: Arc<dyn EphemeralStore> =
        Arc::new(FileEphemeralStore::open(config.ephemeral_path()));
    let store = LocalCatalogStore::new(config.catalog_location());
    start_with(config, store, ephemeral).await
}

/// Start the terminal over the given stores.
pub async fn start_with(
    config: TerminalConfig,
    store: LocalCatalogStore,
    ephemeral: Arc<dyn EphemeralStore>,
) -> (AppState, Background) {
    let identity = DeviceIdentityManager::new(Arc::clone(&ephemeral), store.clone())
        .resolve()
        .await;
    set_sentry_device(&identity);
    info!(identifier = %identity, reserved = identity.is_reserved(), "Device identity resolved");

    let heartbeat_interval = config.heartbeat_interval;
    let profile = RegistrationProfile {
        store_id: config.store_id,
        client_name: config.client_name.clone(),
    };

    let state = AppState::from_config(config, store, ephemeral, identity);

    let registration = {
        let backend = state.backend().clone();
        let session = state.agent_session();
        let identity = state.identity().clone();
        best_effort::spawn("device registration", async move {
            register_device(&backend, &session, &identity, &profile).await
        })
    };

    let heartbeat = HeartbeatScheduler::new(Arc::new(state.backend().clone()), heartbeat_interval)
        .arm(state.identity());

    let proxy = {
        let proxy = state.proxy().clone();
        best_effort::spawn("proxy install", async move { proxy.install_and_activate().await })
    };

    let background = Background {
        registration,
        heartbeat,
        proxy,
    };
    (state, background)
}
