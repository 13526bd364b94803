//! Device identity: resolution across two storage tiers, and backend registration.
//!
//! The identity is mirrored in two independent places:
//!
//! - the ephemeral store, readable synchronously
//! - the durable catalog store, which is the source of truth
//!
//! They are not transactionally linked. Every startup reconciles them:
//!
//! | ephemeral | durable   | result                                      |
//! |-----------|-----------|---------------------------------------------|
//! | absent    | absent    | mint a v4 UUID, write both                  |
//! | present   | absent    | write ephemeral value to durable            |
//! | absent    | present   | write durable value to ephemeral            |
//! | present   | same      | nothing to do                               |
//! | present   | different | durable wins, ephemeral overwritten         |
//! | any       | failing   | keep ephemeral (or mint), repair next start |
//!
//! Unparsable values in either tier count as absent.

mod ephemeral;

pub use ephemeral::{
    EPHEMERAL_FILE_NAME, EphemeralStore, FileEphemeralStore, MemoryEphemeralStore, keys,
};

use std::future::Future;

use tracing::{debug, info, instrument, warn};

use pricecheck_core::{DeviceIdentifier, StoreId};

use crate::backend::{BackendClient, BackendError, DeviceSummary, NewDevice};
use crate::db::{LocalCatalogStore, StoreError};
use crate::session::SessionContext;

/// Longest display name sent to the backend.
const MAX_DISPLAY_NAME: usize = 64;

/// Display name used when the client identification string is blank.
const FALLBACK_DISPLAY_NAME: &str = "Price checker";

/// Durable half of the identity, owned by the catalog store.
pub trait DurableIdentityStore: Send + Sync {
    /// Read the stored identity, if any.
    fn load_identity(&self) -> impl Future<Output = Result<Option<String>, StoreError>> + Send;

    /// Persist the identity.
    fn store_identity(&self, value: &str) -> impl Future<Output = Result<(), StoreError>> + Send;
}

impl DurableIdentityStore for LocalCatalogStore {
    async fn load_identity(&self) -> Result<Option<String>, StoreError> {
        self.get_device_uuid().await
    }

    async fn store_identity(&self, value: &str) -> Result<(), StoreError> {
        self.save_device_uuid(value).await
    }
}

/// Resolution state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityState {
    /// Startup has not resolved an identity yet.
    Unidentified,
    /// The identity is known.
    Identified(DeviceIdentifier),
}

/// Reconciles the device identity across the ephemeral and durable tiers.
pub struct DeviceIdentityManager<E, D> {
    ephemeral: E,
    durable: D,
}

impl<E: EphemeralStore, D: DurableIdentityStore> DeviceIdentityManager<E, D> {
    /// Create a manager over the two tiers.
    pub const fn new(ephemeral: E, durable: D) -> Self {
        Self { ephemeral, durable }
    }

    /// Current state, from the ephemeral tier alone. Never blocks.
    pub fn state(&self) -> IdentityState {
        read_tier(self.ephemeral.get(keys::DEVICE_UUID), "ephemeral")
            .map_or(IdentityState::Unidentified, IdentityState::Identified)
    }

    /// Resolve the identity, repairing whichever tier has drifted.
    ///
    /// Never fails: storage problems are logged and the best available value is
    /// returned. Repeated calls return the same identifier.
    #[instrument(skip(self))]
    pub async fn resolve(&self) -> DeviceIdentifier {
        let fast = read_tier(self.ephemeral.get(keys::DEVICE_UUID), "ephemeral");

        let durable = match self.durable.load_identity().await {
            Ok(value) => Ok(read_tier(value, "durable")),
            Err(e) => {
                warn!(error = %e, "Durable identity unavailable");
                Err(e)
            }
        };

        match (fast, durable) {
            (Some(fast), Ok(Some(durable))) if fast == durable => fast,
            (Some(fast), Ok(Some(durable))) => {
                warn!(
                    ephemeral = %fast,
                    durable = %durable,
                    "Identity tiers disagree, keeping durable value"
                );
                self.write_ephemeral(&durable);
                durable
            }
            (Some(fast), Ok(None)) => {
                debug!("Repairing durable identity from ephemeral tier");
                self.write_durable(&fast).await;
                fast
            }
            (Some(fast), Err(_)) => fast,
            (None, Ok(Some(durable))) => {
                debug!("Restoring ephemeral identity from durable tier");
                self.write_ephemeral(&durable);
                durable
            }
            (None, Ok(None) | Err(_)) => {
                let minted = DeviceIdentifier::generate();
                info!(identifier = %minted, "Minted new device identity");
                self.write_ephemeral(&minted);
                self.write_durable(&minted).await;
                minted
            }
        }
    }

    fn write_ephemeral(&self, identifier: &DeviceIdentifier) {
        if let Err(e) = self.ephemeral.set(keys::DEVICE_UUID, identifier.as_str()) {
            warn!(error = %e, "Failed to write ephemeral identity");
        }
    }

    async fn write_durable(&self, identifier: &DeviceIdentifier) {
        if let Err(e) = self.durable.store_identity(identifier.as_str()).await {
            warn!(error = %e, "Failed to write durable identity, will repair on next start");
        }
    }
}

fn read_tier(raw: Option<String>, tier: &'static str) -> Option<DeviceIdentifier> {
    let raw = raw?;
    match DeviceIdentifier::parse(&raw) {
        Ok(identifier) => Some(identifier),
        Err(e) => {
            warn!(tier, error = %e, "Ignoring unusable stored identity");
            None
        }
    }
}

/// Backend device directory, as seen by registration.
pub trait DeviceDirectory: Send + Sync {
    /// List known devices.
    fn list_devices(
        &self,
        session: &SessionContext,
    ) -> impl Future<Output = Result<Vec<DeviceSummary>, BackendError>> + Send;

    /// Register a device.
    fn create_device(
        &self,
        session: &SessionContext,
        device: &NewDevice,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;
}

impl DeviceDirectory for BackendClient {
    async fn list_devices(
        &self,
        session: &SessionContext,
    ) -> Result<Vec<DeviceSummary>, BackendError> {
        Self::list_devices(self, session).await
    }

    async fn create_device(
        &self,
        session: &SessionContext,
        device: &NewDevice,
    ) -> Result<(), BackendError> {
        Self::create_device(self, session, device).await
    }
}

/// What a device registers itself as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationProfile {
    /// Default store binding.
    pub store_id: StoreId,
    /// Client identification string the display name is derived from.
    pub client_name: String,
}

impl RegistrationProfile {
    /// Display name sent to the backend.
    #[must_use]
    pub fn display_name(&self) -> String {
        let collapsed = self.client_name.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() {
            return FALLBACK_DISPLAY_NAME.to_string();
        }
        collapsed.chars().take(MAX_DISPLAY_NAME).collect()
    }
}

/// Outcome of a registration attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// The backend already lists this device.
    AlreadyRegistered,
    /// The device was created.
    Registered,
    /// Reserved identifiers are never registered.
    Skipped,
}

/// Make sure the backend knows this device.
///
/// Runs the check-then-register sequence; it is safe to repeat every startup.
///
/// # Errors
///
/// Returns the backend error. Callers are expected to run this through
/// [`crate::best_effort`].
#[instrument(skip(directory, session, profile), fields(identifier = %identifier))]
pub async fn register_device<D: DeviceDirectory>(
    directory: &D,
    session: &SessionContext,
    identifier: &DeviceIdentifier,
    profile: &RegistrationProfile,
) -> Result<Registration, BackendError> {
    if identifier.is_reserved() {
        debug!("Reserved identity, skipping registration");
        return Ok(Registration::Skipped);
    }

    let devices = directory.list_devices(session).await?;
    if devices.iter().any(|device| device.matches(identifier.as_str())) {
        debug!("Device already registered");
        return Ok(Registration::AlreadyRegistered);
    }

    let device = NewDevice {
        store_id: profile.store_id,
        name: profile.display_name(),
        identifier: identifier.to_string(),
    };
    directory.create_device(session, &device).await?;

    info!(store_id = %device.store_id, name = %device.name, "Registered device with backend");
    Ok(Registration::Registered)
}
