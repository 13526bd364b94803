//! Wire types for the backend API.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use pricecheck_core::{ProductRecord, StoreId};

/// A device as listed by the backend.
///
/// Only the identifier matters to the terminal; everything else is optional so
/// backend additions never break registration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeviceSummary {
    /// Device identifier, if the backend recorded one.
    #[serde(default)]
    pub identifier: Option<String>,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Store binding.
    #[serde(default)]
    pub store_id: Option<StoreId>,
}

impl DeviceSummary {
    /// Whether this entry names `identifier`.
    #[must_use]
    pub fn matches(&self, identifier: &str) -> bool {
        self.identifier
            .as_deref()
            .is_some_and(|own| own.trim().eq_ignore_ascii_case(identifier))
    }
}

/// Device creation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewDevice {
    /// Store the device is bound to.
    pub store_id: StoreId,
    /// Display name.
    pub name: String,
    /// Device identifier.
    pub identifier: String,
}

/// Device list as returned by the backend: either a bare array or a paginated
/// envelope.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(super) enum DeviceListBody {
    Bare(Vec<DeviceSummary>),
    Paginated { results: Vec<DeviceSummary> },
}

impl DeviceListBody {
    pub(super) fn into_devices(self) -> Vec<DeviceSummary> {
        match self {
            Self::Bare(devices) | Self::Paginated { results: devices } => devices,
        }
    }
}

/// A downloaded catalog.
///
/// Entries are decoded one by one, so a single malformed product (null name,
/// non-numeric price, not an object) is counted and dropped instead of failing
/// the whole download.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogDownload {
    /// Entries that decoded.
    pub records: Vec<ProductRecord>,
    /// Entries that did not.
    pub malformed: usize,
}

impl CatalogDownload {
    /// Decode each raw catalog entry.
    #[must_use]
    pub fn from_entries(entries: Vec<Value>) -> Self {
        let mut download = Self::default();
        for (index, entry) in entries.into_iter().enumerate() {
            match serde_json::from_value::<ProductRecord>(entry) {
                Ok(record) => download.records.push(record),
                Err(e) => {
                    warn!(index, error = %e, "Skipping malformed catalog entry");
                    download.malformed += 1;
                }
            }
        }
        download
    }

    /// Entries received, decodable or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len() + self.malformed
    }

    /// Whether nothing was received.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
