//! Command implementations.

pub mod cache;
pub mod catalog;
pub mod device;

use pricecheck_core::BarcodeError;
use pricecheck_terminal::db::StoreError;
use pricecheck_terminal::sync::SyncError;
use thiserror::Error;

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The barcode argument is unusable.
    #[error("Invalid barcode: {0}")]
    InvalidBarcode(#[from] BarcodeError),

    /// No product has the barcode.
    #[error("No product with barcode {0}")]
    NotFound(String),

    /// Local storage failed.
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    /// Catalog sync failed; the local catalog is unchanged.
    #[error("Sync failed: {0}")]
    Sync(#[from] SyncError),

    /// Output could not be rendered.
    #[error("Output error: {0}")]
    Json(#[from] serde_json::Error),
}
