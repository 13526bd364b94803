//! Core types for Pricecheck.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod barcode;
pub mod device;
pub mod id;
pub mod product;
pub mod role;

pub use barcode::{Barcode, BarcodeError};
pub use device::{DeviceIdentifier, DeviceIdentifierError};
pub use id::*;
pub use product::ProductRecord;
pub use role::Role;
