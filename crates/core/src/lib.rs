//! Pricecheck Core - Shared types library.
//!
//! This crate provides common types used across all Pricecheck components:
//! - `terminal` - Offline agent that fronts the point-of-sale web app
//! - `cli` - Command-line tools for operators
//!
//! # Architecture
//!
//! The core crate contains only types and traits - no I/O, no database access,
//! no HTTP clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Catalog records, barcodes, device identifiers, roles and IDs

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
