//! HTTP route handlers for the terminal.
//!
//! # Route Structure
//!
//! ```text
//! # Local API
//! GET  /_pricecheck/health            - Liveness check
//! GET  /_pricecheck/health/ready      - Readiness check (catalog store readable)
//! GET  /_pricecheck/device            - Device identity and proxy state
//! GET  /_pricecheck/products/{barcode} - Offline product lookup
//! POST /_pricecheck/sync              - Replace the catalog from the backend
//!
//! # Everything else
//! *    /*                             - Cache proxy (see `crate::proxy`)
//! ```

pub mod local;
pub mod proxy;

use axum::{
    Router,
    routing::{get, post},
};

use crate::state::AppState;

/// Create the local API router.
pub fn local_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(local::health))
        .route("/health/ready", get(local::readiness))
        .route("/device", get(local::device))
        .route("/products/{barcode}", get(local::product))
        .route("/sync", post(local::sync))
}

/// Create all routes for the terminal.
pub fn routes() -> Router<AppState> {
    Router::new()
        .nest("/_pricecheck", local_routes())
        // Request interception: registered once, invoked for every other request
        .fallback(proxy::intercept)
}
