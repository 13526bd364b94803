//! Pricecheck terminal library.
//!
//! A loopback agent that sits between a kiosk browser and the point-of-sale
//! web app, keeping the catalog, the app shell and the device identity
//! available when the network is not.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod backend;
pub mod best_effort;
pub mod config;
pub mod db;
pub mod error;
pub mod heartbeat;
pub mod identity;
pub mod middleware;
pub mod proxy;
pub mod routes;
pub mod session;
pub mod startup;
pub mod state;
pub mod sync;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the full application: routes, session guard, tracing and Sentry layers.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(routes::routes())
        .layer(axum::middleware::from_fn(
            middleware::session_guard_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction())
}
