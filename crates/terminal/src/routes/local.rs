//! The agent's own API, used by the web app and by operators.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Serialize;
use tracing::instrument;

use pricecheck_core::{Barcode, ProductRecord};

use crate::error::{AppError, Result};
use crate::middleware::CurrentSession;
use crate::proxy::ProxyState;
use crate::state::AppState;
use crate::sync::{SyncReport, sync_catalog};

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
pub async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Returns 503 Service Unavailable if the catalog store cannot be read.
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    match state.store().product_count().await {
        Ok(_) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// Device identity and proxy status.
#[derive(Debug, Serialize)]
pub struct DeviceInfo {
    /// Resolved identifier.
    pub identifier: String,
    /// Whether the identifier is one of the reserved literals.
    pub reserved: bool,
    /// Store new registrations bind to.
    pub store_id: i64,
    /// Proxy lifecycle state.
    pub proxy: &'static str,
    /// Products available offline, if the store is readable.
    pub products: Option<u64>,
}

/// GET /_pricecheck/device
pub async fn device(State(state): State<AppState>) -> Json<DeviceInfo> {
    let identity = state.identity();
    let proxy: ProxyState = state.proxy().state();

    Json(DeviceInfo {
        identifier: identity.to_string(),
        reserved: identity.is_reserved(),
        store_id: state.config().store_id.as_i64(),
        proxy: proxy.as_str(),
        products: state.store().product_count().await.ok(),
    })
}

/// GET /_pricecheck/products/{barcode}
///
/// # Errors
///
/// Returns `AppError::BadRequest` for an unusable barcode, `AppError::NotFound`
/// if no product has it, or a storage error.
#[instrument(skip(state))]
pub async fn product(
    State(state): State<AppState>,
    Path(barcode): Path<String>,
) -> Result<Json<ProductRecord>> {
    let barcode = Barcode::parse(&barcode).map_err(|e| AppError::BadRequest(e.to_string()))?;

    state
        .store()
        .get_product(&barcode)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("barcode {barcode}")))
}

/// POST /_pricecheck/sync
///
/// Uses the caller's token when it sends one, else the agent's own.
///
/// # Errors
///
/// Returns a sync error; the local catalog is unchanged in that case.
#[instrument(skip_all)]
pub async fn sync(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
) -> Result<Json<SyncReport>> {
    let session = if session.has_token() {
        session
    } else {
        state.agent_session()
    };

    let report = sync_catalog(state.backend(), &session, state.store()).await?;
    Ok(Json(report))
}
