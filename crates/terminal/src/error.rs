//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. All route handlers should return `Result<T, AppError>`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use pricecheck_core::DeviceIdentifier;

use crate::backend::BackendError;
use crate::db::StoreError;
use crate::proxy::ProxyError;
use crate::sync::SyncError;

/// Application-level error type for the terminal.
#[derive(Debug, Error)]
pub enum AppError {
    /// Local storage operation failed.
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    /// Backend API call failed.
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Cache proxy could not answer.
    #[error("Proxy error: {0}")]
    Proxy(#[from] ProxyError),

    /// Catalog sync failed.
    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl AppError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Backend(_) | Self::Sync(SyncError::Backend(_)) => StatusCode::BAD_GATEWAY,
            Self::Sync(SyncError::Store(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Proxy(ProxyError::NetworkUnreachable(_)) => StatusCode::BAD_GATEWAY,
            Self::Proxy(ProxyError::ForeignTarget(_)) | Self::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Proxy(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Capture server errors to Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        // Don't expose internal error details to clients
        let message = match &self {
            Self::Store(_) | Self::Sync(SyncError::Store(_)) => {
                "Internal server error".to_string()
            }
            Self::Backend(_) | Self::Sync(SyncError::Backend(_)) => {
                "Backend unavailable".to_string()
            }
            Self::Proxy(ProxyError::NetworkUnreachable(_)) => "Upstream unavailable".to_string(),
            Self::Proxy(ProxyError::ForeignTarget(_)) => self.to_string(),
            Self::Proxy(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        };

        (status, message).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Tag every subsequent Sentry event with the device identity.
pub fn set_sentry_device(identifier: &DeviceIdentifier) {
    sentry::configure_scope(|scope| {
        scope.set_tag("device", identifier.as_str());
    });
}
