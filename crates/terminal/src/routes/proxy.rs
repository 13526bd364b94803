//! Fallback handler: every request outside the local API goes through the
//! cache proxy.

use axum::{
    extract::{Request, State},
    response::{IntoResponse, Response},
};

use crate::error::{AppError, Result};
use crate::proxy::InterceptedRequest;
use crate::state::AppState;

/// Hand `request` to the proxy.
///
/// # Errors
///
/// Returns `AppError::BadRequest` if the body cannot be buffered, or the proxy
/// error when neither cache nor network can answer.
pub async fn intercept(State(state): State<AppState>, request: Request) -> Result<Response> {
    let request = InterceptedRequest::from_axum(request)
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let response = state.proxy().handle(&request).await?;
    tracing::debug!(
        method = %request.method,
        url = %request.url,
        status = response.status.as_u16(),
        source = response.source.as_str(),
        "Proxied request"
    );
    Ok(response.into_response())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::body::{Body, Bytes};
    use axum::http::{HeaderMap, StatusCode};
    use tower::ServiceExt;

    use super::*;
    use crate::db::StoreLocation;
    use crate::proxy::{CACHE_VERSION, CacheStorage, ProxyResponse, ResponseSource, SOURCE_HEADER};
    use crate::routes::routes;
    use crate::state::test_support::{offline_state, offline_state_with_cache};

    fn navigation(uri: &str) -> Request {
        Request::builder()
            .uri(uri)
            .header("sec-fetch-mode", "navigate")
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_scheme_relative_target_is_rejected() {
        let request = Request::builder()
            .uri("//198.51.100.7/secret")
            .body(Body::empty())
            .unwrap();
        let response = routes()
            .with_state(offline_state())
            .oneshot(request)
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_offline_navigation_gets_503() {
        let response = routes()
            .with_state(offline_state())
            .oneshot(navigation("/"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()[SOURCE_HEADER], "offline");
    }

    #[tokio::test]
    async fn test_offline_subresource_gets_502() {
        let request = Request::builder()
            .uri("/logo.png")
            .body(Body::empty())
            .unwrap();
        let response = routes()
            .with_state(offline_state())
            .oneshot(request)
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_cached_shell_served_offline() {
        let cache = CacheStorage::new(StoreLocation::Memory);
        let shell = ProxyResponse {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Bytes::from_static(b"<html>shell</html>"),
            source: ResponseSource::Network,
        };
        cache.put(CACHE_VERSION, "/index.html", &shell).await.unwrap();

        let response = routes()
            .with_state(offline_state_with_cache(cache))
            .oneshot(navigation("/scan"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[SOURCE_HEADER], "cache");
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(body, Bytes::from_static(b"<html>shell</html>"));
    }
}
