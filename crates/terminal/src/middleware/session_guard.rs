//! Session guard middleware and extractor.
//!
//! Every request gets a [`SessionContext`] built from its `Authorization`
//! header or token cookie. Navigations to protected pages without a usable
//! token are redirected to the login page, and the stale cookie is cleared.

use axum::{
    extract::{FromRequestParts, Request},
    http::{HeaderValue, header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use chrono::Utc;

use crate::proxy::is_navigation;
use crate::session::{Navigation, SessionContext, guard_navigation};

/// Path prefix of the agent's own API, never guarded.
pub const LOCAL_API_PREFIX: &str = "/_pricecheck/";

/// Attach the caller's session and enforce it on navigations.
pub async fn session_guard_middleware(mut request: Request, next: Next) -> Response {
    let mut session = SessionContext::from_headers(request.headers());

    let guarded = is_navigation(request.method(), request.headers())
        && !request.uri().path().starts_with(LOCAL_API_PREFIX);

    if guarded {
        let had_token = session.has_token();
        let path = request.uri().path().to_owned();

        if let Navigation::Redirect { location } =
            guard_navigation(&path, &mut session, Utc::now().timestamp())
        {
            let mut response = Redirect::to(location).into_response();
            if had_token {
                response
                    .headers_mut()
                    .insert(header::SET_COOKIE, clear_token_cookie());
            }
            return response;
        }
    }

    request.extensions_mut().insert(session);
    next.run(request).await
}

/// `Set-Cookie` value that removes the token cookie. Must name [`crate::session::TOKEN_COOKIE`].
const CLEAR_TOKEN_COOKIE: &str = "pricecheck_token=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax";

fn clear_token_cookie() -> HeaderValue {
    HeaderValue::from_static(CLEAR_TOKEN_COOKIE)
}

/// Extractor for the request's session.
///
/// Falls back to reading the headers when the middleware did not run.
///
/// # Example
///
/// ```rust,ignore
/// async fn handler(CurrentSession(session): CurrentSession) -> impl IntoResponse {
///     if session.is_expired() { "anonymous" } else { "signed in" }
/// }
/// ```
pub struct CurrentSession(pub SessionContext);

impl<S> FromRequestParts<S> for CurrentSession
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let session = parts
            .extensions
            .get::<SessionContext>()
            .cloned()
            .unwrap_or_else(|| SessionContext::from_headers(&parts.headers));
        Ok(Self(session))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::{Router, body::Body, http::StatusCode, middleware, routing::get};
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use tower::ServiceExt;

    use super::*;
    use crate::session::TOKEN_COOKIE;

    fn token(exp: i64) -> String {
        let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"exp":{exp},"role":"cashier"}}"#));
        format!("header.{payload}.signature")
    }

    fn app() -> Router {
        Router::new()
            .route("/", get(|| async { "home" }))
            .route("/scan", get(|| async { "scan" }))
            .route("/_pricecheck/health", get(|| async { "ok" }))
            .layer(middleware::from_fn(session_guard_middleware))
    }

    fn navigate(path: &str, cookie: Option<&str>) -> Request {
        let mut builder = Request::builder()
            .uri(path)
            .header("sec-fetch-mode", "navigate");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_cleared_cookie_names_token_cookie() {
        assert!(CLEAR_TOKEN_COOKIE.starts_with(&format!("{TOKEN_COOKIE}=;")));
    }

    #[tokio::test]
    async fn test_public_path_without_token() {
        let response = app().oneshot(navigate("/", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_protected_path_redirects_to_login() {
        let response = app().oneshot(navigate("/scan", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/login");
        assert!(response.headers().get(header::SET_COOKIE).is_none());
    }

    #[tokio::test]
    async fn test_expired_token_is_cleared() {
        let cookie = format!("{TOKEN_COOKIE}={}", token(1));
        let response = app().oneshot(navigate("/scan", Some(&cookie))).await.unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(set_cookie.contains("Max-Age=0"));
    }

    #[tokio::test]
    async fn test_valid_token_proceeds() {
        let exp = Utc::now().timestamp() + 3600;
        let cookie = format!("theme=dark; {TOKEN_COOKIE}={}", token(exp));
        let response = app().oneshot(navigate("/scan", Some(&cookie))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_local_api_and_subresources_are_not_guarded() {
        let api = app()
            .oneshot(navigate("/_pricecheck/health", None))
            .await
            .unwrap();
        assert_eq!(api.status(), StatusCode::OK);

        let fetch = Request::builder()
            .uri("/scan")
            .body(Body::empty())
            .unwrap();
        let response = app().oneshot(fetch).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
