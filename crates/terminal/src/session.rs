//! Session token validation and route gating.
//!
//! Session tokens are three-segment bearer strings (`header.claims.signature`)
//! issued by the backend. The terminal never verifies signatures; it only needs
//! to know whether a token is structurally sound and unexpired so it can gate
//! navigation without a round-trip.
//!
//! The token travels in an explicit [`SessionContext`] rather than ambient
//! storage: the HTTP layer builds one per request, the binaries build one from
//! configuration, and the backend client receives it as an argument.

use axum::http::{HeaderMap, header};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;

use pricecheck_core::Role;

use crate::identity::{EphemeralStore, keys};

/// Cookie carrying the session token for browser navigations.
pub const TOKEN_COOKIE: &str = "pricecheck_token";

/// Entry path unauthenticated navigations are sent to.
pub const LOGIN_PATH: &str = "/login";

/// Paths that can be entered without a valid session.
pub const PUBLIC_PATHS: &[&str] = &["/", LOGIN_PATH];

/// Why a token could not be used.
#[derive(Debug, Error)]
pub enum TokenError {
    /// No token is stored.
    #[error("Token invalid: no token present")]
    Absent,

    /// The token does not have three non-empty segments.
    #[error("Token invalid: expected header.claims.signature")]
    Malformed,

    /// The claims segment is not base64url.
    #[error("Token invalid: claims are not base64url: {0}")]
    Encoding(#[from] base64::DecodeError),

    /// The claims segment is not the expected JSON.
    #[error("Token invalid: claims are not valid JSON: {0}")]
    Claims(#[from] serde_json::Error),
}

/// Claims the terminal reads from a session token.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SessionClaims {
    /// Expiry as a Unix timestamp (seconds).
    pub exp: i64,
    /// Role, when the issuer included one.
    #[serde(default)]
    pub role: Option<Role>,
}

impl SessionClaims {
    /// The claimed role, or [`Role::DEFAULT`] when the claim is absent.
    ///
    /// Note the default is a privileged role: a token without a role claim is
    /// treated as an administrator's.
    #[must_use]
    pub fn role_or_default(&self) -> Role {
        self.role.clone().unwrap_or(Role::DEFAULT)
    }
}

/// Decode a token's claims.
///
/// Padding on the claims segment is tolerated.
///
/// # Errors
///
/// Returns `TokenError` for anything that is not three non-empty segments with
/// a base64url JSON claims segment containing a numeric `exp`.
pub fn decode(token: &str) -> Result<SessionClaims, TokenError> {
    let mut segments = token.trim().split('.');
    let (Some(header), Some(claims), Some(signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(TokenError::Malformed);
    };

    if header.is_empty() || claims.is_empty() || signature.is_empty() {
        return Err(TokenError::Malformed);
    }

    let bytes = URL_SAFE_NO_PAD.decode(claims.trim_end_matches('='))?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Outcome of checking a navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    /// Let the navigation through.
    Proceed,
    /// Send the user elsewhere; the session has been purged.
    Redirect {
        /// Where to go.
        location: &'static str,
    },
}

/// The caller's session, passed explicitly to whatever needs it.
#[derive(Clone, Default)]
pub struct SessionContext {
    token: Option<SecretString>,
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl SessionContext {
    /// A context with no token.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// A context holding `token`. Blank tokens count as none.
    #[must_use]
    pub fn with_token(token: impl Into<String>) -> Self {
        let token = token.into();
        if token.trim().is_empty() {
            return Self::anonymous();
        }
        Self {
            token: Some(SecretString::from(token.trim().to_owned())),
        }
    }

    /// Build a context from the request's `Authorization: Bearer` header, falling
    /// back to the [`TOKEN_COOKIE`] cookie.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let bearer = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));

        if let Some(token) = bearer {
            return Self::with_token(token);
        }

        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == TOKEN_COOKIE)
            .map_or_else(Self::anonymous, |(_, value)| Self::with_token(value))
    }

    /// Build a context from the token held in the ephemeral store.
    #[must_use]
    pub fn from_store(store: &dyn EphemeralStore) -> Self {
        store
            .get(keys::SESSION_TOKEN)
            .map_or_else(Self::anonymous, Self::with_token)
    }

    /// Whether a token is present at all.
    #[must_use]
    pub const fn has_token(&self) -> bool {
        self.token.is_some()
    }

    /// Decode the held token.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::Absent` without a token, or the decode failure.
    pub fn claims(&self) -> Result<SessionClaims, TokenError> {
        let token = self.token.as_ref().ok_or(TokenError::Absent)?;
        decode(token.expose_secret())
    }

    /// Whether the session is unusable at `now` (Unix seconds).
    ///
    /// True without a token, for an undecodable token, and when `exp` is not
    /// strictly after `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: i64) -> bool {
        !self.claims().is_ok_and(|claims| claims.exp > now)
    }

    /// Whether the session is unusable right now.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now().timestamp())
    }

    /// The session's role, or `None` if the token cannot be decoded.
    ///
    /// A token that decodes without a role claim yields [`Role::DEFAULT`].
    #[must_use]
    pub fn role(&self) -> Option<Role> {
        self.claims().ok().map(|claims| claims.role_or_default())
    }

    /// Drop the token.
    pub fn purge(&mut self) {
        self.token = None;
    }

    /// Attach `Authorization: Bearer <token>` if a token is held.
    #[must_use]
    pub fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request,
        }
    }
}

/// Whether `path` can be entered without a session.
#[must_use]
pub fn is_public_path(path: &str) -> bool {
    let path = path.split(['?', '#']).next().unwrap_or(path);
    let normalized = match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    };
    PUBLIC_PATHS.contains(&normalized)
}

/// Decide whether a navigation to `path` may proceed.
///
/// Protected paths require an unexpired token; otherwise the session is purged
/// and the navigation is redirected to [`LOGIN_PATH`].
pub fn guard_navigation(path: &str, session: &mut SessionContext, now: i64) -> Navigation {
    if is_public_path(path) || !session.is_expired_at(now) {
        return Navigation::Proceed;
    }

    tracing::debug!(path, "Session missing or expired, redirecting to login");
    session.purge();
    Navigation::Redirect {
        location: LOGIN_PATH,
    }
}
