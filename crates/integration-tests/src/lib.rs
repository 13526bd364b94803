//! Scenario test harness for the Pricecheck terminal.
//!
//! Everything runs in-process: a fake backend and a fake upstream origin are
//! axum servers on ephemeral loopback ports, and the terminal itself is served
//! from a temporary data directory.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p pricecheck-integration-tests
//! ```

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, Uri, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::Value;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use url::Url;

use pricecheck_terminal::config::TerminalConfig;
use pricecheck_terminal::db::LocalCatalogStore;
use pricecheck_terminal::identity::{EphemeralStore, FileEphemeralStore, keys};
use pricecheck_terminal::proxy::manifest::{BUILD_ASSETS, SHELL_ASSETS};
use pricecheck_terminal::startup::{Background, start_with};
use pricecheck_terminal::state::AppState;

/// An address nothing listens on.
pub const UNREACHABLE: &str = "http://127.0.0.1:9";

/// Serve `router` on an ephemeral loopback port.
pub async fn serve(router: Router) -> (SocketAddr, JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let task = tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (addr, task)
}

/// A structurally valid session token expiring at `exp`.
#[must_use]
pub fn token_expiring_at(exp: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(serde_json::json!({ "exp": exp }).to_string());
    format!("{header}.{payload}.c2lnbmF0dXJl")
}

// ============================================================================
// Fake backend
// ============================================================================

/// What the fake backend has seen.
#[derive(Debug, Default)]
pub struct Recorded {
    /// Registered devices, as posted.
    pub devices: Vec<Value>,
    /// Identifiers that sent a heartbeat, in order.
    pub heartbeats: Vec<String>,
    /// Catalog served from `GET /api/products`.
    pub catalog: Vec<Value>,
    /// `Authorization` header of each catalog download.
    pub catalog_auth: Vec<Option<String>>,
}

type Shared = Arc<Mutex<Recorded>>;

/// In-process stand-in for the backend REST API.
pub struct FakeBackend {
    /// API base, ending in `/api/`.
    pub base: Url,
    recorded: Shared,
    _task: JoinHandle<()>,
}

impl FakeBackend {
    /// Start a backend serving `catalog`.
    pub async fn start(catalog: Vec<Value>) -> Self {
        let recorded = Arc::new(Mutex::new(Recorded {
            catalog,
            ..Recorded::default()
        }));

        let router = Router::new()
            .route("/api/devices", get(list_devices).post(create_device))
            .route("/api/devices/{identifier}/heartbeat", post(heartbeat))
            .route("/api/products", get(products))
            .with_state(Arc::clone(&recorded));

        let (addr, task) = serve(router).await;
        Self {
            base: Url::parse(&format!("http://{addr}/api/")).unwrap(),
            recorded,
            _task: task,
        }
    }

    /// Inspect what has been recorded so far.
    pub fn recorded<T>(&self, f: impl FnOnce(&Recorded) -> T) -> T {
        f(&self.recorded.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Wait until at least `count` heartbeats arrived, or give up after `secs`.
    pub async fn wait_for_heartbeats(&self, count: usize, secs: u64) -> usize {
        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(secs);
        loop {
            let seen = self.recorded(|r| r.heartbeats.len());
            if seen >= count || tokio::time::Instant::now() >= deadline {
                return seen;
            }
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }
    }
}

async fn list_devices(State(recorded): State<Shared>) -> Json<Value> {
    let devices = recorded
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .devices
        .clone();
    Json(Value::Array(devices))
}

async fn create_device(State(recorded): State<Shared>, Json(device): Json<Value>) -> StatusCode {
    recorded
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .devices
        .push(device);
    StatusCode::CREATED
}

async fn heartbeat(State(recorded): State<Shared>, Path(identifier): Path<String>) -> StatusCode {
    recorded
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .heartbeats
        .push(identifier);
    StatusCode::OK
}

async fn products(State(recorded): State<Shared>, headers: HeaderMap) -> Json<Value> {
    let mut recorded = recorded.lock().unwrap_or_else(PoisonError::into_inner);
    let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    recorded.catalog_auth.push(auth);
    Json(Value::Array(recorded.catalog.clone()))
}

// ============================================================================
// Fake upstream origin
// ============================================================================

/// In-process stand-in for the server hosting the web app.
///
/// Serves every manifest path with a body naming the path, and counts hits.
pub struct FakeOrigin {
    /// Origin URL.
    pub url: Url,
    hits: Arc<Mutex<HashMap<String, usize>>>,
    _task: JoinHandle<()>,
}

impl FakeOrigin {
    /// Start an origin serving the full manifest.
    pub async fn start() -> Self {
        let hits: Arc<Mutex<HashMap<String, usize>>> = Arc::default();
        let router = Router::new()
            .fallback(serve_asset)
            .with_state(Arc::clone(&hits));

        let (addr, task) = serve(router).await;
        Self {
            url: Url::parse(&format!("http://{addr}")).unwrap(),
            hits,
            _task: task,
        }
    }

    /// How many times `path` was requested.
    pub fn hits(&self, path: &str) -> usize {
        self.hits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .copied()
            .unwrap_or(0)
    }
}

/// Body the fake origin serves for `path`.
#[must_use]
pub fn asset_body(path: &str) -> String {
    format!("asset {path}")
}

async fn serve_asset(State(hits): State<Arc<Mutex<HashMap<String, usize>>>>, uri: Uri) -> Response {
    let path = uri.path().to_owned();
    *hits
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .entry(path.clone())
        .or_default() += 1;

    let known = SHELL_ASSETS.contains(&path.as_str()) || BUILD_ASSETS.contains(&path.as_str());
    if !known {
        return (StatusCode::NOT_FOUND, "not found").into_response();
    }

    let content_type = if path == "/" || path.ends_with(".html") {
        "text/html; charset=utf-8"
    } else {
        "application/octet-stream"
    };
    ([(header::CONTENT_TYPE, content_type)], asset_body(&path)).into_response()
}

// ============================================================================
// Terminal
// ============================================================================

/// A running terminal over a temporary data directory.
pub struct TestTerminal {
    /// Terminal state.
    pub state: AppState,
    /// Startup tasks.
    pub background: Background,
    /// Base URL of the terminal's HTTP surface.
    pub url: Url,
    _server: JoinHandle<()>,
}

impl TestTerminal {
    /// Start a terminal in `data_dir` in front of `upstream`, talking to `api`.
    pub async fn start(data_dir: &TempDir, upstream: &Url, api: &Url) -> Self {
        let config = config_for(data_dir, upstream);

        let ephemeral: Arc<dyn EphemeralStore> =
            Arc::new(FileEphemeralStore::open(config.ephemeral_path()));
        ephemeral.set(keys::API_URL, api.as_str()).unwrap();
        let store = LocalCatalogStore::new(config.catalog_location());

        let (state, background) = start_with(config, store, ephemeral).await;
        let (addr, server) = serve(pricecheck_terminal::app(state.clone())).await;

        Self {
            state,
            background,
            url: Url::parse(&format!("http://{addr}")).unwrap(),
            _server: server,
        }
    }

    /// Absolute URL of `path` on the terminal.
    pub fn at(&self, path: &str) -> Url {
        self.url.join(path).unwrap()
    }
}

/// Terminal configuration rooted at `data_dir`, with a one-second heartbeat.
pub fn config_for(data_dir: &TempDir, upstream: &Url) -> TerminalConfig {
    let data_dir = data_dir.path().to_string_lossy().into_owned();
    let upstream = upstream.to_string();
    TerminalConfig::from_lookup(|key| match key {
        "PRICECHECK_DATA_DIR" => Some(data_dir.clone()),
        "PRICECHECK_UPSTREAM_URL" => Some(upstream.clone()),
        "PRICECHECK_HEARTBEAT_SECS" => Some("1".to_string()),
        _ => None,
    })
    .unwrap()
}

/// HTTP client that does not follow redirects.
#[must_use]
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}
