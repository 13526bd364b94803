//! What the proxy pre-caches, and under which version.

/// Cache namespace for this build. Bump whenever cached content changes shape;
/// activation purges every other namespace.
pub const CACHE_VERSION: &str = "pricecheck-v2";

/// Root of the proxy's scope. Also the alternate key for the shell document.
pub const SCOPE_ROOT: &str = "/";

/// The application shell served to every navigation.
pub const SHELL_DOCUMENT: &str = "/index.html";

/// Path prefix of hashed build output.
pub const BUILD_ASSET_PREFIX: &str = "/assets/";

/// Assets installation must cache, all or nothing.
pub const SHELL_ASSETS: &[&str] = &[
    SCOPE_ROOT,
    SHELL_DOCUMENT,
    "/manifest.webmanifest",
    "/favicon.ico",
    "/logo192.png",
    "/logo512.png",
];

/// Build output installation tries to cache. Missing entries are skipped.
pub const BUILD_ASSETS: &[&str] = &["/assets/index.js", "/assets/index.css", "/assets/vendor.js"];

/// A versioned set of asset URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    /// Namespace the assets are stored under.
    pub version: String,
    /// Required assets.
    pub shell: Vec<String>,
    /// Optional assets.
    pub build: Vec<String>,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            version: CACHE_VERSION.to_string(),
            shell: SHELL_ASSETS.iter().map(ToString::to_string).collect(),
            build: BUILD_ASSETS.iter().map(ToString::to_string).collect(),
        }
    }
}

/// Whether `path` is hashed build output.
#[must_use]
pub fn is_build_asset(path: &str) -> bool {
    path.starts_with(BUILD_ASSET_PREFIX)
}
