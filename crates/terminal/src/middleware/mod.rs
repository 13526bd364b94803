//! HTTP middleware stack for the terminal.
//!
//! # Middleware Order (bottom to top in Router)
//!
//! 1. Sentry layer (capture errors)
//! 2. `TraceLayer` (request tracing)
//! 3. Session guard (attach `SessionContext`, redirect expired navigations)

pub mod session_guard;

pub use session_guard::{CurrentSession, LOCAL_API_PREFIX, session_guard_middleware};
