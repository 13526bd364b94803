//! Fire-and-forget boundary.
//!
//! Heartbeats and device registration must never interrupt the terminal. Their
//! failures are logged here and nowhere else; callers never inspect them.

use std::fmt::Display;
use std::future::Future;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Await `future`, logging and discarding its error.
///
/// Returns the success value, or `None` if the operation failed.
pub async fn run<F, T, E>(operation: &'static str, future: F) -> Option<T>
where
    F: Future<Output = Result<T, E>>,
    E: Display,
{
    match future.await {
        Ok(value) => {
            debug!(operation, "Best-effort operation succeeded");
            Some(value)
        }
        Err(e) => {
            warn!(operation, error = %e, "Best-effort operation failed");
            None
        }
    }
}

/// Run `future` as a detached task, logging and discarding its error.
///
/// The handle may be dropped; the task keeps running until it completes or the
/// runtime shuts down.
pub fn spawn<F, T, E>(operation: &'static str, future: F) -> JoinHandle<Option<T>>
where
    F: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Display + Send + 'static,
{
    tokio::spawn(run(operation, future))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_returns_value() {
        let value = run("answer", async { Ok::<_, String>(42) }).await;
        assert_eq!(value, Some(42));
    }

    #[tokio::test]
    async fn test_run_swallows_error() {
        let value: Option<()> = run("doomed", async { Err("backend down") }).await;
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn test_spawn_detached_failure_does_not_propagate() {
        let handle = spawn("doomed", async { Err::<(), _>("backend down".to_string()) });
        assert_eq!(handle.await.unwrap(), None);
    }
}
