//! Periodic liveness signal.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use pricecheck_core::DeviceIdentifier;

use crate::backend::{BackendClient, BackendError};
use crate::best_effort;

/// Default period between heartbeats.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);

/// Receiver of heartbeats.
pub trait HeartbeatSink: Send + Sync + 'static {
    /// Send one heartbeat for `identifier`.
    fn beat(
        &self,
        identifier: &DeviceIdentifier,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;
}

impl HeartbeatSink for BackendClient {
    async fn beat(&self, identifier: &DeviceIdentifier) -> Result<(), BackendError> {
        self.heartbeat(identifier).await
    }
}

/// Emits heartbeats on a fixed period.
///
/// Each beat is an independent best-effort task, so a slow or failing backend
/// never delays the next tick.
pub struct HeartbeatScheduler<S> {
    sink: Arc<S>,
    interval: Duration,
}

impl<S: HeartbeatSink> HeartbeatScheduler<S> {
    /// Create a scheduler. A zero interval falls back to [`DEFAULT_INTERVAL`].
    pub fn new(sink: Arc<S>, interval: Duration) -> Self {
        let interval = if interval.is_zero() {
            DEFAULT_INTERVAL
        } else {
            interval
        };
        Self { sink, interval }
    }

    /// Configured period.
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Start the loop for `identifier`.
    ///
    /// Reserved identifiers never beat; `None` is returned and nothing is
    /// scheduled. The first beat goes out immediately. Abort the returned handle
    /// to stop.
    pub fn arm(&self, identifier: &DeviceIdentifier) -> Option<JoinHandle<()>> {
        if identifier.is_reserved() {
            debug!(identifier = %identifier, "Reserved identity, heartbeat disabled");
            return None;
        }

        let sink = Arc::clone(&self.sink);
        let identifier = identifier.clone();
        let period = self.interval;

        info!(identifier = %identifier, period_secs = period.as_secs(), "Heartbeat armed");

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let sink = Arc::clone(&sink);
                let identifier = identifier.clone();
                best_effort::spawn("heartbeat", async move { sink.beat(&identifier).await });
            }
        }))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Default)]
    struct CountingSink {
        beats: AtomicUsize,
        fail: bool,
    }

    impl HeartbeatSink for CountingSink {
        async fn beat(&self, _identifier: &DeviceIdentifier) -> Result<(), BackendError> {
            self.beats.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(BackendError::Status {
                    status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
                    body: String::new(),
                });
            }
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_beats_every_interval() {
        let sink = Arc::new(CountingSink::default());
        let scheduler = HeartbeatScheduler::new(Arc::clone(&sink), Duration::from_secs(30));

        let handle = scheduler.arm(&DeviceIdentifier::generate()).unwrap();
        tokio::time::sleep(Duration::from_secs(95)).await;
        tokio::task::yield_now().await;

        assert_eq!(sink.beats.load(Ordering::SeqCst), 4);
        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_do_not_stop_the_loop() {
        let sink = Arc::new(CountingSink {
            fail: true,
            ..CountingSink::default()
        });
        let scheduler = HeartbeatScheduler::new(Arc::clone(&sink), Duration::from_secs(10));

        let handle = scheduler.arm(&DeviceIdentifier::generate()).unwrap();
        tokio::time::sleep(Duration::from_secs(45)).await;
        tokio::task::yield_now().await;

        assert_eq!(sink.beats.load(Ordering::SeqCst), 5);
        assert!(!handle.is_finished());
        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_reserved_identity_never_beats() {
        let sink = Arc::new(CountingSink::default());
        let scheduler = HeartbeatScheduler::new(Arc::clone(&sink), Duration::from_secs(1));

        for reserved in [DeviceIdentifier::ADMIN, DeviceIdentifier::DESKTOP] {
            let identifier = DeviceIdentifier::parse(reserved).unwrap();
            assert!(scheduler.arm(&identifier).is_none());
        }

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(sink.beats.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_zero_interval_uses_default() {
        let scheduler = HeartbeatScheduler::new(Arc::new(CountingSink::default()), Duration::ZERO);
        assert_eq!(scheduler.interval(), DEFAULT_INTERVAL);
    }
}
