//! Time source used by timers and retry backoff.

use std::time::Duration;

use jiff::Timestamp;

/// Suspends the calling task.
///
/// Injected so tests can run delays against tokio's paused clock or skip
/// them entirely.
#[async_trait::async_trait]
pub trait Clock: Send + Sync {
    /// Sleeps for the given duration.
    async fn sleep(&self, duration: Duration);

    /// Returns the current time.
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// Clock backed by [`tokio::time::sleep`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait::async_trait]
impl Clock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
