use async_trait::async_trait;
use std::time::Duration;

/// Cooperative yielding primitive used between batches of deferred work.
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Give the UI a chance to paint before continuing.
    async fn next_frame(&self);
    /// Sleep for a bounded delay.
    async fn delay(&self, duration: Duration);
}

/// Scheduler backed by the tokio timer. A zero frame interval degrades to
/// `yield_now`.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    frame_interval: Duration,
}

impl TokioScheduler {
    pub fn new(frame_interval: Duration) -> Self {
        Self { frame_interval }
    }
}

impl Default for TokioScheduler {
    fn default() -> Self {
        Self::new(Duration::from_millis(16))
    }
}

#[async_trait]
impl Scheduler for TokioScheduler {
    async fn next_frame(&self) {
        if self.frame_interval.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.frame_interval).await;
        }
    }

    async fn delay(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
