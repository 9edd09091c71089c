use tokio::sync::Mutex;
use tokio::time::{sleep, Duration, Instant};

/// Spaces successive requests at least `min_interval` apart, across concurrent callers.
pub struct Throttle {
    min_interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: Mutex::new(None),
        }
    }

    /// Wait until the next request slot opens, then claim it.
    pub async fn wait(&self) {
        if self.min_interval.is_zero() {
            return;
        }

        // Holding the lock across the sleep queues concurrent callers in order.
        let mut last = self.last.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}
