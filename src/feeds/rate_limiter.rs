use tokio::sync::Mutex;
use tokio::time::{sleep_until, Duration, Instant};

/// Keeps a minimum spacing between provider requests across all workers.
///
/// The lock is held while sleeping, so callers queue up and leave one
/// interval apart.
pub struct QpsLimiter {
    min_interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl QpsLimiter {
    pub fn new(max_qps: f64) -> Self {
        let min_interval = if max_qps > 0.0 {
            Duration::from_secs_f64(1.0 / max_qps)
        } else {
            Duration::ZERO
        };
        Self {
            min_interval,
            last: Mutex::new(None),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait until a request may be sent.
    pub async fn acquire(&self) {
        let mut last = self.last.lock().await;
        if let Some(prev) = *last {
            let next = prev + self.min_interval;
            if next > Instant::now() {
                sleep_until(next).await;
            }
        }
        *last = Some(Instant::now());
    }
}
