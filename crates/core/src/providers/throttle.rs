use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Fixed-delay gate in front of every provider request.
///
/// Each caller sleeps `delay` before being let through, and callers are
/// serialized, so two requests never start closer together than `delay`.
#[derive(Debug)]
pub struct RequestThrottle {
    delay: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RequestThrottle {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            last_request: Mutex::new(None),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Wait out the pre-call delay and record the request start.
    ///
    /// Returns the instant at which the caller may issue its request.
    pub async fn acquire(&self) -> Instant {
        let mut last = self.last_request.lock().await;
        tokio::time::sleep(self.delay).await;
        let now = Instant::now();
        *last = Some(now);
        now
    }

    /// When the last request was let through, if any.
    pub async fn last_request(&self) -> Option<Instant> {
        *self.last_request.lock().await
    }
}
