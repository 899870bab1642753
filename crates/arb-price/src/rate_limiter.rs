//! Per-provider minimum-interval rate limiting.
//!
//! Each caller reserves the next free slot under a short lock and then
//! sleeps until that slot outside the lock, so concurrent callers are
//! spaced by at least `min_interval` without holding a lock across await.

use parking_lot::Mutex;
use std::time::{Duration, Instant};
use tracing::trace;

/// Minimum spacing between consecutive requests to one provider.
#[derive(Debug)]
pub struct MinIntervalLimiter {
    min_interval: Duration,
    /// Earliest instant the next request may start.
    next_slot: Mutex<Option<Instant>>,
}

impl MinIntervalLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            next_slot: Mutex::new(None),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Reserve the next slot and return how long to wait for it.
    pub fn reserve(&self) -> Duration {
        let now = Instant::now();
        let mut next = self.next_slot.lock();
        let slot = match *next {
            Some(t) if t > now => t,
            _ => now,
        };
        *next = Some(slot + self.min_interval);
        slot.saturating_duration_since(now)
    }

    /// Wait until this caller may send.
    pub async fn wait(&self) {
        let delay = self.reserve();
        if !delay.is_zero() {
            trace!(delay_ms = delay.as_millis() as u64, "Rate limit wait");
            tokio::time::sleep(delay).await;
        }
    }
}
