//! Per-symbol cooldown timestamps.
//!
//! Guarded by its own lock, separate from the position table: cooldowns
//! are checked for every symbol on every cycle.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

/// Last accepted signal time per symbol.
#[derive(Debug, Default)]
pub struct CooldownTable {
    last: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl CooldownTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remaining cooldown for `symbol`, or `None` if it is not cooling.
    pub fn remaining(&self, symbol: &str, interval: Duration, now: DateTime<Utc>) -> Option<Duration> {
        let last = self.last.lock().get(symbol).copied()?;
        let elapsed = now - last;
        if elapsed < interval {
            Some(interval - elapsed)
        } else {
            None
        }
    }

    pub fn is_cooling(&self, symbol: &str, interval: Duration, now: DateTime<Utc>) -> bool {
        self.remaining(symbol, interval, now).is_some()
    }

    /// Record an accepted signal.
    pub fn record(&self, symbol: &str, now: DateTime<Utc>) {
        self.last.lock().insert(symbol.to_string(), now);
    }

    /// Drop entries older than `interval`.
    pub fn prune(&self, interval: Duration, now: DateTime<Utc>) {
        self.last.lock().retain(|_, t| now - *t < interval);
    }

    pub fn len(&self) -> usize {
        self.last.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
