//! Async locks shared by the executor and the closer.

use tokio::sync::Mutex;

/// Single-flight locks around venue calls.
///
/// `order` serializes order placement and closes. `balance` serializes
/// balance lookups. Both are held across `.await`, so they are tokio
/// mutexes; the position table lock never is.
#[derive(Debug, Default)]
pub struct TradeLocks {
    pub order: Mutex<()>,
    pub balance: Mutex<()>,
}

impl TradeLocks {
    pub fn new() -> Self {
        Self::default()
    }
}
