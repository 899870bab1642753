//! Durable state for the arbitrage engine.
//!
//! - `SnapshotStore`: versioned position table snapshot, rewritten after
//!   every mutation and read once at startup
//! - `TradeHistoryWriter`: JSON Lines log of closed trades

pub mod error;
pub mod snapshot;
pub mod writer;

pub use error::{PersistenceError, PersistenceResult};
pub use snapshot::{LoadedSnapshot, PositionSnapshot, SnapshotStore, SNAPSHOT_VERSION};
pub use writer::{TradeHistoryWriter, TradeRecord};
