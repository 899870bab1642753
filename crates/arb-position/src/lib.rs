//! Position lifecycle for the spread arbitrage engine.
//!
//! Owns the position table and everything that mutates it: entries,
//! averaging adds, exit evaluation and the close protocol.
//!
//! # Key Components
//!
//! - [`PositionStore`]: Mutex-guarded symbol -> position table with
//!   snapshot persistence, plus the cooldown and opportunity tables
//! - [`TradeExecutor`]: Entry and averaging orders under the order lock
//! - [`PositionCloser`]: `Open -> Closing -> removed` close protocol
//! - [`PositionMonitor`]: Fixed-interval exit loop
//! - [`evaluate_exit`]: Time stop, take profit, convergence, emergency
//!   and stop-loss rules in priority order
//! - [`check_averaging`]: Position-side averaging conditions
//! - [`PriceFallback`]: Embedded price, live ticker, last-known price

pub mod averaging;
pub mod closer;
pub mod config;
pub mod error;
pub mod executor;
pub mod exit;
pub mod locks;
pub mod monitor;
pub mod price;
pub mod store;

pub use averaging::{check_averaging, AveragingSkip};
pub use closer::{CloseOutcome, PositionCloser};
pub use config::{AveragingConfig, ExitConfig, PositionConfig, TradingConfig};
pub use error::{PositionError, PositionResult};
pub use executor::{AveragingOutcome, EntryOutcome, EntrySkip, TradeExecutor};
pub use exit::{evaluate_exit, ExitDecision, ExitReason};
pub use locks::TradeLocks;
pub use monitor::PositionMonitor;
pub use price::PriceFallback;
pub use store::{PositionStore, Reconciled};
