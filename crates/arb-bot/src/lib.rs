//! Cross-venue spread arbitrage engine.
//!
//! Wires the price resolver, verification pipeline and position lifecycle
//! into a running bot:
//! - Wave-based worker pool scanning the symbol universe
//! - Per-symbol scan task (realism filters, candidacy, entry, averaging, exit)
//! - Position monitor and auxiliary loops (selector, reconciliation,
//!   balance, config reload)
//! - Paper venue and notification sinks

pub mod app;
pub mod config;
pub mod error;
pub mod loops;
pub mod notify;
pub mod paper;
pub mod realism;
pub mod scheduler;
pub mod worker;

pub use app::Application;
pub use config::{AppConfig, ConfigHandle, RuntimeConfig, DEFAULT_CONFIG_PATH};
pub use error::{AppError, AppResult};
pub use paper::{PaperAccount, PaperVenue};
pub use realism::{RealismFilter, Unrealistic};
pub use scheduler::{CycleStats, ScanTask, WorkerPoolScheduler};
pub use worker::{ScanContext, ScanOutcome};
