//! Prometheus metrics and structured logging for the arbitrage engine.
//!
//! - Prometheus metrics for provider calls, verification, positions and waves
//! - Structured logging with tracing (JSON in production, pretty otherwise)

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;
