//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Venue error: {0}")]
    Venue(#[from] arb_core::CoreError),

    #[error("Price error: {0}")]
    Price(#[from] arb_price::PriceError),

    #[error("Verify error: {0}")]
    Verify(#[from] arb_verify::VerifyError),

    #[error("Position error: {0}")]
    Position(#[from] arb_position::PositionError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] arb_telemetry::TelemetryError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] arb_persistence::PersistenceError),

    #[error("Startup error: {0}")]
    Startup(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
