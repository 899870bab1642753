//! Error types for arb-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),

    #[error("Decimal parse error: {0}")]
    DecimalParse(#[from] rust_decimal::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Any failure reported by the home venue. The outcome of the
    /// request is unknown to the caller.
    #[error("Venue error: {0}")]
    Venue(String),

    #[error("Venue timeout: {0}")]
    Timeout(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
