//! Verification error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("Safety check failed: {0}")]
    Safety(String),

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Price error: {0}")]
    Price(#[from] arb_price::PriceError),
}

pub type VerifyResult<T> = Result<T, VerifyError>;
