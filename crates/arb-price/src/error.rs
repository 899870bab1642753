//! Price resolution error types.

use arb_core::QuoteMode;
use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PriceError {
    #[error("HTTP client error: {0}")]
    HttpClient(String),

    /// Timeouts, connection failures, HTTP 429 and 5xx. Retried.
    #[error("Transient upstream failure: {0}")]
    Transient(String),

    #[error("Upstream rejected request: {0}")]
    Upstream(String),

    #[error("Response parse error: {0}")]
    Parse(String),

    #[error("No reference price for {symbol} ({mode})")]
    NotFound { symbol: String, mode: QuoteMode },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

impl PriceError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Classify a failed HTTP status.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            Self::Transient(format!("HTTP {status}: {body}"))
        } else {
            Self::Upstream(format!("HTTP {status}: {body}"))
        }
    }
}

impl From<reqwest::Error> for PriceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() || e.is_request() {
            Self::Transient(format!("HTTP request failed: {e}"))
        } else if e.is_decode() {
            Self::Parse(format!("Failed to parse response: {e}"))
        } else {
            Self::HttpClient(e.to_string())
        }
    }
}

pub type PriceResult<T> = Result<T, PriceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(PriceError::from_status(StatusCode::TOO_MANY_REQUESTS, "").is_transient());
        assert!(PriceError::from_status(StatusCode::BAD_GATEWAY, "").is_transient());
        assert!(!PriceError::from_status(StatusCode::NOT_FOUND, "").is_transient());
    }
}
