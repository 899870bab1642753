//! Verification outcome types.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::decimal::Price;
use crate::quote::ProviderQuote;

/// Contract safety classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SafetyStatus {
    Ok,
    Suspicious,
    Blocked,
    Unknown,
}

impl SafetyStatus {
    /// `Blocked` and `Suspicious` block an entry.
    pub fn is_blocking(&self) -> bool {
        matches!(self, Self::Blocked | Self::Suspicious)
    }
}

impl fmt::Display for SafetyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Suspicious => write!(f, "suspicious"),
            Self::Blocked => write!(f, "blocked"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Result of running the verification pipeline on one opportunity.
///
/// `errors` block acceptance, `warnings` never do.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub accepted: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub home_price: Option<Price>,
    pub reference: Option<ProviderQuote>,
    pub spread_pct: Option<Decimal>,
    pub net_profit_pct: Option<Decimal>,
    pub price_ratio: Option<Decimal>,
    pub safety: Option<SafetyStatus>,
    pub orderbook_depth_usd: Option<Decimal>,
}

impl VerificationResult {
    pub fn error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    pub fn warn(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    /// Set `accepted` from the collected errors.
    #[must_use]
    pub fn finalize(mut self) -> Self {
        self.accepted = self.errors.is_empty();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warnings_never_block() {
        let mut result = VerificationResult::default();
        result.warn("buy ratio low");
        result.warn("depth thin");

        let result = result.finalize();
        assert!(result.accepted);
        assert_eq!(result.warnings.len(), 2);
    }

    #[test]
    fn test_any_error_blocks() {
        let mut result = VerificationResult::default();
        result.warn("volatility high");
        result.error("net profit below floor");

        assert!(!result.finalize().accepted);
    }

    #[test]
    fn test_safety_blocking() {
        assert!(SafetyStatus::Blocked.is_blocking());
        assert!(SafetyStatus::Suspicious.is_blocking());
        assert!(!SafetyStatus::Unknown.is_blocking());
        assert!(!SafetyStatus::Ok.is_blocking());
    }
}
