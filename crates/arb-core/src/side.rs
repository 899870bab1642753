//! Position direction and lifecycle status.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Position side on the home venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// Side implied by a cross-venue spread.
    ///
    /// A positive spread means the home venue is cheaper than the
    /// reference, so the engine buys (LONG); otherwise it sells.
    pub fn from_spread(spread_pct: Decimal) -> Self {
        if spread_pct > Decimal::ZERO {
            Self::Long
        } else {
            Self::Short
        }
    }

    /// Returns the opposite side.
    pub fn opposite(&self) -> Self {
        match self {
            Self::Long => Self::Short,
            Self::Short => Self::Long,
        }
    }

    /// Returns 1 for long, -1 for short (for PnL calculations).
    pub fn sign(&self) -> i8 {
        match self {
            Self::Long => 1,
            Self::Short => -1,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Long => write!(f, "LONG"),
            Self::Short => write!(f, "SHORT"),
        }
    }
}

/// Lifecycle status of a stored position.
///
/// `Closing` is held only while a venue close is in flight. Removal from
/// the store is the implicit closed state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionStatus {
    #[default]
    Open,
    Closing,
}

impl fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Closing => write!(f, "closing"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_side_from_spread() {
        assert_eq!(Side::from_spread(dec!(3.0)), Side::Long);
        assert_eq!(Side::from_spread(dec!(-1.2)), Side::Short);
        assert_eq!(Side::from_spread(Decimal::ZERO), Side::Short);
    }

    #[test]
    fn test_side_sign_and_opposite() {
        assert_eq!(Side::Long.sign(), 1);
        assert_eq!(Side::Short.sign(), -1);
        assert_eq!(Side::Long.opposite(), Side::Short);
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(serde_json::to_string(&Side::Long).unwrap(), "\"LONG\"");
        assert_eq!(
            serde_json::to_string(&PositionStatus::Closing).unwrap(),
            "\"closing\""
        );
    }
}
