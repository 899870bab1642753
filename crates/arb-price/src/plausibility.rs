//! Sanity bounds on reference prices.

use std::collections::HashMap;

use arb_core::Price;
use rust_decimal::Decimal;
use thiserror::Error;

/// Why a quote was rejected as implausible.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Implausible {
    #[error("price is not positive")]
    NonPositive,

    #[error("price {0} below global minimum")]
    BelowMin(Decimal),

    #[error("price {0} above global maximum")]
    AboveMax(Decimal),

    #[error("price {price} outside known band {low}..={high}")]
    OutsideBand {
        price: Decimal,
        low: Decimal,
        high: Decimal,
    },
}

/// Global price limits plus hard bands for well-known assets.
#[derive(Debug, Clone)]
pub struct PlausibilityBands {
    min_price: Decimal,
    max_price: Decimal,
    known: HashMap<String, (Decimal, Decimal)>,
}

impl Default for PlausibilityBands {
    fn default() -> Self {
        let d = |s: &str| s.parse::<Decimal>().unwrap_or_default();
        let known = [
            ("BTC", "10000", "200000"),
            ("ETH", "1000", "10000"),
            ("BNB", "200", "1000"),
            ("SOL", "10", "500"),
            ("XRP", "0.1", "10"),
            ("ADA", "0.1", "5"),
            ("DOGE", "0.01", "1"),
            ("MATIC", "0.1", "5"),
            ("DOT", "1", "50"),
            ("AVAX", "5", "200"),
            ("LINK", "2", "100"),
            ("UNI", "2", "50"),
            ("ATOM", "2", "50"),
            ("LTC", "20", "500"),
            ("ETC", "5", "100"),
        ]
        .into_iter()
        .map(|(s, lo, hi)| (s.to_string(), (d(lo), d(hi))))
        .collect();

        Self {
            min_price: Decimal::new(1, 6),
            max_price: Decimal::from(200_000),
            known,
        }
    }
}

impl PlausibilityBands {
    /// Add or replace the band for `symbol`.
    pub fn with_band(mut self, symbol: &str, low: Decimal, high: Decimal) -> Self {
        self.known.insert(symbol.to_uppercase(), (low, high));
        self
    }

    pub fn band(&self, symbol: &str) -> Option<(Decimal, Decimal)> {
        self.known.get(symbol).copied()
    }

    /// Check `price` for the base symbol `symbol`.
    pub fn check(&self, symbol: &str, price: Price) -> Result<(), Implausible> {
        let p = price.inner();
        if p <= Decimal::ZERO {
            return Err(Implausible::NonPositive);
        }
        if p < self.min_price {
            return Err(Implausible::BelowMin(p));
        }
        if p > self.max_price {
            return Err(Implausible::AboveMax(p));
        }
        if let Some((low, high)) = self.band(symbol) {
            if p < low || p > high {
                return Err(Implausible::OutsideBand {
                    price: p,
                    low,
                    high,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn p(v: Decimal) -> Price {
        Price::new(v)
    }

    #[test]
    fn test_global_limits() {
        let bands = PlausibilityBands::default();
        assert_eq!(bands.check("FOO", p(dec!(0))), Err(Implausible::NonPositive));
        assert!(matches!(
            bands.check("FOO", p(dec!(0.0000005))),
            Err(Implausible::BelowMin(_))
        ));
        assert!(matches!(
            bands.check("FOO", p(dec!(250000))),
            Err(Implausible::AboveMax(_))
        ));
        assert!(bands.check("FOO", p(dec!(0.000001))).is_ok());
    }

    #[test]
    fn test_known_band() {
        let bands = PlausibilityBands::default();
        assert!(bands.check("ETH", p(dec!(3000))).is_ok());
        assert!(matches!(
            bands.check("ETH", p(dec!(3))),
            Err(Implausible::OutsideBand { .. })
        ));
        assert!(bands.check("DOGE", p(dec!(0.15))).is_ok());
        assert!(bands.check("XRP", p(dec!(0.05))).is_err());
    }

    #[test]
    fn test_custom_band() {
        let bands = PlausibilityBands::default().with_band("foo", dec!(1), dec!(2));
        assert!(bands.check("FOO", p(dec!(2.5))).is_err());
    }
}
