//! Per-cycle arbitrage opportunity.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::decimal::Price;
use crate::side::Side;

/// A cross-venue discrepancy observed during one scan cycle.
///
/// Superseded every cycle; the best-opportunity selector drains these and
/// acts on the highest `score` only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    pub symbol: String,
    /// `(reference - home) / home * 100`.
    pub spread_pct: Decimal,
    pub side: Side,
    pub score: Decimal,
    pub home_price: Price,
    pub reference_price: Price,
    pub liquidity_usd: Decimal,
    pub volume_24h_usd: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl Opportunity {
    /// Build an opportunity from a home price and a reference quote.
    ///
    /// Returns `None` if the home price is zero.
    pub fn new(
        symbol: impl Into<String>,
        home_price: Price,
        reference_price: Price,
        liquidity_usd: Decimal,
        volume_24h_usd: Decimal,
        timestamp: DateTime<Utc>,
    ) -> Option<Self> {
        let spread_pct = reference_price.pct_from(home_price)?;
        Some(Self {
            symbol: symbol.into(),
            spread_pct,
            side: Side::from_spread(spread_pct),
            score: Self::score_of(spread_pct, liquidity_usd, volume_24h_usd),
            home_price,
            reference_price,
            liquidity_usd,
            volume_24h_usd,
            timestamp,
        })
    }

    /// Ranking score: `|spread| * 100 + liquidity / 1000 + volume / 10000`.
    pub fn score_of(spread_pct: Decimal, liquidity_usd: Decimal, volume_24h_usd: Decimal) -> Decimal {
        spread_pct.abs() * Decimal::ONE_HUNDRED
            + liquidity_usd / Decimal::from(1_000)
            + volume_24h_usd / Decimal::from(10_000)
    }

    #[inline]
    pub fn abs_spread(&self) -> Decimal {
        self.spread_pct.abs()
    }

    /// Ratio of the larger to the smaller of the two prices.
    pub fn price_ratio(&self) -> Option<Decimal> {
        self.home_price.ratio_to(self.reference_price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_new_computes_spread_and_side() {
        let opp = Opportunity::new(
            "FOO",
            Price::new(dec!(1.00)),
            Price::new(dec!(1.03)),
            dec!(50000),
            dec!(100000),
            Utc::now(),
        )
        .unwrap();

        assert_eq!(opp.spread_pct, dec!(3));
        assert_eq!(opp.side, Side::Long);
        // 3*100 + 50 + 10
        assert_eq!(opp.score, dec!(360));
    }

    #[test]
    fn test_negative_spread_is_short() {
        let opp = Opportunity::new(
            "BAR",
            Price::new(dec!(2.00)),
            Price::new(dec!(1.90)),
            Decimal::ZERO,
            Decimal::ZERO,
            Utc::now(),
        )
        .unwrap();
        assert_eq!(opp.side, Side::Short);
        assert_eq!(opp.abs_spread(), dec!(5));
    }

    #[test]
    fn test_zero_home_price_rejected() {
        assert!(Opportunity::new(
            "BAZ",
            Price::ZERO,
            Price::ONE,
            Decimal::ZERO,
            Decimal::ZERO,
            Utc::now()
        )
        .is_none());
    }
}
