//! Realism filters applied to a raw spread before candidacy.
//!
//! These reject discrepancies that are almost always data errors: a wrong
//! token matched on the aggregator, a redenominated contract, or a stale
//! quote for a major asset.

use std::fmt;

use arb_core::{base_symbol, Price};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Base assets that are never traded.
pub const DEFAULT_BLACKLIST: [&str; 7] = ["USDT", "USDC", "BUSD", "DAI", "TUSD", "FDUSD", "TON"];

const MAX_ABS_SPREAD_PCT: Decimal = dec!(50);
const MIN_NEGATIVE_SPREAD_PCT: Decimal = dec!(-25);
const MAX_PRICE_RATIO: Decimal = dec!(2.5);
const MULTIPLE_RATIO_MIN: Decimal = dec!(10);
const MULTIPLE_TOLERANCE: Decimal = dec!(0.01);

/// Expected price ranges for major assets. Both prices must fall inside.
const MAJOR_RANGES: [(&str, Decimal, Decimal); 5] = [
    ("ETH", dec!(2000), dec!(6000)),
    ("BTC", dec!(30000), dec!(100000)),
    ("BNB", dec!(200), dec!(1000)),
    ("SOL", dec!(50), dec!(500)),
    ("ADA", dec!(0.2), dec!(3.0)),
];

/// Why a spread was judged unrealistic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unrealistic {
    Blacklisted(String),
    SpreadTooWide(Decimal),
    NegativeSpread(Decimal),
    PriceRatio(Decimal),
    /// One price is a round multiple of the other.
    RoundMultiple(Decimal),
    OutsideMajorRange { base: String },
}

impl fmt::Display for Unrealistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blacklisted(base) => write!(f, "{base} is blacklisted"),
            Self::SpreadTooWide(s) => write!(f, "spread {s}% beyond {MAX_ABS_SPREAD_PCT}%"),
            Self::NegativeSpread(s) => write!(f, "negative spread {s}%"),
            Self::PriceRatio(r) => write!(f, "price ratio {r} above {MAX_PRICE_RATIO}"),
            Self::RoundMultiple(r) => write!(f, "prices differ by a round multiple ({r})"),
            Self::OutsideMajorRange { base } => write!(f, "{base} price outside expected range"),
        }
    }
}

/// Realism filter with a configurable blacklist.
#[derive(Debug, Clone)]
pub struct RealismFilter {
    blacklist: Vec<String>,
}

impl Default for RealismFilter {
    fn default() -> Self {
        Self::new(&[])
    }
}

impl RealismFilter {
    /// `extra` is added to [`DEFAULT_BLACKLIST`].
    pub fn new(extra: &[String]) -> Self {
        let mut blacklist: Vec<String> = DEFAULT_BLACKLIST.iter().map(|s| s.to_string()).collect();
        blacklist.extend(extra.iter().map(|s| s.to_uppercase()));
        Self { blacklist }
    }

    pub fn is_blacklisted(&self, symbol: &str) -> bool {
        let base = base_symbol(symbol);
        self.blacklist.iter().any(|b| *b == base)
    }

    /// Check one observation. `spread_pct` is `(reference - home) / home * 100`.
    pub fn check(
        &self,
        symbol: &str,
        home: Price,
        reference: Price,
        spread_pct: Decimal,
    ) -> Result<(), Unrealistic> {
        let base = base_symbol(symbol);
        if self.blacklist.iter().any(|b| *b == base) {
            return Err(Unrealistic::Blacklisted(base));
        }
        if spread_pct.abs() > MAX_ABS_SPREAD_PCT {
            return Err(Unrealistic::SpreadTooWide(spread_pct));
        }
        if spread_pct < MIN_NEGATIVE_SPREAD_PCT {
            return Err(Unrealistic::NegativeSpread(spread_pct));
        }
        if let Some(ratio) = home.ratio_to(reference) {
            if ratio > MAX_PRICE_RATIO {
                return Err(Unrealistic::PriceRatio(ratio));
            }
            let nearest = ratio.round();
            if nearest >= MULTIPLE_RATIO_MIN && (ratio - nearest).abs() < MULTIPLE_TOLERANCE {
                return Err(Unrealistic::RoundMultiple(ratio));
            }
        }
        if let Some((_, low, high)) = MAJOR_RANGES.iter().find(|(b, _, _)| *b == base) {
            let inside = |p: Price| p.inner() >= *low && p.inner() <= *high;
            if !inside(home) || !inside(reference) {
                return Err(Unrealistic::OutsideMajorRange { base });
            }
        }
        Ok(())
    }
}
