//! Held position and its derived quantities.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::decimal::Price;
use crate::side::{PositionStatus, Side};
use crate::venue::VenuePosition;

// ============================================================================
// Position
// ============================================================================

/// An open leveraged position on the home venue. One per symbol.
///
/// `opened_at` and `expires_at` are written once, either on entry or on
/// reconciliation from the venue. Averaging produces a new value through
/// [`Position::with_add`], which carries both timers over unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub side: Side,
    /// Size-weighted average entry price.
    pub avg_entry: Price,
    /// USD exposure (margin committed across entry and adds).
    pub size_notional: Decimal,
    pub leverage: u32,
    pub adds_done: u32,
    pub last_add_price: Price,
    /// `None` until the first add, and for positions adopted from the venue.
    #[serde(default)]
    pub last_add_time: Option<DateTime<Utc>>,
    pub opened_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Spread observed at entry (percent).
    pub entry_spread_pct: Decimal,
    #[serde(default)]
    pub status: PositionStatus,
    /// Most recent home-venue price seen for this symbol.
    #[serde(default)]
    pub last_price: Option<Price>,
    /// Link to the reference pair that motivated the entry.
    #[serde(default)]
    pub reference_url: Option<String>,
}

impl Position {
    /// Create a position from a filled entry.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn open(
        symbol: impl Into<String>,
        side: Side,
        entry: Price,
        size_notional: Decimal,
        leverage: u32,
        entry_spread_pct: Decimal,
        opened_at: DateTime<Utc>,
        max_age: Duration,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            avg_entry: entry,
            size_notional,
            leverage: leverage.max(1),
            adds_done: 0,
            last_add_price: entry,
            last_add_time: None,
            opened_at,
            expires_at: opened_at + max_age,
            entry_spread_pct,
            status: PositionStatus::Open,
            last_price: Some(entry),
            reference_url: None,
        }
    }

    /// Adopt a position that exists on the venue but not locally.
    ///
    /// The venue does not know how many adds were made, so `adds_done`
    /// starts at zero and the averaging cooldown counts as elapsed.
    #[must_use]
    pub fn from_venue(venue: &VenuePosition, now: DateTime<Utc>, max_age: Duration) -> Self {
        Self {
            symbol: venue.symbol.clone(),
            side: venue.side,
            avg_entry: venue.entry_price,
            size_notional: venue.margin_usd,
            leverage: venue.leverage.max(1),
            adds_done: 0,
            last_add_price: venue.entry_price,
            last_add_time: None,
            opened_at: now,
            expires_at: now + max_age,
            entry_spread_pct: Decimal::ZERO,
            status: PositionStatus::Open,
            last_price: None,
            reference_url: None,
        }
    }

    /// Leveraged PnL in percent: `((cur - entry) / entry) * sign * 100 * lev`.
    #[must_use]
    pub fn pnl_pct(&self, current: Price) -> Decimal {
        if self.avg_entry.is_zero() {
            return Decimal::ZERO;
        }
        let raw = (current.inner() - self.avg_entry.inner()) / self.avg_entry.inner();
        raw * Decimal::from(self.side.sign()) * Decimal::ONE_HUNDRED * Decimal::from(self.leverage)
    }

    /// PnL in USD on the committed notional.
    #[must_use]
    pub fn pnl_usd(&self, current: Price) -> Decimal {
        self.size_notional * self.pnl_pct(current) / Decimal::ONE_HUNDRED
    }

    /// Adverse move from the average entry in percent (positive = against us).
    #[must_use]
    pub fn adverse_move_pct(&self, current: Price) -> Decimal {
        if self.avg_entry.is_zero() {
            return Decimal::ZERO;
        }
        let raw = (self.avg_entry.inner() - current.inner()) / self.avg_entry.inner();
        raw * Decimal::from(self.side.sign()) * Decimal::ONE_HUNDRED
    }

    /// Apply an averaging add, returning the updated position.
    ///
    /// The new average is weighted by notional:
    /// `(avg * size + price * add) / (size + add)`.
    #[must_use]
    pub fn with_add(&self, price: Price, add_notional: Decimal, now: DateTime<Utc>) -> Self {
        let new_size = self.size_notional + add_notional;
        let avg = if new_size.is_zero() {
            self.avg_entry
        } else {
            Price::new(
                (self.avg_entry.inner() * self.size_notional + price.inner() * add_notional)
                    / new_size,
            )
        };

        Self {
            avg_entry: avg,
            size_notional: new_size,
            adds_done: self.adds_done + 1,
            last_add_price: price,
            last_add_time: Some(now),
            last_price: Some(price),
            ..self.clone()
        }
    }

    /// Time-stop condition: `now >= expires_at`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }

    /// Holding time so far.
    #[must_use]
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.opened_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn sample_long() -> Position {
        Position::open(
            "FOO",
            Side::Long,
            Price::new(dec!(1.00)),
            dec!(10),
            10,
            dec!(3.0),
            t0(),
            Duration::hours(2),
        )
    }

    #[test]
    fn test_open_sets_timers_once() {
        let pos = sample_long();
        assert_eq!(pos.opened_at, t0());
        assert_eq!(pos.expires_at, t0() + Duration::hours(2));
        assert_eq!(pos.status, PositionStatus::Open);
        assert_eq!(pos.adds_done, 0);
        assert!(pos.last_add_time.is_none());
    }

    #[test]
    fn test_leveraged_pnl_long() {
        let pos = sample_long();
        assert_eq!(pos.pnl_pct(Price::new(dec!(1.03))), dec!(30));
        assert_eq!(pos.pnl_usd(Price::new(dec!(1.03))), dec!(3));
    }

    #[test]
    fn test_leveraged_pnl_short() {
        let mut pos = sample_long();
        pos.side = Side::Short;
        assert_eq!(pos.pnl_pct(Price::new(dec!(1.03))), dec!(-30));
        assert_eq!(pos.pnl_pct(Price::new(dec!(0.98))), dec!(20));
    }

    #[test]
    fn test_adverse_move() {
        let pos = sample_long();
        assert_eq!(pos.adverse_move_pct(Price::new(dec!(0.95))), dec!(5));
        assert_eq!(pos.adverse_move_pct(Price::new(dec!(1.02))), dec!(-2));
    }

    #[test]
    fn test_with_add_equal_size_averages_price() {
        let pos = sample_long();
        let later = t0() + Duration::minutes(10);
        let added = pos.with_add(Price::new(dec!(0.95)), dec!(10), later);

        assert_eq!(added.avg_entry, Price::new(dec!(0.975)));
        assert_eq!(added.size_notional, dec!(20));
        assert_eq!(added.adds_done, 1);
        assert_eq!(added.last_add_time, Some(later));
        // Timers carried over verbatim
        assert_eq!(added.opened_at, pos.opened_at);
        assert_eq!(added.expires_at, pos.expires_at);
    }

    #[test]
    fn test_expiry_is_inclusive() {
        let pos = sample_long();
        assert!(!pos.is_expired(pos.expires_at - Duration::seconds(1)));
        assert!(pos.is_expired(pos.expires_at));
    }

    #[test]
    fn test_snapshot_serde_roundtrip_keeps_timers() {
        let pos = sample_long();
        let json = serde_json::to_string(&pos).unwrap();
        let back: Position = serde_json::from_str(&json).unwrap();
        assert_eq!(back, pos);
    }
}
