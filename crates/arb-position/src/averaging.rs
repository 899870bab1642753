//! Averaging eligibility.
//!
//! The position-side conditions are pure and checked here. Balance and
//! book depth are checked by the executor under the order lock.

use std::fmt;

use arb_core::{Position, Price, Side};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::config::PositionConfig;

/// Why an averaging add was not attempted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AveragingSkip {
    Disabled,
    NotOpen,
    MaxAddsReached { adds_done: u32 },
    CoolingDown,
    MoveTooSmall { adverse_pct: Decimal },
    SideMismatch,
    CapExceeded { after_add: Decimal },
    OrderTooSmall,
    InsufficientBalance { free: Decimal },
    ThinBook { depth_usd: Decimal },
    /// The venue declined the order.
    Declined,
}

impl fmt::Display for AveragingSkip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => write!(f, "averaging disabled"),
            Self::NotOpen => write!(f, "position not open"),
            Self::MaxAddsReached { adds_done } => write!(f, "max adds reached ({adds_done})"),
            Self::CoolingDown => write!(f, "cooldown active"),
            Self::MoveTooSmall { adverse_pct } => {
                write!(f, "adverse move {adverse_pct}% below threshold")
            }
            Self::SideMismatch => write!(f, "signal side differs from position"),
            Self::CapExceeded { after_add } => write!(f, "size {after_add} would exceed cap"),
            Self::OrderTooSmall => write!(f, "order amount below $1"),
            Self::InsufficientBalance { free } => write!(f, "free balance {free} too low"),
            Self::ThinBook { depth_usd } => write!(f, "book depth {depth_usd} too thin"),
            Self::Declined => write!(f, "venue declined order"),
        }
    }
}

/// Check whether `position` may be averaged at `current`.
///
/// Returns the margin to add on success.
pub fn check_averaging(
    position: &Position,
    current: Price,
    indicated_side: Side,
    config: &PositionConfig,
    now: DateTime<Utc>,
) -> Result<Decimal, AveragingSkip> {
    let averaging = &config.averaging;
    let amount = config.trading.order_amount_usd;

    if !averaging.enabled {
        return Err(AveragingSkip::Disabled);
    }
    if !position.is_open() {
        return Err(AveragingSkip::NotOpen);
    }
    if position.adds_done >= averaging.max_adds {
        return Err(AveragingSkip::MaxAddsReached {
            adds_done: position.adds_done,
        });
    }
    if let Some(last) = position.last_add_time {
        if now - last < averaging.cooldown() {
            return Err(AveragingSkip::CoolingDown);
        }
    }
    let adverse_pct = position.adverse_move_pct(current);
    if adverse_pct < averaging.threshold_pct {
        return Err(AveragingSkip::MoveTooSmall { adverse_pct });
    }
    if indicated_side != position.side {
        return Err(AveragingSkip::SideMismatch);
    }
    let after_add = position.size_notional + amount;
    if after_add > averaging.max_position_usd {
        return Err(AveragingSkip::CapExceeded { after_add });
    }
    if amount < Decimal::ONE {
        return Err(AveragingSkip::OrderTooSmall);
    }
    Ok(amount)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn sample_position(now: DateTime<Utc>) -> Position {
        Position::open(
            "FOO",
            Side::Long,
            Price::new(dec!(1.00)),
            dec!(5),
            10,
            dec!(3),
            now,
            Duration::hours(4),
        )
    }

    #[test]
    fn test_adverse_move_triggers_add() {
        let now = Utc::now();
        let pos = sample_position(now);
        let config = PositionConfig::default();

        let add = check_averaging(&pos, Price::new(dec!(0.95)), Side::Long, &config, now).unwrap();
        assert_eq!(add, dec!(5));

        let averaged = pos.with_add(Price::new(dec!(0.95)), add, now);
        assert_eq!(averaged.avg_entry, Price::new(dec!(0.975)));
        assert_eq!(averaged.adds_done, 1);
    }

    #[test]
    fn test_small_move_skipped() {
        let now = Utc::now();
        let pos = sample_position(now);

        let skip = check_averaging(
            &pos,
            Price::new(dec!(0.99)),
            Side::Long,
            &PositionConfig::default(),
            now,
        )
        .unwrap_err();
        assert!(matches!(skip, AveragingSkip::MoveTooSmall { .. }));
    }

    #[test]
    fn test_adds_are_bounded() {
        let mut config = PositionConfig::default();
        config.averaging.max_position_usd = dec!(100);
        config.averaging.cooldown_secs = 0;

        let now = Utc::now();
        let mut pos = sample_position(now);
        let mut price = dec!(1.00);
        for _ in 0..5 {
            price *= dec!(0.9);
            match check_averaging(&pos, Price::new(price), Side::Long, &config, now) {
                Ok(add) => pos = pos.with_add(Price::new(price), add, now),
                Err(skip) => {
                    assert_eq!(skip, AveragingSkip::MaxAddsReached { adds_done: 2 });
                    break;
                }
            }
        }
        assert_eq!(pos.adds_done, config.averaging.max_adds);
    }

    #[test]
    fn test_cooldown_since_last_add() {
        let now = Utc::now();
        let config = PositionConfig::default();
        let pos = sample_position(now).with_add(Price::new(dec!(0.97)), dec!(5), now);

        let soon = now + Duration::seconds(60);
        assert_eq!(
            check_averaging(&pos, Price::new(dec!(0.90)), Side::Long, &config, soon),
            Err(AveragingSkip::CoolingDown)
        );

        let later = now + Duration::seconds(301);
        assert!(check_averaging(&pos, Price::new(dec!(0.90)), Side::Long, &config, later).is_ok());
    }

    #[test]
    fn test_side_and_cap() {
        let now = Utc::now();
        let pos = sample_position(now);
        let mut config = PositionConfig::default();

        assert_eq!(
            check_averaging(&pos, Price::new(dec!(0.95)), Side::Short, &config, now),
            Err(AveragingSkip::SideMismatch)
        );

        config.averaging.max_position_usd = dec!(8);
        assert_eq!(
            check_averaging(&pos, Price::new(dec!(0.95)), Side::Long, &config, now),
            Err(AveragingSkip::CapExceeded {
                after_add: dec!(10)
            })
        );
    }
}
