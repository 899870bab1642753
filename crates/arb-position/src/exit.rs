//! Exit rule evaluation.
//!
//! Rules are checked in priority order and the first match wins:
//!
//! 1. Time stop: `now >= expires_at`, regardless of PnL
//! 2. Take profit: `pnl >= take_profit_pct`
//! 3. Convergence: `|spread| <= convergence_band_pct`
//! 4. Emergency: `|spread| >= emergency_spread_pct`
//! 5. Stop loss: `pnl <= -stop_loss_pct`
//!
//! The spread rules are skipped when no reference price is available.

use std::fmt;

use arb_core::{Position, Price};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::config::ExitConfig;

/// Why a position is being closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExitReason {
    TimeStop,
    TakeProfit,
    Convergence,
    Emergency,
    StopLoss,
    /// Operator or shutdown request.
    Manual,
}

impl ExitReason {
    /// Label used in metrics and trade history.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TimeStop => "time_stop",
            Self::TakeProfit => "take_profit",
            Self::Convergence => "convergence",
            Self::Emergency => "emergency",
            Self::StopLoss => "stop_loss",
            Self::Manual => "manual",
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exit decision with the values it was based on.
#[derive(Debug, Clone, PartialEq)]
pub struct ExitDecision {
    pub reason: ExitReason,
    pub pnl_pct: Decimal,
    pub spread_pct: Option<Decimal>,
}

/// Evaluate the exit rules for `position` at `current`.
///
/// `spread_pct` is the current `(reference - home) / home * 100`, if a
/// reference price could be resolved.
pub fn evaluate_exit(
    position: &Position,
    current: Price,
    spread_pct: Option<Decimal>,
    config: &ExitConfig,
    now: DateTime<Utc>,
) -> Option<ExitDecision> {
    let pnl_pct = position.pnl_pct(current);
    let decision = |reason| {
        Some(ExitDecision {
            reason,
            pnl_pct,
            spread_pct,
        })
    };

    if position.is_expired(now) {
        return decision(ExitReason::TimeStop);
    }
    if pnl_pct >= config.take_profit_pct {
        return decision(ExitReason::TakeProfit);
    }
    if let Some(spread) = spread_pct.map(|s| s.abs()) {
        let pnl_ok = config
            .convergence_min_pnl_pct
            .map_or(true, |min| pnl_pct >= min);
        if spread <= config.convergence_band_pct && pnl_ok {
            return decision(ExitReason::Convergence);
        }
        if spread >= config.emergency_spread_pct {
            return decision(ExitReason::Emergency);
        }
    }
    if pnl_pct <= -config.stop_loss_pct {
        return decision(ExitReason::StopLoss);
    }
    None
}
