//! Round-trip cost model and spread economics.
//!
//! Every figure that goes into the net-profit decision is kept on the
//! result so a rejected signal can be explained after the fact.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Market orders pay the taker fee on entry and on exit.
pub const FEE_LEGS: Decimal = Decimal::TWO;

/// Cost of opening and closing a position, in percent of notional.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundTripCost {
    /// Taker fee per leg.
    pub taker_fee_pct: Decimal,
    pub fee_legs: Decimal,
    pub slippage_pct: Decimal,
    /// `fee_legs * taker_fee_pct + slippage_pct`.
    pub total_pct: Decimal,
}

impl RoundTripCost {
    pub fn new(taker_fee_pct: Decimal, slippage_pct: Decimal) -> Self {
        Self {
            taker_fee_pct,
            fee_legs: FEE_LEGS,
            slippage_pct,
            total_pct: FEE_LEGS * taker_fee_pct + slippage_pct,
        }
    }
}

/// Spread economics for one opportunity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Economics {
    pub spread_pct: Decimal,
    pub cost: RoundTripCost,
    /// `|spread| - cost.total_pct`.
    pub net_profit_pct: Decimal,
}

impl Economics {
    pub fn evaluate(spread_pct: Decimal, cost: RoundTripCost) -> Self {
        Self {
            spread_pct,
            cost,
            net_profit_pct: spread_pct.abs() - cost.total_pct,
        }
    }

    pub fn abs_spread(&self) -> Decimal {
        self.spread_pct.abs()
    }
}
