//! Position lifecycle settings.
//!
//! Percent values are in percent units. PnL thresholds are leveraged PnL.

use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

// ============================================================================
// TradingConfig
// ============================================================================

/// Order sizing and entry limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingConfig {
    /// Margin per entry and per averaging add, in USD.
    #[serde(default = "default_order_amount_usd")]
    pub order_amount_usd: Decimal,
    #[serde(default = "default_leverage")]
    pub leverage: u32,
    #[serde(default = "default_max_open_positions")]
    pub max_open_positions: usize,
    /// Order book levels considered by the depth check.
    #[serde(default = "default_depth_levels")]
    pub depth_levels: usize,
    /// Book notional must be at least `order_amount * leverage * ratio`.
    #[serde(default = "default_min_liquidity_ratio")]
    pub min_liquidity_ratio: Decimal,
    /// Time stop: `expires_at = opened_at + max_age`.
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: u64,
}

fn default_order_amount_usd() -> Decimal {
    Decimal::from(5)
}

fn default_leverage() -> u32 {
    10
}

fn default_max_open_positions() -> usize {
    5
}

fn default_depth_levels() -> usize {
    20
}

fn default_min_liquidity_ratio() -> Decimal {
    Decimal::TWO
}

fn default_max_age_secs() -> u64 {
    4 * 3600
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            order_amount_usd: default_order_amount_usd(),
            leverage: default_leverage(),
            max_open_positions: default_max_open_positions(),
            depth_levels: default_depth_levels(),
            min_liquidity_ratio: default_min_liquidity_ratio(),
            max_age_secs: default_max_age_secs(),
        }
    }
}

impl TradingConfig {
    pub fn max_age(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.max_age_secs as i64)
    }

    /// Book depth needed to place one order.
    pub fn required_depth_usd(&self) -> Decimal {
        self.order_amount_usd * Decimal::from(self.leverage) * self.min_liquidity_ratio
    }
}

// ============================================================================
// AveragingConfig
// ============================================================================

/// Rules for adding to a losing position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AveragingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Adverse move from the average entry that triggers an add.
    #[serde(default = "default_threshold_pct")]
    pub threshold_pct: Decimal,
    /// Minimum time between adds.
    #[serde(default = "default_averaging_cooldown_secs")]
    pub cooldown_secs: u64,
    #[serde(default = "default_max_adds")]
    pub max_adds: u32,
    /// Cap on `size_notional` per symbol, in USD.
    #[serde(default = "default_max_position_usd")]
    pub max_position_usd: Decimal,
}

fn default_true() -> bool {
    true
}

fn default_threshold_pct() -> Decimal {
    Decimal::from(3)
}

fn default_averaging_cooldown_secs() -> u64 {
    300
}

fn default_max_adds() -> u32 {
    2
}

fn default_max_position_usd() -> Decimal {
    Decimal::from(15)
}

impl Default for AveragingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold_pct: default_threshold_pct(),
            cooldown_secs: default_averaging_cooldown_secs(),
            max_adds: default_max_adds(),
            max_position_usd: default_max_position_usd(),
        }
    }
}

impl AveragingConfig {
    pub fn cooldown(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.cooldown_secs as i64)
    }
}

// ============================================================================
// ExitConfig
// ============================================================================

/// Exit thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitConfig {
    #[serde(default = "default_take_profit_pct")]
    pub take_profit_pct: Decimal,
    /// Close when leveraged PnL is at or below `-stop_loss_pct`.
    #[serde(default = "default_stop_loss_pct")]
    pub stop_loss_pct: Decimal,
    /// Spread considered converged.
    #[serde(default = "default_convergence_band_pct")]
    pub convergence_band_pct: Decimal,
    /// Minimum PnL for a convergence exit. `None` exits on any PnL.
    #[serde(default)]
    pub convergence_min_pnl_pct: Option<Decimal>,
    /// Spread at which the position is abandoned.
    #[serde(default = "default_emergency_spread_pct")]
    pub emergency_spread_pct: Decimal,
}

fn default_take_profit_pct() -> Decimal {
    Decimal::from(30)
}

fn default_stop_loss_pct() -> Decimal {
    Decimal::from(50)
}

fn default_convergence_band_pct() -> Decimal {
    dec!(0.3)
}

fn default_emergency_spread_pct() -> Decimal {
    Decimal::from(30)
}

impl Default for ExitConfig {
    fn default() -> Self {
        Self {
            take_profit_pct: default_take_profit_pct(),
            stop_loss_pct: default_stop_loss_pct(),
            convergence_band_pct: default_convergence_band_pct(),
            convergence_min_pnl_pct: None,
            emergency_spread_pct: default_emergency_spread_pct(),
        }
    }
}

// ============================================================================
// PositionConfig
// ============================================================================

/// All position lifecycle settings, read once per unit of work.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PositionConfig {
    #[serde(default)]
    pub trading: TradingConfig,
    #[serde(default)]
    pub averaging: AveragingConfig,
    #[serde(default)]
    pub exit: ExitConfig,
    #[serde(default = "default_monitor_interval_secs")]
    pub monitor_interval_secs: u64,
}

fn default_monitor_interval_secs() -> u64 {
    10
}

impl PositionConfig {
    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_secs.max(1))
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.trading.leverage == 0 {
            return Err("leverage must be at least 1".to_string());
        }
        if self.trading.order_amount_usd < Decimal::ONE {
            return Err(format!(
                "order_amount_usd ({}) must be at least 1",
                self.trading.order_amount_usd
            ));
        }
        if self.trading.max_age_secs == 0 {
            return Err("max_age_secs must be positive".to_string());
        }
        if self.averaging.max_position_usd < self.trading.order_amount_usd {
            return Err(format!(
                "max_position_usd ({}) must cover at least one order ({})",
                self.averaging.max_position_usd, self.trading.order_amount_usd
            ));
        }
        if self.exit.convergence_band_pct >= self.exit.emergency_spread_pct {
            return Err(format!(
                "convergence_band_pct ({}) must be below emergency_spread_pct ({})",
                self.exit.convergence_band_pct, self.exit.emergency_spread_pct
            ));
        }
        if !self.exit.take_profit_pct.is_sign_positive() || !self.exit.stop_loss_pct.is_sign_positive()
        {
            return Err("take_profit_pct and stop_loss_pct must be positive".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_valid() {
        let config = PositionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.monitor_interval_secs, 10);
        assert!(config.exit.convergence_min_pnl_pct.is_none());
    }

    #[test]
    fn test_required_depth() {
        let trading = TradingConfig::default();
        assert_eq!(trading.required_depth_usd(), Decimal::from(100));
    }

    #[test]
    fn test_cap_below_order_rejected() {
        let mut config = PositionConfig::default();
        config.averaging.max_position_usd = Decimal::ONE;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml() {
        let config: PositionConfig = toml::from_str(
            r#"
            [exit]
            take_profit_pct = 25
            convergence_min_pnl_pct = 10
            "#,
        )
        .unwrap();
        assert_eq!(config.exit.take_profit_pct, Decimal::from(25));
        assert_eq!(config.exit.convergence_min_pnl_pct, Some(Decimal::from(10)));
        assert_eq!(config.trading.leverage, 10);
    }
}
