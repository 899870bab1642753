//! Verification configuration.

use std::collections::BTreeMap;
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::economics::RoundTripCost;

/// Thresholds for the verification pipeline.
///
/// Percent values are in percent units (`0.5` means 0.5%).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifyConfig {
    /// Minimum time between accepted signals for one symbol.
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    #[serde(default = "default_min_liquidity_usd")]
    pub min_liquidity_usd: Decimal,
    #[serde(default = "default_min_volume_24h_usd")]
    pub min_volume_24h_usd: Decimal,
    /// Taker fee per leg.
    #[serde(default = "default_taker_fee_pct")]
    pub taker_fee_pct: Decimal,
    /// Expected slippage over the round trip.
    #[serde(default = "default_slippage_pct")]
    pub slippage_pct: Decimal,
    /// `|spread| - round_trip_cost` must be at least this.
    #[serde(default = "default_min_net_profit_pct")]
    pub min_net_profit_pct: Decimal,
    /// `|spread|` above this is treated as a data error.
    #[serde(default = "default_max_spread_pct")]
    pub max_spread_pct: Decimal,
    /// Reference/home price ratio above this adds a warning.
    #[serde(default = "default_price_ratio_warn")]
    pub price_ratio_warn: Decimal,
    /// Accepted band for `|price_change_1h|`.
    #[serde(default = "default_min_volatility_pct")]
    pub min_volatility_pct: Decimal,
    #[serde(default = "default_max_volatility_pct")]
    pub max_volatility_pct: Decimal,
    #[serde(default = "default_min_buy_ratio_pct")]
    pub min_buy_ratio_pct: Decimal,
    /// Order book levels summed for the depth check.
    #[serde(default = "default_depth_levels")]
    pub depth_levels: usize,
    /// Required depth = `order_amount_usd * leverage * depth_multiple`.
    #[serde(default = "default_depth_multiple")]
    pub depth_multiple: Decimal,
    /// Margin per order, mirrored from the trading settings.
    #[serde(default = "default_order_amount_usd")]
    pub order_amount_usd: Decimal,
    #[serde(default = "default_leverage")]
    pub leverage: u32,
}

fn default_cooldown_secs() -> u64 {
    300
}

fn default_min_liquidity_usd() -> Decimal {
    Decimal::from(2_000)
}

fn default_min_volume_24h_usd() -> Decimal {
    Decimal::from(5_000)
}

fn default_taker_fee_pct() -> Decimal {
    dec!(0.06)
}

fn default_slippage_pct() -> Decimal {
    dec!(0.08)
}

fn default_min_net_profit_pct() -> Decimal {
    dec!(0.3)
}

fn default_max_spread_pct() -> Decimal {
    Decimal::from(10)
}

fn default_price_ratio_warn() -> Decimal {
    dec!(1.5)
}

fn default_min_volatility_pct() -> Decimal {
    dec!(0.5)
}

fn default_max_volatility_pct() -> Decimal {
    Decimal::from(20)
}

fn default_min_buy_ratio_pct() -> Decimal {
    Decimal::from(30)
}

fn default_depth_levels() -> usize {
    20
}

fn default_depth_multiple() -> Decimal {
    Decimal::TWO
}

fn default_order_amount_usd() -> Decimal {
    Decimal::from(5)
}

fn default_leverage() -> u32 {
    10
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: default_cooldown_secs(),
            min_liquidity_usd: default_min_liquidity_usd(),
            min_volume_24h_usd: default_min_volume_24h_usd(),
            taker_fee_pct: default_taker_fee_pct(),
            slippage_pct: default_slippage_pct(),
            min_net_profit_pct: default_min_net_profit_pct(),
            max_spread_pct: default_max_spread_pct(),
            price_ratio_warn: default_price_ratio_warn(),
            min_volatility_pct: default_min_volatility_pct(),
            max_volatility_pct: default_max_volatility_pct(),
            min_buy_ratio_pct: default_min_buy_ratio_pct(),
            depth_levels: default_depth_levels(),
            depth_multiple: default_depth_multiple(),
            order_amount_usd: default_order_amount_usd(),
            leverage: default_leverage(),
        }
    }
}

impl VerifyConfig {
    pub fn cooldown(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.cooldown_secs as i64)
    }

    pub fn round_trip_cost(&self) -> RoundTripCost {
        RoundTripCost::new(self.taker_fee_pct, self.slippage_pct)
    }

    /// Book depth needed on the entry side.
    pub fn required_depth_usd(&self) -> Decimal {
        self.order_amount_usd * Decimal::from(self.leverage) * self.depth_multiple
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.min_volatility_pct > self.max_volatility_pct {
            return Err(format!(
                "min_volatility_pct ({}) must not exceed max_volatility_pct ({})",
                self.min_volatility_pct, self.max_volatility_pct
            ));
        }
        if self.taker_fee_pct.is_sign_negative() || self.slippage_pct.is_sign_negative() {
            return Err("fees and slippage must be non-negative".to_string());
        }
        if !self.max_spread_pct.is_sign_positive() || self.max_spread_pct.is_zero() {
            return Err(format!(
                "max_spread_pct ({}) must be positive",
                self.max_spread_pct
            ));
        }
        if self.leverage == 0 {
            return Err("leverage must be at least 1".to_string());
        }
        Ok(())
    }
}

// ============================================================================
// Safety
// ============================================================================

/// Contract safety check settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_honeypot_url")]
    pub api_url: String,
    #[serde(default = "default_safety_timeout_secs")]
    pub timeout_secs: u64,
    /// Buy or sell tax above this is suspicious.
    #[serde(default = "default_max_tax_pct")]
    pub max_tax_pct: Decimal,
    /// Contract bytecode above this size is suspicious.
    #[serde(default = "default_max_code_bytes")]
    pub max_code_bytes: usize,
    /// Chain id -> JSON-RPC URL for the bytecode fallback.
    #[serde(default = "default_rpc_urls")]
    pub rpc_urls: BTreeMap<String, String>,
}

fn default_true() -> bool {
    true
}

fn default_honeypot_url() -> String {
    "https://api.honeypot.is/v2/IsHoneypot".to_string()
}

fn default_safety_timeout_secs() -> u64 {
    5
}

fn default_max_tax_pct() -> Decimal {
    Decimal::from(10)
}

fn default_max_code_bytes() -> usize {
    50_000
}

fn default_rpc_urls() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("ethereum".to_string(), "https://eth.llamarpc.com".to_string()),
        ("bsc".to_string(), "https://bsc-dataseed.binance.org".to_string()),
    ])
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_url: default_honeypot_url(),
            timeout_secs: default_safety_timeout_secs(),
            max_tax_pct: default_max_tax_pct(),
            max_code_bytes: default_max_code_bytes(),
            rpc_urls: default_rpc_urls(),
        }
    }
}

impl SafetyConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_depth() {
        let config = VerifyConfig {
            order_amount_usd: Decimal::from(5),
            leverage: 10,
            depth_multiple: Decimal::TWO,
            ..Default::default()
        };
        assert_eq!(config.required_depth_usd(), Decimal::from(100));
    }

    #[test]
    fn test_validate_volatility_band() {
        let config = VerifyConfig {
            min_volatility_pct: Decimal::from(30),
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert!(VerifyConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let config: VerifyConfig = toml::from_str("cooldown_secs = 60").unwrap();
        assert_eq!(config.cooldown_secs, 60);
        assert_eq!(config.price_ratio_warn, dec!(1.5));
    }
}
