//! Ordered verification pipeline.

use std::sync::Arc;

use arb_core::{
    ConfigSource, CooldownTable, Opportunity, QuoteMode, SafetyStatus, VenueClient,
    VerificationResult,
};
use arb_price::PriceResolver;
use arb_telemetry::Metrics;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::config::VerifyConfig;
use crate::economics::Economics;
use crate::safety::SafetyChecker;

/// Stage labels, used for metrics.
mod stage {
    pub const COOLDOWN: &str = "cooldown";
    pub const TRADABILITY: &str = "tradability";
    pub const REFERENCE: &str = "reference";
    pub const LIQUIDITY: &str = "liquidity";
    pub const ECONOMICS: &str = "economics";
    pub const SAFETY: &str = "safety";
    pub const NONE: &str = "none";
}

/// Runs the verification stages for one opportunity.
pub struct VerificationPipeline {
    resolver: Arc<PriceResolver>,
    venue: Arc<dyn VenueClient>,
    safety: Arc<dyn SafetyChecker>,
    cooldowns: Arc<CooldownTable>,
    config: Arc<dyn ConfigSource<VerifyConfig>>,
}

impl VerificationPipeline {
    pub fn new(
        resolver: Arc<PriceResolver>,
        venue: Arc<dyn VenueClient>,
        safety: Arc<dyn SafetyChecker>,
        cooldowns: Arc<CooldownTable>,
        config: Arc<dyn ConfigSource<VerifyConfig>>,
    ) -> Self {
        Self {
            resolver,
            venue,
            safety,
            cooldowns,
            config,
        }
    }

    pub fn cooldowns(&self) -> &Arc<CooldownTable> {
        &self.cooldowns
    }

    /// Verify `opportunity`.
    ///
    /// `accepted` is true exactly when no stage recorded an error. Only an
    /// accepted result starts the symbol's cooldown.
    pub async fn verify(&self, opportunity: &Opportunity) -> VerificationResult {
        let config = self.config.current();
        let now = Utc::now();

        let mut result = VerificationResult {
            spread_pct: Some(opportunity.spread_pct),
            ..Default::default()
        };
        let failed_stage = self.run_stages(opportunity, &config, now, &mut result).await;
        let result = result.finalize();

        if result.accepted {
            self.cooldowns.record(&opportunity.symbol, now);
            info!(
                symbol = %opportunity.symbol,
                spread_pct = ?result.spread_pct,
                net_profit_pct = ?result.net_profit_pct,
                warnings = result.warnings.len(),
                "Signal verified"
            );
        } else {
            debug!(
                symbol = %opportunity.symbol,
                stage = failed_stage,
                errors = ?result.errors,
                "Signal rejected"
            );
        }
        Metrics::verification(result.accepted, failed_stage);
        result
    }

    /// Returns the first stage that recorded an error.
    async fn run_stages(
        &self,
        opportunity: &Opportunity,
        config: &VerifyConfig,
        now: DateTime<Utc>,
        result: &mut VerificationResult,
    ) -> &'static str {
        let symbol = opportunity.symbol.as_str();

        // 1. Cooldown
        if let Some(remaining) = self.cooldowns.remaining(symbol, config.cooldown(), now) {
            result.error(format!(
                "{symbol} in cooldown ({}s remaining)",
                remaining.num_seconds()
            ));
            return stage::COOLDOWN;
        }

        // 2. Tradability
        let home_price = match self.venue.ticker(symbol).await {
            Ok(price) if price.is_positive() => price,
            Ok(price) => {
                result.error(format!("{symbol} has no usable home price ({price})"));
                return stage::TRADABILITY;
            }
            Err(e) => {
                result.error(format!("{symbol} home price unavailable: {e}"));
                return stage::TRADABILITY;
            }
        };
        result.home_price = Some(home_price);
        match self.venue.is_tradable(symbol).await {
            Ok(true) => {}
            Ok(false) => {
                result.error(format!("{symbol} is not tradable on the home venue"));
                return stage::TRADABILITY;
            }
            Err(e) => {
                result.error(format!("{symbol} tradability unknown: {e}"));
                return stage::TRADABILITY;
            }
        }

        // 3. Reference price and liquidity
        let quote = match self.resolver.resolve(symbol, QuoteMode::Signal).await {
            Ok(quote) => quote,
            Err(e) => {
                result.error(format!("No reference pair: {e}"));
                return stage::REFERENCE;
            }
        };
        result.reference = Some(quote.clone());

        let mut failed: Option<&'static str> = None;
        if quote.volume_24h_usd < config.min_volume_24h_usd {
            result.error(format!(
                "24h volume ${} below minimum ${}",
                quote.volume_24h_usd.round(), config.min_volume_24h_usd
            ));
            failed.get_or_insert(stage::LIQUIDITY);
        }
        if quote.liquidity_usd < config.min_liquidity_usd {
            result.error(format!(
                "Liquidity ${} below minimum ${}",
                quote.liquidity_usd.round(), config.min_liquidity_usd
            ));
            failed.get_or_insert(stage::LIQUIDITY);
        }

        // 4. Economics
        match quote.price.pct_from(home_price) {
            Some(spread) => {
                let economics = Economics::evaluate(spread, config.round_trip_cost());
                result.spread_pct = Some(spread);
                result.net_profit_pct = Some(economics.net_profit_pct);

                if economics.net_profit_pct < config.min_net_profit_pct {
                    result.error(format!(
                        "Net profit {}% below minimum {}%",
                        economics.net_profit_pct.round_dp(2),
                        config.min_net_profit_pct
                    ));
                    failed.get_or_insert(stage::ECONOMICS);
                }
                if economics.abs_spread() > config.max_spread_pct {
                    result.error(format!(
                        "Spread {}% above maximum {}%",
                        economics.abs_spread().round_dp(2),
                        config.max_spread_pct
                    ));
                    failed.get_or_insert(stage::ECONOMICS);
                }
            }
            None => {
                result.error("Spread undefined for zero home price");
                failed.get_or_insert(stage::ECONOMICS);
            }
        }
        if let Some(ratio) = home_price.ratio_to(quote.price) {
            result.price_ratio = Some(ratio);
            if ratio > config.price_ratio_warn {
                result.warn(format!("Price ratio {}x is unusually large", ratio.round_dp(2)));
            }
        }

        // 5. Safety
        let safety = self
            .safety
            .check(quote.token_address.as_deref(), &quote.chain)
            .await;
        result.safety = Some(safety);
        match safety {
            SafetyStatus::Blocked | SafetyStatus::Suspicious => {
                result.error(format!("Contract safety check: {safety}"));
                failed.get_or_insert(stage::SAFETY);
            }
            SafetyStatus::Unknown => result.warn("Contract safety could not be determined"),
            SafetyStatus::Ok => {}
        }

        // 6. Secondary checks, warnings only
        if let Some(change) = quote.price_change_1h_pct {
            let volatility = change.abs();
            if volatility < config.min_volatility_pct || volatility > config.max_volatility_pct {
                result.warn(format!(
                    "Volatility {}% outside {}%..{}%",
                    volatility.round_dp(2),
                    config.min_volatility_pct,
                    config.max_volatility_pct
                ));
            }
        }
        if let Some(buy_ratio) = quote.buy_ratio_pct {
            if buy_ratio < config.min_buy_ratio_pct {
                result.warn(format!(
                    "Buy ratio {}% below minimum {}%",
                    buy_ratio.round_dp(1),
                    config.min_buy_ratio_pct
                ));
            }
        }
        match self.venue.order_book(symbol, config.depth_levels).await {
            Ok(book) => {
                let depth = book.depth_notional(opportunity.side, config.depth_levels);
                result.orderbook_depth_usd = Some(depth);
                let required = config.required_depth_usd();
                if depth < required {
                    result.warn(format!(
                        "Order book depth ${} below required ${}",
                        depth.round(),
                        required
                    ));
                }
            }
            Err(e) => result.warn(format!("Order book unavailable: {e}")),
        }

        failed.unwrap_or(stage::NONE)
    }
}
