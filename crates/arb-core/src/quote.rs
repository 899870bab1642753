//! Reference price quotes.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::decimal::Price;

/// Which floors a resolution must satisfy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuoteMode {
    /// Entry signals: strict liquidity/volume floors.
    Signal,
    /// Exit checks on open positions: looser floors.
    Convergence,
}

impl fmt::Display for QuoteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signal => write!(f, "signal"),
            Self::Convergence => write!(f, "convergence"),
        }
    }
}

/// Reference provider identity, in cascade priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderId {
    /// Pair search across decentralized exchanges.
    Aggregator,
    /// Centralized market-data index.
    Index,
    /// Direct read of an on-chain liquidity pool.
    OnChain,
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aggregator => "aggregator",
            Self::Index => "index",
            Self::OnChain => "on_chain",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized output of a reference provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderQuote {
    pub price: Price,
    pub liquidity_usd: Decimal,
    pub volume_24h_usd: Decimal,
    pub provider_id: ProviderId,
    pub chain: String,
    pub fetched_at: DateTime<Utc>,
    #[serde(default)]
    pub pair_address: Option<String>,
    #[serde(default)]
    pub token_address: Option<String>,
    #[serde(default)]
    pub dex_id: Option<String>,
    #[serde(default)]
    pub pair_url: Option<String>,
    /// 24h buys / (buys + sells) * 100.
    #[serde(default)]
    pub buy_ratio_pct: Option<Decimal>,
    /// Short-horizon price change, used as a volatility proxy.
    #[serde(default)]
    pub price_change_1h_pct: Option<Decimal>,
}

impl ProviderQuote {
    /// Minimal quote with no provenance details.
    pub fn new(
        provider_id: ProviderId,
        price: Price,
        liquidity_usd: Decimal,
        volume_24h_usd: Decimal,
        chain: impl Into<String>,
    ) -> Self {
        Self {
            price,
            liquidity_usd,
            volume_24h_usd,
            provider_id,
            chain: chain.into(),
            fetched_at: Utc::now(),
            pair_address: None,
            token_address: None,
            dex_id: None,
            pair_url: None,
            buy_ratio_pct: None,
            price_change_1h_pct: None,
        }
    }

    /// Age of the quote relative to `now`.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.fetched_at
    }
}
