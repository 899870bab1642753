//! DEX pair-search aggregator.
//!
//! Queries `GET {base_url}/search?q={symbol}` and picks the most liquid
//! pair on an allowed chain and DEX whose base token matches exactly.

use std::time::Duration;

use arb_core::{Price, ProviderId, ProviderQuote};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

use crate::config::{AggregatorConfig, QuoteFloors};
use crate::error::PriceResult;
use crate::http::{build_client, get_json};
use crate::provider::QuoteProvider;

// ============================================================================
// Wire format
// ============================================================================

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    pairs: Option<Vec<RawPair>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPair {
    chain_id: String,
    dex_id: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    pair_address: Option<String>,
    base_token: RawToken,
    #[serde(default)]
    price_usd: Option<Decimal>,
    #[serde(default)]
    liquidity: Option<RawLiquidity>,
    #[serde(default)]
    volume: Option<RawWindows>,
    #[serde(default)]
    price_change: Option<RawWindows>,
    #[serde(default)]
    txns: Option<RawTxns>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawToken {
    #[serde(default)]
    address: Option<String>,
    symbol: String,
}

#[derive(Debug, Clone, Deserialize)]
struct RawLiquidity {
    #[serde(default)]
    usd: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawWindows {
    #[serde(default)]
    h1: Option<Decimal>,
    #[serde(default)]
    h24: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawTxns {
    #[serde(default)]
    h24: Option<RawBuySell>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct RawBuySell {
    #[serde(default)]
    buys: u64,
    #[serde(default)]
    sells: u64,
}

impl RawPair {
    fn liquidity_usd(&self) -> Decimal {
        self.liquidity
            .as_ref()
            .and_then(|l| l.usd)
            .unwrap_or_default()
    }

    fn volume_24h(&self) -> Decimal {
        self.volume.as_ref().and_then(|v| v.h24).unwrap_or_default()
    }

    fn buy_ratio_pct(&self) -> Option<Decimal> {
        let counts = self.txns.as_ref()?.h24?;
        let total = counts.buys + counts.sells;
        if total == 0 {
            return None;
        }
        Some(Decimal::from(counts.buys) * Decimal::ONE_HUNDRED / Decimal::from(total))
    }

    fn pair_url(&self) -> Option<String> {
        self.url.clone().or_else(|| {
            self.pair_address
                .as_ref()
                .map(|a| format!("https://dexscreener.com/{}/{}", self.chain_id, a))
        })
    }
}

// ============================================================================
// Provider
// ============================================================================

pub struct AggregatorProvider {
    client: Client,
    config: AggregatorConfig,
}

impl AggregatorProvider {
    pub fn new(config: AggregatorConfig, timeout: Duration) -> PriceResult<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            config,
        })
    }

    fn search_url(&self) -> String {
        format!("{}/search", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl QuoteProvider for AggregatorProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Aggregator
    }

    fn min_interval(&self) -> Duration {
        Duration::from_millis(self.config.min_interval_ms)
    }

    async fn search(&self, symbol: &str, floors: &QuoteFloors) -> PriceResult<Option<ProviderQuote>> {
        let response: SearchResponse =
            get_json(&self.client, &self.search_url(), &[("q", symbol)]).await?;

        let pairs = response.pairs.unwrap_or_default();
        debug!(symbol, pairs = pairs.len(), "Aggregator search returned");
        Ok(select_pair(pairs, symbol, &self.config, floors, Utc::now()))
    }
}

/// Pick the best pair for `symbol` from search results.
///
/// Only the first `max_pairs` results on allowed chains are considered;
/// these are sorted by liquidity and the first one on an allowed DEX with
/// a matching base symbol, a positive price and floors met wins.
fn select_pair(
    pairs: Vec<RawPair>,
    symbol: &str,
    config: &AggregatorConfig,
    floors: &QuoteFloors,
    now: DateTime<Utc>,
) -> Option<ProviderQuote> {
    let mut candidates: Vec<RawPair> = pairs
        .into_iter()
        .filter(|p| config.allowed_chains.iter().any(|c| c == &p.chain_id))
        .take(config.max_pairs)
        .collect();
    candidates.sort_by(|a, b| b.liquidity_usd().cmp(&a.liquidity_usd()));

    candidates.into_iter().find_map(|pair| {
        if !pair.base_token.symbol.eq_ignore_ascii_case(symbol) {
            return None;
        }
        if !config
            .allowed_dexes
            .iter()
            .any(|d| d.eq_ignore_ascii_case(&pair.dex_id))
        {
            return None;
        }
        let price = pair.price_usd.filter(|p| p.is_sign_positive() && !p.is_zero())?;
        let liquidity = pair.liquidity_usd();
        let volume = pair.volume_24h();
        if !floors.admits(liquidity, volume) {
            return None;
        }

        Some(ProviderQuote {
            price: Price::new(price),
            liquidity_usd: liquidity,
            volume_24h_usd: volume,
            provider_id: ProviderId::Aggregator,
            chain: pair.chain_id.clone(),
            fetched_at: now,
            pair_address: pair.pair_address.clone(),
            token_address: pair.base_token.address.clone(),
            dex_id: Some(pair.dex_id.clone()),
            pair_url: pair.pair_url(),
            buy_ratio_pct: pair.buy_ratio_pct(),
            price_change_1h_pct: pair.price_change.as_ref().and_then(|c| c.h1),
        })
    })
}
