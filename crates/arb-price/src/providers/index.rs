//! Centralized market-data index.
//!
//! Queries `GET {base_url}/simple/price?ids={id}&vs_currencies=usd` with
//! market cap and 24h volume. The index aggregates many venues and has no
//! pool liquidity figure; market cap stands in for it.

use std::collections::HashMap;
use std::time::Duration;

use arb_core::{Price, ProviderId, ProviderQuote};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

use crate::config::{IndexConfig, QuoteFloors};
use crate::error::PriceResult;
use crate::http::{build_client, get_json};
use crate::provider::QuoteProvider;

#[derive(Debug, Clone, Deserialize)]
struct CoinMarket {
    #[serde(default)]
    usd: Option<Decimal>,
    #[serde(default)]
    usd_market_cap: Option<Decimal>,
    #[serde(default)]
    usd_24h_vol: Option<Decimal>,
}

pub struct IndexProvider {
    client: Client,
    config: IndexConfig,
}

impl IndexProvider {
    pub fn new(config: IndexConfig, timeout: Duration) -> PriceResult<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            config,
        })
    }

    fn price_url(&self) -> String {
        format!("{}/simple/price", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl QuoteProvider for IndexProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Index
    }

    fn min_interval(&self) -> Duration {
        Duration::from_millis(self.config.min_interval_ms)
    }

    async fn search(&self, symbol: &str, floors: &QuoteFloors) -> PriceResult<Option<ProviderQuote>> {
        let Some(coin_id) = self.config.coin_ids.get(symbol) else {
            debug!(symbol, "No index id mapping, skipping");
            return Ok(None);
        };

        let body: HashMap<String, CoinMarket> = get_json(
            &self.client,
            &self.price_url(),
            &[
                ("ids", coin_id.as_str()),
                ("vs_currencies", "usd"),
                ("include_market_cap", "true"),
                ("include_24hr_vol", "true"),
            ],
        )
        .await?;

        Ok(parse_market(&body, coin_id, floors, Utc::now()))
    }
}

fn parse_market(
    body: &HashMap<String, CoinMarket>,
    coin_id: &str,
    floors: &QuoteFloors,
    now: DateTime<Utc>,
) -> Option<ProviderQuote> {
    let market = body.get(coin_id)?;
    let price = market.usd.filter(|p| p.is_sign_positive() && !p.is_zero())?;
    let liquidity = market.usd_market_cap.unwrap_or_default();
    let volume = market.usd_24h_vol.unwrap_or_default();
    if !floors.admits(liquidity, volume) {
        return None;
    }

    let mut quote = ProviderQuote::new(ProviderId::Index, Price::new(price), liquidity, volume, "index");
    quote.fetched_at = now;
    quote.pair_url = Some(format!("https://www.coingecko.com/en/coins/{coin_id}"));
    Some(quote)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_body() -> HashMap<String, CoinMarket> {
        serde_json::from_str(
            r#"{"chainlink": {"usd": 14.2, "usd_market_cap": 8300000000, "usd_24h_vol": 410000000}}"#,
        )
        .unwrap()
    }

    #[test]
    fn test_parse_market() {
        let quote = parse_market(
            &sample_body(),
            "chainlink",
            &QuoteFloors::signal_default(),
            Utc::now(),
        )
        .unwrap();

        assert_eq!(quote.price, Price::new(dec!(14.2)));
        assert_eq!(quote.provider_id, ProviderId::Index);
        assert!(quote.token_address.is_none());
    }

    #[test]
    fn test_missing_id_is_none() {
        assert!(parse_market(
            &sample_body(),
            "uniswap",
            &QuoteFloors::signal_default(),
            Utc::now()
        )
        .is_none());
    }

    #[test]
    fn test_zero_price_is_none() {
        let body: HashMap<String, CoinMarket> =
            serde_json::from_str(r#"{"foo": {"usd": 0, "usd_market_cap": 1e9, "usd_24h_vol": 1e9}}"#)
                .unwrap();
        assert!(parse_market(&body, "foo", &QuoteFloors::signal_default(), Utc::now()).is_none());
    }
}
