//! Direct constant-product pool reads over JSON-RPC.
//!
//! Calls `getReserves()` (selector `0x0902f1ac`) on a configured pair and
//! prices the token in the pool's quote asset. Pool reads carry no volume
//! figure, so only the liquidity floor is applied here and the quote
//! reports zero volume.

use std::time::Duration;

use arb_core::{Price, ProviderId, ProviderQuote};
use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::debug;

use crate::config::{OnChainConfig, PoolConfig, QuoteFloors};
use crate::error::{PriceError, PriceResult};
use crate::provider::QuoteProvider;
use crate::rpc::{decode_u128_words, RpcClient};

const GET_RESERVES_SELECTOR: &str = "0x0902f1ac";

pub struct OnChainProvider {
    rpc: RpcClient,
    config: OnChainConfig,
}

impl OnChainProvider {
    pub fn new(config: OnChainConfig, timeout: Duration) -> PriceResult<Self> {
        let url = config
            .rpc_url
            .clone()
            .ok_or_else(|| PriceError::InvalidConfig("on-chain provider needs rpc_url".to_string()))?;
        Ok(Self {
            rpc: RpcClient::new(url, timeout)?,
            config,
        })
    }
}

#[async_trait]
impl QuoteProvider for OnChainProvider {
    fn id(&self) -> ProviderId {
        ProviderId::OnChain
    }

    fn min_interval(&self) -> Duration {
        Duration::from_millis(self.config.min_interval_ms)
    }

    fn reports_volume(&self) -> bool {
        false
    }

    async fn search(&self, symbol: &str, floors: &QuoteFloors) -> PriceResult<Option<ProviderQuote>> {
        let Some(pool) = self.config.pools.get(symbol) else {
            return Ok(None);
        };

        let raw = self.rpc.eth_call(&pool.pair_address, GET_RESERVES_SELECTOR).await?;
        let words = decode_u128_words(&raw)
            .filter(|w| w.len() >= 2)
            .ok_or_else(|| PriceError::Parse(format!("getReserves returned {raw}")))?;

        let Some((price, liquidity)) = price_from_reserves(pool, words[0], words[1]) else {
            debug!(symbol, pool = %pool.pair_address, "Pool reserves unusable");
            return Ok(None);
        };
        if liquidity < floors.min_liquidity_usd {
            return Ok(None);
        }

        let mut quote = ProviderQuote::new(
            ProviderId::OnChain,
            Price::new(price),
            liquidity,
            Decimal::ZERO,
            pool.chain.clone(),
        );
        quote.pair_address = Some(pool.pair_address.clone());
        Ok(Some(quote))
    }
}

/// `(price_usd, liquidity_usd)` from raw reserves.
///
/// Liquidity is twice the quote-side reserve value.
fn price_from_reserves(pool: &PoolConfig, reserve0: u128, reserve1: u128) -> Option<(Decimal, Decimal)> {
    let (token_raw, quote_raw) = if pool.token_is_token0 {
        (reserve0, reserve1)
    } else {
        (reserve1, reserve0)
    };
    let token = scaled(token_raw, pool.token_decimals)?;
    let quote = scaled(quote_raw, pool.quote_decimals)?;
    if token.is_zero() || quote.is_zero() {
        return None;
    }

    let quote_usd = quote.checked_mul(pool.quote_usd_price)?;
    let price = quote_usd.checked_div(token)?;
    let liquidity = quote_usd.checked_mul(Decimal::TWO)?;
    Some((price, liquidity))
}

/// `raw / 10^decimals` as a decimal.
fn scaled(raw: u128, decimals: u32) -> Option<Decimal> {
    let value: Decimal = raw.to_string().parse().ok()?;
    let mut divisor = Decimal::ONE;
    for _ in 0..decimals {
        divisor = divisor.checked_mul(Decimal::TEN)?;
    }
    value.checked_div(divisor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_pool(token_is_token0: bool) -> PoolConfig {
        PoolConfig {
            chain: "bsc".to_string(),
            pair_address: "0xpair".to_string(),
            token_is_token0,
            token_decimals: 18,
            quote_decimals: 6,
            quote_usd_price: Decimal::ONE,
        }
    }

    #[test]
    fn test_price_from_reserves() {
        // 1,000 tokens against 2,500 USDC
        let token = 1_000u128 * 10u128.pow(18);
        let quote = 2_500u128 * 10u128.pow(6);

        let (price, liquidity) = price_from_reserves(&sample_pool(true), token, quote).unwrap();
        assert_eq!(price, dec!(2.5));
        assert_eq!(liquidity, dec!(5000));

        let (flipped, _) = price_from_reserves(&sample_pool(false), quote, token).unwrap();
        assert_eq!(flipped, dec!(2.5));
    }

    #[test]
    fn test_empty_pool_is_none() {
        assert!(price_from_reserves(&sample_pool(true), 0, 1_000_000).is_none());
    }

    #[test]
    fn test_missing_rpc_url_rejected() {
        let err = OnChainProvider::new(OnChainConfig::default(), Duration::from_secs(1));
        assert!(matches!(err, Err(PriceError::InvalidConfig(_))));
    }
}
