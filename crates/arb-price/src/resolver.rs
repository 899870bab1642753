//! Cascading reference price resolver.

use std::sync::Arc;
use std::time::Duration;

use arb_core::{base_symbol, ProviderQuote, QuoteMode};
use arb_telemetry::Metrics;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::cache::QuoteCache;
use crate::config::{QuoteFloors, ResolverConfig};
use crate::error::{PriceError, PriceResult};
use crate::plausibility::PlausibilityBands;
use crate::provider::QuoteProvider;
use crate::providers::{AggregatorProvider, IndexProvider, OnChainProvider};
use crate::rate_limiter::MinIntervalLimiter;
use crate::retry::RetryPolicy;

/// A provider and its rate limiter.
struct ProviderSlot {
    provider: Arc<dyn QuoteProvider>,
    limiter: MinIntervalLimiter,
}

/// Resolves a reference price for a symbol by querying providers in order.
pub struct PriceResolver {
    slots: Vec<ProviderSlot>,
    cache: QuoteCache,
    bands: PlausibilityBands,
    retry: RetryPolicy,
    signal_floors: QuoteFloors,
    convergence_floors: QuoteFloors,
}

impl PriceResolver {
    /// Build a resolver over `providers`, queried in the given order.
    pub fn new(config: &ResolverConfig, providers: Vec<Arc<dyn QuoteProvider>>) -> Self {
        let slots = providers
            .into_iter()
            .map(|provider| ProviderSlot {
                limiter: MinIntervalLimiter::new(provider.min_interval()),
                provider,
            })
            .collect();

        Self {
            slots,
            cache: QuoteCache::new(chrono::Duration::seconds(config.cache_ttl_secs as i64)),
            bands: PlausibilityBands::default(),
            retry: RetryPolicy::new(
                config.max_attempts,
                Duration::from_millis(config.base_backoff_ms),
            ),
            signal_floors: config.signal_floors.clone(),
            convergence_floors: config.convergence_floors.clone(),
        }
    }

    /// Build the enabled HTTP providers from config.
    pub fn from_config(config: &ResolverConfig) -> PriceResult<Self> {
        config.validate().map_err(PriceError::InvalidConfig)?;
        let timeout = config.request_timeout();

        let mut providers: Vec<Arc<dyn QuoteProvider>> = Vec::new();
        if config.aggregator.enabled {
            providers.push(Arc::new(AggregatorProvider::new(config.aggregator.clone(), timeout)?));
        }
        if config.index.enabled {
            providers.push(Arc::new(IndexProvider::new(config.index.clone(), timeout)?));
        }
        if config.onchain.enabled && config.onchain.rpc_url.is_some() {
            providers.push(Arc::new(OnChainProvider::new(config.onchain.clone(), timeout)?));
        }

        info!(
            providers = ?providers.iter().map(|p| p.id().as_str()).collect::<Vec<_>>(),
            cache_ttl_secs = config.cache_ttl_secs,
            "Price resolver initialized"
        );
        Ok(Self::new(config, providers))
    }

    /// Replace the plausibility bands.
    pub fn with_bands(mut self, bands: PlausibilityBands) -> Self {
        self.bands = bands;
        self
    }

    pub fn floors(&self, mode: QuoteMode) -> &QuoteFloors {
        match mode {
            QuoteMode::Signal => &self.signal_floors,
            QuoteMode::Convergence => &self.convergence_floors,
        }
    }

    pub fn cache(&self) -> &QuoteCache {
        &self.cache
    }

    /// Resolve a reference quote for `symbol`.
    ///
    /// Returns [`PriceError::NotFound`] when no provider yields a plausible
    /// quote that clears the mode's floors.
    pub async fn resolve(&self, symbol: &str, mode: QuoteMode) -> PriceResult<ProviderQuote> {
        let base = base_symbol(symbol);
        let mode_label = mode.to_string();

        if let Some(quote) = self.cache.get(&base, mode, Utc::now()) {
            Metrics::resolver_cache(&mode_label, true);
            return Ok(quote);
        }
        Metrics::resolver_cache(&mode_label, false);

        let floors = self.floors(mode);
        for slot in &self.slots {
            let id = slot.provider.id();
            let quote = match self.query(slot, &base, floors).await {
                Ok(Some(quote)) => quote,
                Ok(None) => {
                    Metrics::provider_request(id.as_str(), "empty");
                    continue;
                }
                Err(e) => {
                    Metrics::provider_request(id.as_str(), "error");
                    warn!(symbol = %base, provider = %id, error = %e, "Provider failed");
                    continue;
                }
            };

            if let Err(reason) = self.bands.check(&base, quote.price) {
                Metrics::provider_request(id.as_str(), "implausible");
                warn!(symbol = %base, provider = %id, %reason, "Implausible reference price");
                continue;
            }
            let clears_floors = if slot.provider.reports_volume() {
                floors.admits(quote.liquidity_usd, quote.volume_24h_usd)
            } else {
                quote.liquidity_usd >= floors.min_liquidity_usd
            };
            if !clears_floors {
                Metrics::provider_request(id.as_str(), "below_floor");
                debug!(
                    symbol = %base,
                    provider = %id,
                    liquidity = %quote.liquidity_usd,
                    volume = %quote.volume_24h_usd,
                    "Quote below floors"
                );
                continue;
            }

            Metrics::provider_request(id.as_str(), "success");
            debug!(symbol = %base, provider = %id, price = %quote.price, %mode, "Reference price resolved");
            self.cache.insert(&base, mode, quote.clone());
            return Ok(quote);
        }

        Metrics::resolve_not_found(&mode_label);
        debug!(symbol = %base, %mode, "No provider produced a usable quote");
        Err(PriceError::NotFound { symbol: base, mode })
    }

    /// One provider call with rate limiting and bounded retries.
    async fn query(
        &self,
        slot: &ProviderSlot,
        symbol: &str,
        floors: &QuoteFloors,
    ) -> PriceResult<Option<ProviderQuote>> {
        let mut attempt = 0;
        loop {
            slot.limiter.wait().await;
            match slot.provider.search(symbol, floors).await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_transient() && self.retry.should_retry(attempt) => {
                    let delay = self.retry.backoff(attempt);
                    Metrics::provider_request(slot.provider.id().as_str(), "transient");
                    debug!(
                        symbol,
                        provider = %slot.provider.id(),
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient provider failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
