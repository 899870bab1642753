//! Reference provider interface.

use std::time::Duration;

use arb_core::{ProviderId, ProviderQuote};
use async_trait::async_trait;

use crate::config::QuoteFloors;
use crate::error::PriceResult;

/// One source of reference prices.
///
/// Implementations normalise their own response shape into a
/// [`ProviderQuote`]. `Ok(None)` means the provider has nothing usable for
/// the symbol and the resolver moves on without retrying. Only
/// [`crate::PriceError::Transient`] errors are retried.
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    fn id(&self) -> ProviderId;

    /// Minimum spacing between requests to this provider.
    fn min_interval(&self) -> Duration;

    /// Whether quotes carry a meaningful 24h volume. Sources that cannot
    /// see volume are held to the liquidity floor only.
    fn reports_volume(&self) -> bool {
        true
    }

    /// Look up `symbol` (an uppercased base symbol) subject to `floors`.
    async fn search(&self, symbol: &str, floors: &QuoteFloors) -> PriceResult<Option<ProviderQuote>>;
}
