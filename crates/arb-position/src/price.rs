//! Current-price lookup for held positions.
//!
//! Fallback chain: the price embedded in the position, then the live
//! ticker, then the last price this process saw for the symbol.

use std::sync::Arc;

use arb_core::{Position, Price, VenueClient};
use dashmap::DashMap;
use tracing::debug;

/// Live ticker with a last-known-price cache.
pub struct PriceFallback {
    venue: Arc<dyn VenueClient>,
    last_known: DashMap<String, Price>,
}

impl PriceFallback {
    pub fn new(venue: Arc<dyn VenueClient>) -> Self {
        Self {
            venue,
            last_known: DashMap::new(),
        }
    }

    /// Fetch the live ticker and remember it. `None` on failure.
    pub async fn refresh(&self, symbol: &str) -> Option<Price> {
        match self.venue.ticker(symbol).await {
            Ok(price) if price.is_positive() => {
                self.last_known.insert(symbol.to_string(), price);
                Some(price)
            }
            Ok(price) => {
                debug!(symbol, %price, "Ignoring non-positive ticker");
                None
            }
            Err(e) => {
                debug!(symbol, error = %e, "Ticker unavailable");
                None
            }
        }
    }

    /// Best available price for `position`.
    pub async fn resolve(&self, position: &Position) -> Option<Price> {
        if let Some(price) = position.last_price.filter(|p| p.is_positive()) {
            return Some(price);
        }
        if let Some(price) = self.refresh(&position.symbol).await {
            return Some(price);
        }
        self.cached(&position.symbol)
    }

    pub fn cached(&self, symbol: &str) -> Option<Price> {
        self.last_known.get(symbol).map(|p| *p)
    }

    /// Record a price seen elsewhere (e.g. by a scan task).
    pub fn observe(&self, symbol: &str, price: Price) {
        if price.is_positive() {
            self.last_known.insert(symbol.to_string(), price);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arb_core::{CoreError, MockVenueClient, Side};
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sample_position(last_price: Option<Price>) -> Position {
        let mut pos = Position::open(
            "FOO",
            Side::Long,
            Price::new(dec!(1)),
            dec!(5),
            10,
            dec!(3),
            Utc::now(),
            Duration::hours(1),
        );
        pos.last_price = last_price;
        pos
    }

    #[tokio::test]
    async fn test_embedded_price_first() {
        let mut venue = MockVenueClient::new();
        venue.expect_ticker().never();
        let prices = PriceFallback::new(Arc::new(venue));

        let pos = sample_position(Some(Price::new(dec!(1.02))));
        assert_eq!(prices.resolve(&pos).await, Some(Price::new(dec!(1.02))));
    }

    #[tokio::test]
    async fn test_ticker_then_cache() {
        let calls = AtomicUsize::new(0);
        let mut venue = MockVenueClient::new();
        venue.expect_ticker().returning(move |_| {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(Price::new(dec!(1.05)))
            } else {
                Err(CoreError::Timeout("ticker".to_string()))
            }
        });
        let prices = PriceFallback::new(Arc::new(venue));

        let pos = sample_position(None);
        assert_eq!(prices.resolve(&pos).await, Some(Price::new(dec!(1.05))));
        // Ticker now fails, cached value is used.
        assert_eq!(prices.resolve(&pos).await, Some(Price::new(dec!(1.05))));
    }

    #[tokio::test]
    async fn test_nothing_available() {
        let mut venue = MockVenueClient::new();
        venue
            .expect_ticker()
            .returning(|_| Err(CoreError::Venue("down".to_string())));
        let prices = PriceFallback::new(Arc::new(venue));

        assert_eq!(prices.resolve(&sample_position(None)).await, None);
    }
}
