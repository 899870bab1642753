//! Fixed-interval exit loop over open positions.

use std::sync::Arc;

use arb_core::{ConfigSource, Position, Price, QuoteMode};
use arb_price::PriceResolver;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::closer::{CloseOutcome, PositionCloser};
use crate::config::PositionConfig;
use crate::exit::{evaluate_exit, ExitDecision};
use crate::price::PriceFallback;
use crate::store::PositionStore;

/// Re-prices open positions and drives closes.
///
/// [`PositionMonitor::check_position`] is also called by the scan workers,
/// so both paths share the same exit rules and closer.
pub struct PositionMonitor {
    store: Arc<PositionStore>,
    closer: Arc<PositionCloser>,
    resolver: Arc<PriceResolver>,
    prices: Arc<PriceFallback>,
    config: Arc<dyn ConfigSource<PositionConfig>>,
}

impl PositionMonitor {
    pub fn new(
        store: Arc<PositionStore>,
        closer: Arc<PositionCloser>,
        resolver: Arc<PriceResolver>,
        prices: Arc<PriceFallback>,
        config: Arc<dyn ConfigSource<PositionConfig>>,
    ) -> Self {
        Self {
            store,
            closer,
            resolver,
            prices,
            config,
        }
    }

    /// Run until `cancel` fires. The interval is re-read every tick.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        info!("Position monitor started");
        loop {
            let interval = self.config.current().monitor_interval();
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
            self.tick(&cancel).await;
        }
        info!("Position monitor stopped");
    }

    /// One pass over every open position.
    pub async fn tick(&self, cancel: &CancellationToken) -> usize {
        let mut closed = 0;
        for position in self.store.open_positions() {
            if cancel.is_cancelled() {
                break;
            }
            if let Some(CloseOutcome::Closed(_)) = self.check_position(&position.symbol).await {
                closed += 1;
            }
        }
        closed
    }

    /// Re-price one position and close it if an exit rule fires.
    ///
    /// Returns `None` when nothing was attempted.
    pub async fn check_position(&self, symbol: &str) -> Option<CloseOutcome> {
        if let Some(price) = self.prices.refresh(symbol).await {
            self.store.update_last_price(symbol, price);
        }
        let position = self.store.get(symbol).filter(Position::is_open)?;

        let Some(current) = self.prices.resolve(&position).await else {
            warn!(symbol, "No price available, skipping exit check");
            return None;
        };
        let spread = self.current_spread(symbol, current).await;

        let config = self.config.current();
        let ExitDecision {
            reason,
            pnl_pct,
            spread_pct,
        } = evaluate_exit(&position, current, spread, &config.exit, Utc::now())?;

        info!(
            symbol,
            %reason,
            pnl_pct = %pnl_pct.round_dp(2),
            spread_pct = ?spread_pct.map(|s| s.round_dp(3)),
            "Exit rule triggered"
        );
        Some(self.closer.close(symbol, reason, current).await)
    }

    async fn current_spread(&self, symbol: &str, current: Price) -> Option<Decimal> {
        match self.resolver.resolve(symbol, QuoteMode::Convergence).await {
            Ok(quote) => quote.price.pct_from(current),
            Err(e) => {
                debug!(symbol, error = %e, "No reference price for exit check");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arb_core::{
        FixedConfig, MockVenueClient, NotificationSink, ProviderId, ProviderQuote, Side,
        VenuePosition,
    };
    use arb_price::{PriceResult, QuoteFloors, QuoteProvider, ResolverConfig};
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    use crate::locks::TradeLocks;

    struct Silent;

    #[async_trait]
    impl NotificationSink for Silent {
        async fn notify(&self, _text: &str) -> bool {
            true
        }
    }

    struct FixedReference(Option<Decimal>);

    #[async_trait]
    impl QuoteProvider for FixedReference {
        fn id(&self) -> ProviderId {
            ProviderId::Aggregator
        }

        fn min_interval(&self) -> Duration {
            Duration::ZERO
        }

        async fn search(
            &self,
            _symbol: &str,
            _floors: &QuoteFloors,
        ) -> PriceResult<Option<ProviderQuote>> {
            Ok(self.0.map(|p| {
                ProviderQuote::new(
                    ProviderId::Aggregator,
                    Price::new(p),
                    dec!(100000),
                    dec!(100000),
                    "bsc",
                )
            }))
        }
    }

    fn sample_position() -> Position {
        Position::open(
            "FOO",
            Side::Long,
            Price::new(dec!(1.00)),
            dec!(5),
            10,
            dec!(3),
            Utc::now(),
            chrono::Duration::hours(4),
        )
    }

    fn monitor(
        venue: MockVenueClient,
        reference: Option<Decimal>,
    ) -> (PositionMonitor, Arc<PositionStore>) {
        let venue: Arc<dyn arb_core::VenueClient> = Arc::new(venue);
        let store = Arc::new(PositionStore::in_memory());
        let closer = Arc::new(PositionCloser::new(
            Arc::clone(&venue),
            Arc::clone(&store),
            Arc::new(TradeLocks::new()),
            None,
            Arc::new(Silent),
        ));
        let provider: Arc<dyn QuoteProvider> = Arc::new(FixedReference(reference));
        let resolver = Arc::new(PriceResolver::new(&ResolverConfig::default(), vec![provider]));
        let monitor = PositionMonitor::new(
            Arc::clone(&store),
            closer,
            resolver,
            Arc::new(PriceFallback::new(venue)),
            Arc::new(FixedConfig(PositionConfig::default())),
        );
        (monitor, store)
    }

    fn held() -> VenuePosition {
        VenuePosition {
            symbol: "FOO".to_string(),
            side: Side::Long,
            contracts: dec!(50),
            entry_price: Price::new(dec!(1)),
            margin_usd: dec!(5),
            leverage: 10,
        }
    }

    #[tokio::test]
    async fn test_take_profit_closes() {
        let mut venue = MockVenueClient::new();
        venue
            .expect_ticker()
            .returning(|_| Ok(Price::new(dec!(1.03))));
        venue
            .expect_list_open_positions()
            .returning(|| Ok(vec![held()]));
        venue
            .expect_close_position()
            .times(1)
            .returning(|_, _, _| Ok(true));

        let (monitor, store) = monitor(venue, Some(dec!(1.06)));
        store.insert_if_absent(sample_position());

        let outcome = monitor.check_position("FOO").await.unwrap();
        let CloseOutcome::Closed(record) = outcome else {
            panic!("expected close, got {outcome:?}");
        };
        assert_eq!(record.reason, "take_profit");
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_quiet_position_left_open() {
        let mut venue = MockVenueClient::new();
        venue
            .expect_ticker()
            .returning(|_| Ok(Price::new(dec!(1.01))));
        venue.expect_close_position().never();

        let (monitor, store) = monitor(venue, Some(dec!(1.04)));
        store.insert_if_absent(sample_position());

        assert!(monitor.check_position("FOO").await.is_none());
        assert_eq!(
            store.get("FOO").unwrap().last_price,
            Some(Price::new(dec!(1.01)))
        );
    }

    #[tokio::test]
    async fn test_tick_respects_cancellation() {
        let mut venue = MockVenueClient::new();
        venue.expect_ticker().never();

        let (monitor, store) = monitor(venue, None);
        store.insert_if_absent(sample_position());

        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(monitor.tick(&cancel).await, 0);
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let venue = MockVenueClient::new();
        let (monitor, _store) = monitor(venue, None);
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(Arc::new(monitor).run(cancel.clone()));
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
