//! Entry and averaging order placement.
//!
//! Both paths hold the order lock from the balance check to the store
//! update, so at most one order is in flight at a time.

use std::sync::Arc;

use arb_core::{
    notify_detached, ConfigSource, NotificationSink, Opportunity, Position, Price, Side,
    VenueClient,
};
use arb_telemetry::Metrics;
use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};

use crate::averaging::{check_averaging, AveragingSkip};
use crate::config::PositionConfig;
use crate::error::PositionResult;
use crate::locks::TradeLocks;
use crate::store::PositionStore;

/// Why an entry was not placed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntrySkip {
    AlreadyOpen,
    MaxPositions { open: usize },
    InsufficientBalance { free: Decimal },
    ThinBook { depth_usd: Decimal },
    Declined,
}

/// Result of an entry attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum EntryOutcome {
    Opened(Position),
    Skipped(EntrySkip),
    /// The venue filled but another path created the position first.
    /// Reconciliation picks it up.
    Orphaned,
}

/// Result of an averaging attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum AveragingOutcome {
    Added(Position),
    Skipped(AveragingSkip),
}

/// Places entry and averaging orders.
pub struct TradeExecutor {
    venue: Arc<dyn VenueClient>,
    store: Arc<PositionStore>,
    locks: Arc<TradeLocks>,
    config: Arc<dyn ConfigSource<PositionConfig>>,
    notifier: Arc<dyn NotificationSink>,
}

impl TradeExecutor {
    pub fn new(
        venue: Arc<dyn VenueClient>,
        store: Arc<PositionStore>,
        locks: Arc<TradeLocks>,
        config: Arc<dyn ConfigSource<PositionConfig>>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            venue,
            store,
            locks,
            config,
            notifier,
        }
    }

    // =========================================================================
    // Entry
    // =========================================================================

    /// Open a position for a verified opportunity.
    pub async fn open_position(
        &self,
        opportunity: &Opportunity,
        reference_url: Option<String>,
    ) -> PositionResult<EntryOutcome> {
        let config = self.config.current();
        let trading = &config.trading;
        let symbol = opportunity.symbol.as_str();
        let side = opportunity.side;

        let _order = self.locks.order.lock().await;

        if self.store.contains(symbol) {
            return Ok(EntryOutcome::Skipped(EntrySkip::AlreadyOpen));
        }
        let open = self.store.len();
        if open >= trading.max_open_positions {
            return Ok(EntryOutcome::Skipped(EntrySkip::MaxPositions { open }));
        }

        let free = self.free_balance().await?;
        if free < trading.order_amount_usd {
            debug!(symbol, %free, "Insufficient balance for entry");
            return Ok(EntryOutcome::Skipped(EntrySkip::InsufficientBalance { free }));
        }

        let depth_usd = self.book_depth(symbol, side, trading.depth_levels).await?;
        if depth_usd < trading.required_depth_usd() {
            debug!(symbol, %depth_usd, required = %trading.required_depth_usd(), "Book too thin for entry");
            return Ok(EntryOutcome::Skipped(EntrySkip::ThinBook { depth_usd }));
        }

        self.set_leverage(symbol, trading.leverage).await;

        let ack = match self
            .venue
            .open_market(symbol, side, trading.order_amount_usd, trading.leverage)
            .await
        {
            Ok(Some(ack)) => {
                Metrics::order("entry", true);
                ack
            }
            Ok(None) => {
                Metrics::order("entry", false);
                warn!(symbol, %side, "Entry order declined");
                return Ok(EntryOutcome::Skipped(EntrySkip::Declined));
            }
            Err(e) => {
                Metrics::order("entry", false);
                error!(symbol, %side, error = %e, "Entry order failed");
                return Err(e.into());
            }
        };

        let fill = ack.fill_price.unwrap_or(opportunity.home_price);
        let mut position = Position::open(
            symbol,
            side,
            fill,
            trading.order_amount_usd,
            trading.leverage,
            opportunity.spread_pct,
            Utc::now(),
            trading.max_age(),
        );
        position.reference_url = reference_url;

        if !self.store.insert_if_absent(position.clone()) {
            warn!(symbol, order_id = %ack.order_id, "Entry filled but position already exists, leaving for reconciliation");
            return Ok(EntryOutcome::Orphaned);
        }

        info!(
            symbol,
            %side,
            entry = %fill,
            spread_pct = %opportunity.spread_pct,
            margin = %trading.order_amount_usd,
            leverage = trading.leverage,
            order_id = %ack.order_id,
            "Position opened"
        );
        notify_detached(&self.notifier, entry_message(&position));
        Ok(EntryOutcome::Opened(position))
    }

    // =========================================================================
    // Averaging
    // =========================================================================

    /// Add to an existing position if every averaging condition holds.
    pub async fn average(
        &self,
        symbol: &str,
        current: Price,
        indicated_side: Side,
    ) -> PositionResult<AveragingOutcome> {
        let config = self.config.current();

        let Some(position) = self.store.get(symbol) else {
            return Ok(AveragingOutcome::Skipped(AveragingSkip::NotOpen));
        };
        if let Err(skip) = check_averaging(&position, current, indicated_side, &config, Utc::now())
        {
            return Ok(AveragingOutcome::Skipped(skip));
        }

        let _order = self.locks.order.lock().await;

        // Re-check under the lock; a close or another add may have landed.
        let Some(position) = self.store.get(symbol) else {
            return Ok(AveragingOutcome::Skipped(AveragingSkip::NotOpen));
        };
        let add = match check_averaging(&position, current, indicated_side, &config, Utc::now()) {
            Ok(add) => add,
            Err(skip) => return Ok(AveragingOutcome::Skipped(skip)),
        };

        let free = self.free_balance().await?;
        if free < add {
            return Ok(AveragingOutcome::Skipped(
                AveragingSkip::InsufficientBalance { free },
            ));
        }

        let depth_usd = self
            .book_depth(symbol, position.side, config.trading.depth_levels)
            .await?;
        if depth_usd < config.trading.required_depth_usd() {
            return Ok(AveragingOutcome::Skipped(AveragingSkip::ThinBook {
                depth_usd,
            }));
        }

        let ack = match self
            .venue
            .open_market(symbol, position.side, add, position.leverage)
            .await
        {
            Ok(Some(ack)) => {
                Metrics::order("average", true);
                ack
            }
            Ok(None) => {
                Metrics::order("average", false);
                return Ok(AveragingOutcome::Skipped(AveragingSkip::Declined));
            }
            Err(e) => {
                Metrics::order("average", false);
                error!(symbol, error = %e, "Averaging order failed");
                return Err(e.into());
            }
        };

        let fill = ack.fill_price.unwrap_or(current);
        let Some(updated) = self.store.apply_add(symbol, fill, add, Utc::now()) else {
            warn!(symbol, order_id = %ack.order_id, "Averaging filled but position is no longer open");
            return Ok(AveragingOutcome::Skipped(AveragingSkip::NotOpen));
        };

        info!(
            symbol,
            fill = %fill,
            avg_entry = %updated.avg_entry,
            size = %updated.size_notional,
            adds_done = updated.adds_done,
            "Position averaged"
        );
        notify_detached(
            &self.notifier,
            format!(
                "AVERAGE {} {} @ {} | avg {} | size ${} | adds {}",
                updated.side,
                symbol,
                fill,
                updated.avg_entry,
                updated.size_notional,
                updated.adds_done
            ),
        );
        Ok(AveragingOutcome::Added(updated))
    }

    // =========================================================================
    // Venue helpers
    // =========================================================================

    async fn free_balance(&self) -> PositionResult<Decimal> {
        let _balance = self.locks.balance.lock().await;
        let balance = self.venue.balance().await?;
        Ok(balance.free)
    }

    async fn book_depth(&self, symbol: &str, side: Side, levels: usize) -> PositionResult<Decimal> {
        let book = self.venue.order_book(symbol, levels).await?;
        Ok(book.depth_notional(side, levels))
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) {
        if let Err(e) = self.venue.set_leverage(symbol, leverage).await {
            warn!(symbol, leverage, error = %e, "Failed to set leverage, continuing");
        }
    }
}

fn entry_message(position: &Position) -> String {
    let mut text = format!(
        "OPEN {} {} @ {} | spread {:.2}% | ${} x{}",
        position.side,
        position.symbol,
        position.avg_entry,
        position.entry_spread_pct,
        position.size_notional,
        position.leverage
    );
    if let Some(url) = &position.reference_url {
        text.push_str(&format!(" | {url}"));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use arb_core::{Balance, BookLevel, FixedConfig, MockVenueClient, OrderAck, OrderBook};
    use async_trait::async_trait;
    use rust_decimal_macros::dec;

    struct Silent;

    #[async_trait]
    impl NotificationSink for Silent {
        async fn notify(&self, _text: &str) -> bool {
            true
        }
    }

    fn sample_book() -> OrderBook {
        let level = BookLevel::new(Price::new(dec!(1)), dec!(1000));
        OrderBook {
            bids: vec![level],
            asks: vec![level],
        }
    }

    fn sample_opportunity() -> Opportunity {
        Opportunity::new(
            "FOO",
            Price::new(dec!(1.00)),
            Price::new(dec!(1.03)),
            dec!(50000),
            dec!(50000),
            Utc::now(),
        )
        .unwrap()
    }

    fn funded_venue(free: Decimal) -> MockVenueClient {
        let mut venue = MockVenueClient::new();
        venue.expect_balance().returning(move || {
            Ok(Balance {
                total: free,
                free,
                used: Decimal::ZERO,
            })
        });
        venue.expect_order_book().returning(|_, _| Ok(sample_book()));
        venue.expect_set_leverage().returning(|_, _| Ok(()));
        venue
    }

    fn executor(venue: MockVenueClient, store: Arc<PositionStore>) -> TradeExecutor {
        TradeExecutor::new(
            Arc::new(venue),
            store,
            Arc::new(TradeLocks::new()),
            Arc::new(FixedConfig(PositionConfig::default())),
            Arc::new(Silent),
        )
    }

    fn ack(side: Side, margin: Decimal, fill: Decimal) -> OrderAck {
        OrderAck {
            order_id: "o-1".to_string(),
            symbol: "FOO".to_string(),
            side,
            fill_price: Some(Price::new(fill)),
            margin_usd: margin,
            leverage: 10,
        }
    }

    // ========================================================================
    // Entry
    // ========================================================================

    #[tokio::test]
    async fn test_open_sets_timers_once() {
        let mut venue = funded_venue(dec!(100));
        venue
            .expect_open_market()
            .times(1)
            .returning(|_, side, margin, _| Ok(Some(ack(side, margin, dec!(1.00)))));
        let store = Arc::new(PositionStore::in_memory());
        let exec = executor(venue, Arc::clone(&store));

        let outcome = exec
            .open_position(&sample_opportunity(), Some("https://x/pair".to_string()))
            .await
            .unwrap();
        let EntryOutcome::Opened(pos) = outcome else {
            panic!("expected open, got {outcome:?}");
        };
        assert_eq!(pos.side, Side::Long);
        assert_eq!(pos.expires_at, pos.opened_at + chrono::Duration::hours(4));
        assert_eq!(store.get("FOO").unwrap(), pos);

        // Second entry for the same symbol is refused before any order.
        let again = exec
            .open_position(&sample_opportunity(), None)
            .await
            .unwrap();
        assert_eq!(again, EntryOutcome::Skipped(EntrySkip::AlreadyOpen));
    }

    #[tokio::test]
    async fn test_insufficient_balance_skips() {
        let mut venue = funded_venue(dec!(2));
        venue.expect_open_market().never();
        let exec = executor(venue, Arc::new(PositionStore::in_memory()));

        let outcome = exec
            .open_position(&sample_opportunity(), None)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            EntryOutcome::Skipped(EntrySkip::InsufficientBalance { free: dec!(2) })
        );
    }

    #[tokio::test]
    async fn test_thin_book_skips() {
        let mut venue = MockVenueClient::new();
        venue.expect_balance().returning(|| {
            Ok(Balance {
                total: dec!(100),
                free: dec!(100),
                used: Decimal::ZERO,
            })
        });
        venue.expect_order_book().returning(|_, _| {
            Ok(OrderBook {
                bids: vec![],
                asks: vec![BookLevel::new(Price::new(dec!(1)), dec!(10))],
            })
        });
        venue.expect_open_market().never();
        let exec = executor(venue, Arc::new(PositionStore::in_memory()));

        let outcome = exec
            .open_position(&sample_opportunity(), None)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            EntryOutcome::Skipped(EntrySkip::ThinBook { depth_usd: dec!(10) })
        );
    }

    #[tokio::test]
    async fn test_leverage_failure_does_not_block() {
        let mut venue = MockVenueClient::new();
        venue.expect_balance().returning(|| {
            Ok(Balance {
                total: dec!(100),
                free: dec!(100),
                used: Decimal::ZERO,
            })
        });
        venue.expect_order_book().returning(|_, _| Ok(sample_book()));
        venue
            .expect_set_leverage()
            .returning(|_, _| Err(arb_core::CoreError::Venue("nope".to_string())));
        venue
            .expect_open_market()
            .times(1)
            .returning(|_, side, margin, _| Ok(Some(ack(side, margin, dec!(1.00)))));
        let exec = executor(venue, Arc::new(PositionStore::in_memory()));

        let outcome = exec
            .open_position(&sample_opportunity(), None)
            .await
            .unwrap();
        assert!(matches!(outcome, EntryOutcome::Opened(_)));
    }

    // ========================================================================
    // Averaging
    // ========================================================================

    #[tokio::test]
    async fn test_average_updates_entry() {
        let mut venue = funded_venue(dec!(100));
        venue
            .expect_open_market()
            .times(1)
            .returning(|_, side, margin, _| Ok(Some(ack(side, margin, dec!(0.95)))));
        let store = Arc::new(PositionStore::in_memory());
        let original = Position::open(
            "FOO",
            Side::Long,
            Price::new(dec!(1.00)),
            dec!(5),
            10,
            dec!(3),
            Utc::now(),
            chrono::Duration::hours(4),
        );
        store.insert_if_absent(original.clone());
        let exec = executor(venue, Arc::clone(&store));

        let outcome = exec
            .average("FOO", Price::new(dec!(0.95)), Side::Long)
            .await
            .unwrap();
        let AveragingOutcome::Added(pos) = outcome else {
            panic!("expected add, got {outcome:?}");
        };
        assert_eq!(pos.avg_entry, Price::new(dec!(0.975)));
        assert_eq!(pos.size_notional, dec!(10));
        assert_eq!(pos.adds_done, 1);
        assert_eq!(pos.opened_at, original.opened_at);
        assert_eq!(pos.expires_at, original.expires_at);
    }

    #[tokio::test]
    async fn test_average_without_position() {
        let mut venue = MockVenueClient::new();
        venue.expect_open_market().never();
        let exec = executor(venue, Arc::new(PositionStore::in_memory()));

        let outcome = exec
            .average("FOO", Price::new(dec!(0.95)), Side::Long)
            .await
            .unwrap();
        assert_eq!(outcome, AveragingOutcome::Skipped(AveragingSkip::NotOpen));
    }
}
