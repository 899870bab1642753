//! Auxiliary loops sharing the shutdown token: best-opportunity selector,
//! venue reconciliation, balance monitor and config reloader.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use arb_core::{notify_detached, Balance, CooldownTable, NotificationSink, Opportunity, VenueClient};
use arb_position::{PositionStore, Reconciled, TradeLocks};
use arb_telemetry::Metrics;
use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ConfigHandle;
use crate::error::AppResult;

/// Call `tick` every `period()` until `cancel` fires. The period is
/// re-read before every sleep.
pub async fn every<P, F, Fut>(name: &'static str, cancel: CancellationToken, period: P, mut tick: F)
where
    P: Fn() -> Duration,
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    debug!(task = name, "Loop started");
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(period()) => {}
        }
        tick().await;
    }
    debug!(task = name, "Loop stopped");
}

// ============================================================================
// Best-opportunity selector
// ============================================================================

/// Drains the opportunity table and announces the single best entry.
pub struct OpportunitySelector {
    store: Arc<PositionStore>,
    config: Arc<ConfigHandle>,
    notifier: Arc<dyn NotificationSink>,
    announced: CooldownTable,
}

impl OpportunitySelector {
    pub fn new(
        store: Arc<PositionStore>,
        config: Arc<ConfigHandle>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            store,
            config,
            notifier,
            announced: CooldownTable::new(),
        }
    }

    /// Returns the opportunity announced, if any.
    pub fn select(&self) -> Option<Opportunity> {
        let best = self.store.drain_best_opportunity()?;
        Metrics::best_opportunity(best.score.to_f64().unwrap_or_default());

        let cooldown = self.config.notify().cooldown();
        let now = Utc::now();
        if self.announced.is_cooling(&best.symbol, cooldown, now) {
            debug!(symbol = %best.symbol, "Best opportunity already announced");
            return None;
        }
        self.announced.record(&best.symbol, now);
        self.announced.prune(cooldown, now);

        info!(
            symbol = %best.symbol,
            side = %best.side,
            spread_pct = %best.spread_pct.round_dp(3),
            score = %best.score.round_dp(1),
            "Best opportunity"
        );
        notify_detached(
            &self.notifier,
            format!(
                "BEST {} {} | spread {:.2}% | home {} ref {} | liq ${:.0} vol ${:.0}",
                best.side,
                best.symbol,
                best.spread_pct,
                best.home_price,
                best.reference_price,
                best.liquidity_usd,
                best.volume_24h_usd
            ),
        );
        Some(best)
    }

    pub async fn run(self, cancel: CancellationToken) {
        let selector = &self;
        every(
            "selector",
            cancel,
            move || Duration::from_secs(selector.config.scanner().selector_interval_secs),
            move || async move {
                selector.select();
            },
        )
        .await;
    }
}

// ============================================================================
// Reconciliation
// ============================================================================

/// Align the store with the venue's open positions.
///
/// Runs under the order lock so an entry in flight is either already in
/// the store or already in the listing.
pub async fn reconcile_once(
    venue: &dyn VenueClient,
    store: &PositionStore,
    locks: &TradeLocks,
    config: &ConfigHandle,
) -> AppResult<Reconciled> {
    let max_age = config.runtime().position.trading.max_age();
    let _order = locks.order.lock().await;
    let held = venue.list_open_positions().await?;
    let result = store.reconcile(&held, Utc::now(), max_age);
    if result.is_empty() {
        debug!(venue_positions = held.len(), "Reconciliation found nothing new");
    }
    Ok(result)
}

pub async fn run_reconciler(
    venue: Arc<dyn VenueClient>,
    store: Arc<PositionStore>,
    locks: Arc<TradeLocks>,
    config: Arc<ConfigHandle>,
    cancel: CancellationToken,
) {
    let (venue, store, locks, config) =
        (venue.as_ref(), store.as_ref(), locks.as_ref(), config.as_ref());
    every(
        "reconciler",
        cancel,
        move || Duration::from_secs(config.scanner().reconcile_interval_secs),
        move || async move {
            if let Err(e) = reconcile_once(venue, store, locks, config).await {
                warn!(error = %e, "Reconciliation failed");
            }
        },
    )
    .await;
}

// ============================================================================
// Balance monitor
// ============================================================================

/// Fetch the balance under the balance lock and export it.
pub async fn balance_once(
    venue: &dyn VenueClient,
    locks: &TradeLocks,
    metrics_path: Option<&Path>,
) -> AppResult<Balance> {
    let balance = {
        let _guard = locks.balance.lock().await;
        venue.balance().await?
    };
    Metrics::balance(
        balance.total.to_f64().unwrap_or_default(),
        balance.free.to_f64().unwrap_or_default(),
        balance.used.to_f64().unwrap_or_default(),
    );
    info!(
        total = %balance.total.round_dp(2),
        free = %balance.free.round_dp(2),
        used = %balance.used.round_dp(2),
        "Balance"
    );

    if let Some(path) = metrics_path {
        write_metrics(path)?;
    }
    Ok(balance)
}

/// Rewrite the metrics text file via temp file and rename.
pub fn write_metrics(path: &Path) -> AppResult<()> {
    let text = Metrics::render()?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let tmp = path.with_extension("prom.tmp");
    std::fs::write(&tmp, text)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

pub async fn run_balance_monitor(
    venue: Arc<dyn VenueClient>,
    locks: Arc<TradeLocks>,
    config: Arc<ConfigHandle>,
    metrics_path: Option<PathBuf>,
    cancel: CancellationToken,
) {
    let (venue, locks, config) = (venue.as_ref(), locks.as_ref(), config.as_ref());
    let metrics_path = metrics_path.as_deref();
    every(
        "balance",
        cancel,
        move || Duration::from_secs(config.scanner().balance_interval_secs),
        move || async move {
            if let Err(e) = balance_once(venue, locks, metrics_path).await {
                warn!(error = %e, "Balance check failed");
            }
        },
    )
    .await;
}

// ============================================================================
// Config reloader
// ============================================================================

pub async fn run_config_reloader(config: Arc<ConfigHandle>, cancel: CancellationToken) {
    let config = config.as_ref();
    every(
        "config_reloader",
        cancel,
        move || Duration::from_secs(config.scanner().config_poll_secs.max(1)),
        move || async move {
            // Rejections are logged by the handle.
            let _ = config.reload_if_changed();
        },
    )
    .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use arb_core::{MockVenueClient, Position, Price, Side, VenuePosition};
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingSink(AtomicUsize);

    #[async_trait]
    impl NotificationSink for CountingSink {
        async fn notify(&self, _text: &str) -> bool {
            self.0.fetch_add(1, Ordering::SeqCst);
            true
        }
    }

    fn sample_opportunity(symbol: &str, spread: rust_decimal::Decimal) -> Opportunity {
        Opportunity::new(
            symbol,
            Price::new(dec!(1)),
            Price::new(dec!(1) + spread / dec!(100)),
            dec!(50000),
            dec!(100000),
            Utc::now(),
        )
        .unwrap()
    }

    // ========================================================================
    // Selector
    // ========================================================================

    #[tokio::test]
    async fn test_selector_picks_best_and_suppresses_repeat() {
        let store = Arc::new(PositionStore::in_memory());
        let sink = Arc::new(CountingSink::default());
        let selector = OpportunitySelector::new(
            Arc::clone(&store),
            Arc::new(ConfigHandle::fixed(RuntimeConfig::default())),
            sink.clone(),
        );

        store.record_opportunity(sample_opportunity("FOO", dec!(2)));
        store.record_opportunity(sample_opportunity("BAR", dec!(4)));
        let best = selector.select().unwrap();
        assert_eq!(best.symbol, "BAR");
        assert_eq!(store.opportunity_count(), 0);

        store.record_opportunity(sample_opportunity("BAR", dec!(5)));
        assert!(selector.select().is_none());
        assert!(selector.select().is_none());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(sink.0.load(Ordering::SeqCst), 1);
    }

    // ========================================================================
    // Reconciliation and balance
    // ========================================================================

    #[tokio::test]
    async fn test_reconcile_adopts_unknown_positions() {
        let mut venue = MockVenueClient::new();
        venue.expect_list_open_positions().returning(|| {
            Ok(vec![VenuePosition {
                symbol: "FOO".to_string(),
                side: Side::Short,
                contracts: dec!(10),
                entry_price: Price::new(dec!(2)),
                margin_usd: dec!(5),
                leverage: 10,
            }])
        });
        let store = PositionStore::in_memory();
        let locks = TradeLocks::new();
        let config = ConfigHandle::fixed(RuntimeConfig::default());

        let result = reconcile_once(&venue, &store, &locks, &config).await.unwrap();
        assert_eq!(result.adopted, vec!["FOO".to_string()]);
        assert_eq!(store.get("FOO").unwrap().side, Side::Short);

        let again = reconcile_once(&venue, &store, &locks, &config).await.unwrap();
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn test_reconcile_drops_positions_venue_no_longer_holds() {
        let mut venue = MockVenueClient::new();
        venue.expect_list_open_positions().returning(|| Ok(vec![]));
        let store = PositionStore::in_memory();
        store.insert_if_absent(Position::open(
            "BAR",
            Side::Long,
            Price::new(dec!(1)),
            dec!(5),
            10,
            dec!(3),
            Utc::now(),
            chrono::Duration::hours(4),
        ));
        let config = ConfigHandle::fixed(RuntimeConfig::default());

        let result = reconcile_once(&venue, &store, &TradeLocks::new(), &config)
            .await
            .unwrap();
        assert_eq!(result.dropped, vec!["BAR".to_string()]);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_failed_listing_keeps_positions() {
        let mut venue = MockVenueClient::new();
        venue
            .expect_list_open_positions()
            .returning(|| Err(arb_core::CoreError::Timeout("positions".to_string())));
        let store = PositionStore::in_memory();
        store.insert_if_absent(Position::open(
            "BAR",
            Side::Long,
            Price::new(dec!(1)),
            dec!(5),
            10,
            dec!(3),
            Utc::now(),
            chrono::Duration::hours(4),
        ));
        let config = ConfigHandle::fixed(RuntimeConfig::default());

        assert!(reconcile_once(&venue, &store, &TradeLocks::new(), &config)
            .await
            .is_err());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_balance_writes_metrics_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("metrics/arb.prom");
        let mut venue = MockVenueClient::new();
        venue.expect_balance().returning(|| {
            Ok(Balance {
                total: dec!(100),
                free: dec!(80),
                used: dec!(20),
            })
        });

        let balance = balance_once(&venue, &TradeLocks::new(), Some(path.as_path()))
            .await
            .unwrap();
        assert_eq!(balance.free, dec!(80));

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("arb_"));
    }

    #[tokio::test]
    async fn test_every_stops_on_cancel() {
        let cancel = CancellationToken::new();
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        let handle = tokio::spawn(every(
            "test",
            cancel.clone(),
            || Duration::from_millis(5),
            move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            },
        ));

        tokio::time::sleep(Duration::from_millis(40)).await;
        cancel.cancel();
        handle.await.unwrap();
        assert!(ticks.load(Ordering::SeqCst) >= 1);
    }
}
