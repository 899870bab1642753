//! Main application orchestration.
//!
//! Builds the shared components once, then runs the scheduler, the
//! position monitor and the auxiliary loops until ctrl-c. Shutdown is
//! cooperative: the token is cancelled and every loop is given a bounded
//! time to finish its current step.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use arb_core::{ConfigSource, CooldownTable, NotificationSink, SafetyStatus, VenueClient};
use arb_persistence::{SnapshotStore, TradeHistoryWriter};
use arb_position::{
    PositionCloser, PositionConfig, PositionMonitor, PositionStore, PriceFallback, TradeExecutor,
    TradeLocks,
};
use arb_price::PriceResolver;
use arb_verify::{HoneypotChecker, SafetyChecker, StaticSafety, VerificationPipeline, VerifyConfig};
use chrono::Utc;
use futures_util::future::join_all;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::{AppConfig, ConfigHandle};
use crate::error::{AppError, AppResult};
use crate::loops::{self, OpportunitySelector};
use crate::notify::build_notifier;
use crate::paper::PaperVenue;
use crate::scheduler::WorkerPoolScheduler;
use crate::worker::ScanContext;

/// Trade history rows buffered before a write.
const TRADE_BUFFER_SIZE: usize = 1;

/// Main application.
pub struct Application {
    config: AppConfig,
    handle: Arc<ConfigHandle>,
    venue: Arc<dyn VenueClient>,
    store: Arc<PositionStore>,
    locks: Arc<TradeLocks>,
    history: Arc<Mutex<TradeHistoryWriter>>,
    notifier: Arc<dyn NotificationSink>,
    context: ScanContext,
}

impl Application {
    /// Build every component against the paper venue.
    pub fn new(
        mut config: AppConfig,
        config_path: Option<PathBuf>,
        paper_balance: Option<Decimal>,
    ) -> AppResult<Self> {
        if let Some(balance) = paper_balance {
            config.paper.initial_balance = balance;
        }
        config.validate()?;

        let venue: Arc<dyn VenueClient> = Arc::new(PaperVenue::new(
            config.paper.market_url.clone(),
            config.paper.initial_balance,
            Duration::from_secs(config.paper.timeout_secs),
        )?);
        Self::with_venue(config, config_path, venue)
    }

    /// Build every component against `venue`.
    pub fn with_venue(
        config: AppConfig,
        config_path: Option<PathBuf>,
        venue: Arc<dyn VenueClient>,
    ) -> AppResult<Self> {
        let handle = Arc::new(ConfigHandle::new(config_path, config.runtime()));
        let notifier = build_notifier(&config.notify)?;

        let resolver = Arc::new(PriceResolver::from_config(&config.resolver)?);
        let safety: Arc<dyn SafetyChecker> = if config.safety.enabled {
            Arc::new(HoneypotChecker::new(&config.safety)?)
        } else {
            warn!("Contract safety checks disabled");
            Arc::new(StaticSafety(SafetyStatus::Unknown))
        };

        let cooldowns = Arc::new(CooldownTable::new());
        let snapshot = Arc::new(SnapshotStore::new(&config.persistence.snapshot_path));
        let store = Arc::new(PositionStore::new(Arc::clone(&cooldowns), Some(snapshot)));
        let locks = Arc::new(TradeLocks::new());
        let history = Arc::new(Mutex::new(TradeHistoryWriter::new(
            &config.persistence.trades_dir,
            TRADE_BUFFER_SIZE,
        )));

        let verify_config: Arc<dyn ConfigSource<VerifyConfig>> = handle.clone();
        let position_config: Arc<dyn ConfigSource<PositionConfig>> = handle.clone();

        let pipeline = Arc::new(VerificationPipeline::new(
            Arc::clone(&resolver),
            Arc::clone(&venue),
            safety,
            cooldowns,
            verify_config,
        ));
        let executor = Arc::new(TradeExecutor::new(
            Arc::clone(&venue),
            Arc::clone(&store),
            Arc::clone(&locks),
            Arc::clone(&position_config),
            Arc::clone(&notifier),
        ));
        let closer = Arc::new(PositionCloser::new(
            Arc::clone(&venue),
            Arc::clone(&store),
            Arc::clone(&locks),
            Some(Arc::clone(&history)),
            Arc::clone(&notifier),
        ));
        let prices = Arc::new(PriceFallback::new(Arc::clone(&venue)));
        let monitor = Arc::new(PositionMonitor::new(
            Arc::clone(&store),
            closer,
            Arc::clone(&resolver),
            Arc::clone(&prices),
            position_config,
        ));

        let context = ScanContext {
            venue: Arc::clone(&venue),
            resolver,
            pipeline,
            executor,
            monitor,
            store: Arc::clone(&store),
            prices,
            config: Arc::clone(&handle),
        };

        Ok(Self {
            config,
            handle,
            venue,
            store,
            locks,
            history,
            notifier,
            context,
        })
    }

    pub fn store(&self) -> &Arc<PositionStore> {
        &self.store
    }

    pub fn context(&self) -> &ScanContext {
        &self.context
    }

    /// Restore state, discover symbols and run until ctrl-c.
    pub async fn run(self) -> AppResult<()> {
        let restored = self.store.restore(Utc::now())?;
        info!(restored, "Position table restored");

        let scheduler = Arc::new(WorkerPoolScheduler::new(
            Arc::new(self.context.clone()),
            Arc::clone(&self.venue),
            Arc::clone(&self.handle),
            Arc::clone(self.store.cooldowns()),
        ));
        let symbols = scheduler
            .refresh_symbols()
            .await
            .ok_or_else(|| AppError::Startup("No tradable symbols from venue".to_string()))?;
        info!(symbols = symbols.len(), "Symbol universe loaded");

        let venue = self.venue.as_ref();
        if let Err(e) = loops::reconcile_once(venue, &self.store, &self.locks, &self.handle).await {
            warn!(error = %e, "Startup reconciliation failed");
        }

        let cancel = CancellationToken::new();
        let handles = self.spawn_loops(scheduler, symbols, &cancel);
        info!(tasks = handles.len(), "Engine running");

        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received"),
            Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
        }
        cancel.cancel();

        let timeout = Duration::from_secs(self.config.telemetry.shutdown_timeout_secs);
        match tokio::time::timeout(timeout, join_all(handles)).await {
            Ok(results) => {
                for result in results.into_iter().filter_map(Result::err) {
                    error!(error = %result, "Loop ended abnormally");
                }
            }
            Err(_) => warn!(timeout_secs = timeout.as_secs(), "Shutdown timed out"),
        }

        self.history.lock().close()?;
        info!(open_positions = self.store.len(), "Shut down");
        Ok(())
    }

    fn spawn_loops(
        &self,
        scheduler: Arc<WorkerPoolScheduler>,
        symbols: Vec<String>,
        cancel: &CancellationToken,
    ) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        let token = cancel.clone();
        handles.push(tokio::spawn(async move {
            scheduler.run(symbols, token).await;
        }));

        handles.push(tokio::spawn(
            Arc::clone(&self.context.monitor).run(cancel.clone()),
        ));

        let selector = OpportunitySelector::new(
            Arc::clone(&self.store),
            Arc::clone(&self.handle),
            Arc::clone(&self.notifier),
        );
        handles.push(tokio::spawn(selector.run(cancel.clone())));

        handles.push(tokio::spawn(loops::run_reconciler(
            Arc::clone(&self.venue),
            Arc::clone(&self.store),
            Arc::clone(&self.locks),
            Arc::clone(&self.handle),
            cancel.clone(),
        )));

        handles.push(tokio::spawn(loops::run_balance_monitor(
            Arc::clone(&self.venue),
            Arc::clone(&self.locks),
            Arc::clone(&self.handle),
            self.config.telemetry.metrics_path.as_ref().map(PathBuf::from),
            cancel.clone(),
        )));

        handles.push(tokio::spawn(loops::run_config_reloader(
            Arc::clone(&self.handle),
            cancel.clone(),
        )));

        handles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arb_core::MockVenueClient;
    use tempfile::TempDir;

    fn sample_config(dir: &TempDir) -> AppConfig {
        let mut config = AppConfig::default();
        config.safety.enabled = false;
        config.persistence.snapshot_path = dir
            .path()
            .join("positions.json")
            .to_string_lossy()
            .into_owned();
        config.persistence.trades_dir = dir.path().join("trades").to_string_lossy().into_owned();
        config
    }

    #[tokio::test]
    async fn test_with_venue_builds_components() {
        let dir = TempDir::new().unwrap();
        let app =
            Application::with_venue(sample_config(&dir), None, Arc::new(MockVenueClient::new()))
                .unwrap();

        assert!(app.store().is_empty());
        assert_eq!(app.store().restore(Utc::now()).unwrap(), 0);
    }

    #[test]
    fn test_paper_balance_override() {
        let dir = TempDir::new().unwrap();
        let app = Application::new(sample_config(&dir), None, Some(Decimal::from(250))).unwrap();
        assert_eq!(app.config.paper.initial_balance, Decimal::from(250));
    }
}
