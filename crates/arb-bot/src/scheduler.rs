//! Wave-based worker pool over the symbol universe.
//!
//! A cycle splits the symbols into waves of at most `max_concurrent`
//! tasks. Each wave is joined in full before the next starts, with a
//! pause between waves and a longer pause between cycles. A task that
//! panics is reported and never takes the wave down with it.

use std::sync::Arc;
use std::time::Instant;

use arb_core::{CooldownTable, VenueClient};
use arb_telemetry::Metrics;
use async_trait::async_trait;
use chrono::Utc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ConfigHandle;
use crate::worker::ScanOutcome;

/// Unit of work run once per symbol per cycle.
#[async_trait]
pub trait ScanTask: Send + Sync + 'static {
    async fn scan(&self, symbol: &str) -> ScanOutcome;
}

/// Counts for one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleStats {
    pub waves: usize,
    pub scanned: usize,
    /// Tasks that panicked or were cancelled.
    pub failed: usize,
}

pub struct WorkerPoolScheduler {
    task: Arc<dyn ScanTask>,
    venue: Arc<dyn VenueClient>,
    config: Arc<ConfigHandle>,
    cooldowns: Arc<CooldownTable>,
}

impl WorkerPoolScheduler {
    pub fn new(
        task: Arc<dyn ScanTask>,
        venue: Arc<dyn VenueClient>,
        config: Arc<ConfigHandle>,
        cooldowns: Arc<CooldownTable>,
    ) -> Self {
        Self {
            task,
            venue,
            config,
            cooldowns,
        }
    }

    /// Run cycles until `cancel` fires, starting from `symbols`.
    pub async fn run(&self, mut symbols: Vec<String>, cancel: CancellationToken) {
        info!(symbols = symbols.len(), "Scheduler started");
        let mut cycle = 0u64;

        while !cancel.is_cancelled() {
            cycle += 1;
            let stats = self.run_cycle(&symbols, &cancel).await;
            info!(
                cycle,
                waves = stats.waves,
                scanned = stats.scanned,
                failed = stats.failed,
                "Cycle complete"
            );

            let verify_cooldown = self.config.runtime().verify.cooldown();
            self.cooldowns.prune(verify_cooldown, Utc::now());

            let pause = self.config.scanner().cycle_pause();
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(pause) => {}
            }

            if let Some(fresh) = self.refresh_symbols().await {
                symbols = fresh;
            }
        }
        info!(cycle, "Scheduler stopped");
    }

    /// One pass over `symbols` in waves.
    pub async fn run_cycle(&self, symbols: &[String], cancel: &CancellationToken) -> CycleStats {
        let mut stats = CycleStats::default();
        let scanner = self.config.scanner();
        let waves: Vec<&[String]> = symbols.chunks(scanner.max_concurrent.max(1)).collect();
        let total = waves.len();

        for (index, wave) in waves.into_iter().enumerate() {
            if cancel.is_cancelled() {
                break;
            }
            let started = Instant::now();
            let (scanned, failed) = self.run_wave(wave, cancel).await;
            Metrics::wave_duration(started.elapsed().as_secs_f64() * 1000.0);
            stats.waves += 1;
            stats.scanned += scanned;
            stats.failed += failed;
            debug!(wave = index + 1, of = total, scanned, failed, "Wave joined");

            if index + 1 < total {
                // Re-read so a reload applies from the next wave.
                let pause = self.config.scanner().wave_pause();
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(pause) => {}
                }
            }
        }
        stats
    }

    async fn run_wave(&self, wave: &[String], cancel: &CancellationToken) -> (usize, usize) {
        let mut set = JoinSet::new();
        for symbol in wave {
            if cancel.is_cancelled() {
                break;
            }
            let task = Arc::clone(&self.task);
            let symbol = symbol.clone();
            set.spawn(async move { task.scan(&symbol).await });
        }

        let mut scanned = 0;
        let mut failed = 0;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(outcome) => {
                    Metrics::symbol_scan(outcome.as_str());
                    scanned += 1;
                }
                Err(e) => {
                    Metrics::task_failure();
                    error!(error = %e, "Scan task failed");
                    failed += 1;
                }
            }
        }
        (scanned, failed)
    }

    /// Configured symbols, or the venue universe. `None` keeps the
    /// current list.
    pub async fn refresh_symbols(&self) -> Option<Vec<String>> {
        let configured = self.config.scanner().symbols;
        if !configured.is_empty() {
            return Some(configured);
        }
        match self.venue.symbols().await {
            Ok(symbols) if !symbols.is_empty() => Some(symbols),
            Ok(_) => {
                warn!("Venue returned no symbols, keeping previous list");
                None
            }
            Err(e) => {
                warn!(error = %e, "Symbol refresh failed, keeping previous list");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use arb_core::MockVenueClient;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Counts calls and tracks the peak number running at once.
    #[derive(Default)]
    struct CountingTask {
        calls: AtomicUsize,
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl ScanTask for CountingTask {
        async fn scan(&self, symbol: &str) -> ScanOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            if symbol == "PANIC" {
                panic!("scan blew up");
            }
            ScanOutcome::Candidate
        }
    }

    fn sample_symbols(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("SYM{i}")).collect()
    }

    fn scheduler(task: Arc<CountingTask>, max_concurrent: usize) -> WorkerPoolScheduler {
        let mut runtime = RuntimeConfig::default();
        runtime.scanner.max_concurrent = max_concurrent;
        runtime.scanner.wave_pause_secs = 0;
        WorkerPoolScheduler::new(
            task,
            Arc::new(MockVenueClient::new()),
            Arc::new(ConfigHandle::fixed(runtime)),
            Arc::new(CooldownTable::new()),
        )
    }

    // ========================================================================
    // Waves
    // ========================================================================

    #[tokio::test]
    async fn test_cycle_splits_into_waves() {
        let task = Arc::new(CountingTask::default());
        let scheduler = scheduler(Arc::clone(&task), 3);

        let stats = scheduler
            .run_cycle(&sample_symbols(7), &CancellationToken::new())
            .await;

        assert_eq!(stats.waves, 3);
        assert_eq!(stats.scanned, 7);
        assert_eq!(task.calls.load(Ordering::SeqCst), 7);
        assert!(task.peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_panicking_task_does_not_abort_wave() {
        let task = Arc::new(CountingTask::default());
        let scheduler = scheduler(Arc::clone(&task), 4);
        let symbols = vec![
            "A".to_string(),
            "PANIC".to_string(),
            "B".to_string(),
            "C".to_string(),
        ];

        let stats = scheduler.run_cycle(&symbols, &CancellationToken::new()).await;

        assert_eq!(stats.scanned, 3);
        assert_eq!(stats.failed, 1);
        assert_eq!(task.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_cancelled_cycle_launches_nothing() {
        let task = Arc::new(CountingTask::default());
        let scheduler = scheduler(Arc::clone(&task), 2);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let stats = scheduler.run_cycle(&sample_symbols(5), &cancel).await;

        assert_eq!(stats, CycleStats::default());
        assert_eq!(task.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let task = Arc::new(CountingTask::default());
        let scheduler = Arc::new(scheduler(Arc::clone(&task), 2));
        let cancel = CancellationToken::new();

        let handle = {
            let scheduler = Arc::clone(&scheduler);
            let cancel = cancel.clone();
            tokio::spawn(async move { scheduler.run(sample_symbols(2), cancel).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(task.calls.load(Ordering::SeqCst), 2);
    }

    // ========================================================================
    // Symbol refresh
    // ========================================================================

    #[tokio::test]
    async fn test_refresh_keeps_list_on_failure() {
        let mut venue = MockVenueClient::new();
        venue
            .expect_symbols()
            .returning(|| Err(arb_core::CoreError::Timeout("symbols".to_string())));
        let scheduler = WorkerPoolScheduler::new(
            Arc::new(CountingTask::default()),
            Arc::new(venue),
            Arc::new(ConfigHandle::fixed(RuntimeConfig::default())),
            Arc::new(CooldownTable::new()),
        );

        assert!(scheduler.refresh_symbols().await.is_none());
    }

    #[tokio::test]
    async fn test_configured_symbols_override_venue() {
        let mut venue = MockVenueClient::new();
        venue.expect_symbols().never();
        let mut runtime = RuntimeConfig::default();
        runtime.scanner.symbols = vec!["FOO_USDT".to_string()];
        let scheduler = WorkerPoolScheduler::new(
            Arc::new(CountingTask::default()),
            Arc::new(venue),
            Arc::new(ConfigHandle::fixed(runtime)),
            Arc::new(CooldownTable::new()),
        );

        assert_eq!(
            scheduler.refresh_symbols().await,
            Some(vec!["FOO_USDT".to_string()])
        );
    }
}
