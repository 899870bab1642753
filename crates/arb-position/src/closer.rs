//! Close protocol shared by the scan workers and the monitor.
//!
//! 1. Take the order lock, then flip `Open -> Closing` under the store
//!    lock (no-op if not open)
//! 2. Re-check the venue; a symbol it no longer holds is removed locally
//! 3. Close on the venue, still under the order lock
//! 4. On failure revert to `Open`; on success remove, record and notify

use std::sync::Arc;

use arb_core::{base_symbol, notify_detached, NotificationSink, Position, Price, VenueClient};
use arb_persistence::{TradeHistoryWriter, TradeRecord};
use arb_telemetry::Metrics;
use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::{error, info, warn};

use crate::exit::ExitReason;
use crate::locks::TradeLocks;
use crate::store::PositionStore;

/// Result of a close attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum CloseOutcome {
    Closed(TradeRecord),
    /// No open position (missing, or another close is in flight).
    NotOpen,
    /// The venue no longer holds the position; removed locally.
    AlreadyFlat,
    /// The venue close failed; the position is open again.
    Failed(String),
}

/// Executes the close protocol.
pub struct PositionCloser {
    venue: Arc<dyn VenueClient>,
    store: Arc<PositionStore>,
    locks: Arc<TradeLocks>,
    history: Option<Arc<Mutex<TradeHistoryWriter>>>,
    notifier: Arc<dyn NotificationSink>,
}

impl PositionCloser {
    pub fn new(
        venue: Arc<dyn VenueClient>,
        store: Arc<PositionStore>,
        locks: Arc<TradeLocks>,
        history: Option<Arc<Mutex<TradeHistoryWriter>>>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            venue,
            store,
            locks,
            history,
            notifier,
        }
    }

    /// Close `symbol` at `exit_price` for `reason`.
    ///
    /// The order lock is taken before the position is claimed, so an
    /// in-flight entry or add has landed in the store and the close covers
    /// the full size.
    pub async fn close(&self, symbol: &str, reason: ExitReason, exit_price: Price) -> CloseOutcome {
        let (position, result) = {
            let _order = self.locks.order.lock().await;

            let Some(position) = self.store.try_begin_close(symbol) else {
                return CloseOutcome::NotOpen;
            };

            match self.venue.list_open_positions().await {
                Ok(held) => {
                    let base = base_symbol(symbol);
                    if !held.iter().any(|vp| base_symbol(&vp.symbol) == base) {
                        warn!(symbol, %reason, "Venue holds no position, removing locally");
                        self.store.remove(symbol);
                        return CloseOutcome::AlreadyFlat;
                    }
                }
                Err(e) => {
                    warn!(symbol, error = %e, "Could not list venue positions, closing anyway");
                }
            }

            let notional = position.size_notional * Decimal::from(position.leverage);
            let result = self
                .venue
                .close_position(symbol, position.side, notional)
                .await;
            (position, result)
        };

        match result {
            Ok(true) => self.finish(position, reason, exit_price),
            Ok(false) => self.fail(symbol, reason, "venue did not confirm close".to_string()),
            Err(e) => self.fail(symbol, reason, e.to_string()),
        }
    }

    fn fail(&self, symbol: &str, reason: ExitReason, message: String) -> CloseOutcome {
        error!(symbol, %reason, error = %message, "Close failed, reverting to open");
        self.store.revert_close(symbol);
        Metrics::close_attempt(reason.as_str(), false);
        CloseOutcome::Failed(message)
    }

    fn finish(&self, position: Position, reason: ExitReason, exit_price: Price) -> CloseOutcome {
        let closed_at = Utc::now();
        self.store.remove(&position.symbol);

        let record = TradeRecord {
            symbol: position.symbol.clone(),
            side: position.side,
            entry_price: position.avg_entry.inner(),
            exit_price: exit_price.inner(),
            size_notional: position.size_notional,
            leverage: position.leverage,
            adds_done: position.adds_done,
            pnl_pct: position.pnl_pct(exit_price),
            pnl_usd: position.pnl_usd(exit_price),
            reason: reason.as_str().to_string(),
            opened_at: position.opened_at,
            closed_at,
        };

        if let Some(history) = &self.history {
            if let Err(e) = history.lock().add_record(record.clone()) {
                warn!(symbol = %record.symbol, error = %e, "Failed to write trade history");
            }
        }

        let holding_secs = (closed_at - position.opened_at).num_milliseconds() as f64 / 1000.0;
        Metrics::close_attempt(reason.as_str(), true);
        Metrics::trade_closed(
            reason.as_str(),
            record.pnl_pct.to_f64().unwrap_or_default(),
            holding_secs,
        );

        info!(
            symbol = %record.symbol,
            side = %record.side,
            %reason,
            entry = %record.entry_price,
            exit = %record.exit_price,
            pnl_pct = %record.pnl_pct.round_dp(2),
            pnl_usd = %record.pnl_usd.round_dp(4),
            "Position closed"
        );
        notify_detached(
            &self.notifier,
            format!(
                "CLOSE {} {} ({}) | entry {} exit {} | PnL {:.2}% (${:.4})",
                record.side,
                record.symbol,
                reason,
                record.entry_price,
                record.exit_price,
                record.pnl_pct,
                record.pnl_usd
            ),
        );
        CloseOutcome::Closed(record)
    }
}
