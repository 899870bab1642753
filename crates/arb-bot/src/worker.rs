//! Per-symbol scan task.
//!
//! One call to [`ScanContext::scan_symbol`] takes a symbol from a fresh
//! home price to an entry, an averaging add or an exit, sharing the
//! executor and closer with the rest of the engine.

use std::sync::Arc;

use arb_core::{Opportunity, Position, QuoteMode, VenueClient};
use arb_position::{
    AveragingOutcome, CloseOutcome, EntryOutcome, PositionMonitor, PositionStore, PriceFallback,
    TradeExecutor,
};
use arb_price::PriceResolver;
use arb_verify::VerificationPipeline;
use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::ConfigHandle;
use crate::realism::RealismFilter;
use crate::scheduler::ScanTask;

/// What a scan did with its symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    NoPrice,
    Untradable,
    NoReference,
    Unrealistic,
    /// Spread outside the candidacy band.
    OutOfBand,
    /// Recorded as an opportunity; nothing traded.
    Candidate,
    Rejected,
    Opened,
    Averaged,
    Closed,
    /// A venue or resolver call failed.
    Failed,
}

impl ScanOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoPrice => "no_price",
            Self::Untradable => "untradable",
            Self::NoReference => "no_reference",
            Self::Unrealistic => "unrealistic",
            Self::OutOfBand => "out_of_band",
            Self::Candidate => "candidate",
            Self::Rejected => "rejected",
            Self::Opened => "opened",
            Self::Averaged => "averaged",
            Self::Closed => "closed",
            Self::Failed => "failed",
        }
    }
}

/// Shared handles a scan task needs.
#[derive(Clone)]
pub struct ScanContext {
    pub venue: Arc<dyn VenueClient>,
    pub resolver: Arc<PriceResolver>,
    pub pipeline: Arc<VerificationPipeline>,
    pub executor: Arc<TradeExecutor>,
    pub monitor: Arc<PositionMonitor>,
    pub store: Arc<PositionStore>,
    pub prices: Arc<PriceFallback>,
    pub config: Arc<ConfigHandle>,
}

impl ScanContext {
    pub async fn scan_symbol(&self, symbol: &str) -> ScanOutcome {
        let held = self.store.get(symbol);
        let outcome = self.look_for_trade(symbol, held.as_ref()).await;

        // Any position that existed before this scan gets an exit check,
        // even when the signal path bailed out early.
        match (&held, outcome) {
            (Some(_), ScanOutcome::Opened) | (None, _) => outcome,
            (Some(_), _) => match self.monitor.check_position(symbol).await {
                Some(CloseOutcome::Closed(_)) => ScanOutcome::Closed,
                _ => outcome,
            },
        }
    }

    async fn look_for_trade(&self, symbol: &str, held: Option<&Position>) -> ScanOutcome {
        let home = match self.venue.ticker(symbol).await {
            Ok(price) if price.is_positive() => price,
            Ok(_) => return ScanOutcome::NoPrice,
            Err(e) => {
                debug!(symbol, error = %e, "Ticker unavailable");
                return ScanOutcome::NoPrice;
            }
        };
        self.prices.observe(symbol, home);

        match self.venue.is_tradable(symbol).await {
            Ok(true) => {}
            Ok(false) => return ScanOutcome::Untradable,
            Err(e) => {
                debug!(symbol, error = %e, "Tradability check failed");
                return ScanOutcome::Untradable;
            }
        }

        let quote = match self.resolver.resolve(symbol, QuoteMode::Signal).await {
            Ok(quote) => quote,
            Err(e) if e.is_not_found() => return ScanOutcome::NoReference,
            Err(e) => {
                warn!(symbol, error = %e, "Reference price lookup failed");
                return ScanOutcome::Failed;
            }
        };

        let Some(opportunity) = Opportunity::new(
            symbol,
            home,
            quote.price,
            quote.liquidity_usd,
            quote.volume_24h_usd,
            Utc::now(),
        ) else {
            return ScanOutcome::NoPrice;
        };

        let runtime = self.config.runtime();
        let filter = RealismFilter::new(&runtime.scanner.blacklist);
        if let Err(reason) = filter.check(symbol, home, quote.price, opportunity.spread_pct) {
            debug!(symbol, %reason, "Spread rejected as unrealistic");
            return ScanOutcome::Unrealistic;
        }

        if !runtime.scanner.is_candidate(opportunity.spread_pct) {
            return ScanOutcome::OutOfBand;
        }
        debug!(
            symbol,
            spread_pct = %opportunity.spread_pct.round_dp(3),
            side = %opportunity.side,
            provider = %quote.provider_id,
            "Candidate spread"
        );
        self.store.record_opportunity(opportunity.clone());

        match held {
            None => {
                if self.store.len() >= runtime.position.trading.max_open_positions {
                    return ScanOutcome::Candidate;
                }
                self.enter(&opportunity).await
            }
            Some(position) if position.side == opportunity.side => {
                match self
                    .executor
                    .average(symbol, home, opportunity.side)
                    .await
                {
                    Ok(AveragingOutcome::Added(_)) => ScanOutcome::Averaged,
                    Ok(AveragingOutcome::Skipped(skip)) => {
                        debug!(symbol, %skip, "Averaging skipped");
                        ScanOutcome::Candidate
                    }
                    Err(e) => {
                        warn!(symbol, error = %e, "Averaging failed");
                        ScanOutcome::Failed
                    }
                }
            }
            Some(_) => ScanOutcome::Candidate,
        }
    }

    async fn enter(&self, opportunity: &Opportunity) -> ScanOutcome {
        let symbol = opportunity.symbol.as_str();
        let verification = self.pipeline.verify(opportunity).await;
        if !verification.accepted {
            return ScanOutcome::Rejected;
        }
        if !verification.warnings.is_empty() {
            info!(symbol, warnings = ?verification.warnings, "Entering with warnings");
        }

        let reference_url = verification.reference.and_then(|q| q.pair_url);
        match self.executor.open_position(opportunity, reference_url).await {
            Ok(EntryOutcome::Opened(_)) => ScanOutcome::Opened,
            Ok(EntryOutcome::Skipped(skip)) => {
                debug!(symbol, ?skip, "Entry skipped");
                ScanOutcome::Candidate
            }
            Ok(EntryOutcome::Orphaned) => ScanOutcome::Failed,
            Err(e) => {
                warn!(symbol, error = %e, "Entry failed");
                ScanOutcome::Failed
            }
        }
    }
}

#[async_trait]
impl ScanTask for ScanContext {
    async fn scan(&self, symbol: &str) -> ScanOutcome {
        self.scan_symbol(symbol).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_labels_unique() {
        let all = [
            ScanOutcome::NoPrice,
            ScanOutcome::Untradable,
            ScanOutcome::NoReference,
            ScanOutcome::Unrealistic,
            ScanOutcome::OutOfBand,
            ScanOutcome::Candidate,
            ScanOutcome::Rejected,
            ScanOutcome::Opened,
            ScanOutcome::Averaged,
            ScanOutcome::Closed,
            ScanOutcome::Failed,
        ];
        let mut labels: Vec<_> = all.iter().map(ScanOutcome::as_str).collect();
        labels.sort_unstable();
        labels.dedup();
        assert_eq!(labels.len(), all.len());
    }
}
