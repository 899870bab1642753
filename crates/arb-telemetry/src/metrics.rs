//! Prometheus metrics for the arbitrage engine.
//!
//! Covers:
//! - Reference provider calls and resolver cache
//! - Verification outcomes per stage
//! - Position entries, adds, closes and PnL
//! - Scheduler waves and task isolation
//! - Venue balance
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. If registration fails,
//! it indicates a fatal configuration error (e.g., duplicate metric names)
//! that should cause an immediate crash at startup rather than silent failure.
//! These panics only occur during static initialization, never at runtime.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, register_histogram,
    register_histogram_vec, register_int_counter, register_int_gauge, CounterVec, Encoder, Gauge,
    GaugeVec, Histogram, HistogramVec, IntCounter, IntGauge, TextEncoder,
};

use crate::error::{TelemetryError, TelemetryResult};

/// Reference provider requests by outcome.
/// Labels: provider, outcome (success/empty/transient/error/implausible/below_floor)
pub static PROVIDER_REQUESTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "arb_provider_requests_total",
        "Reference provider requests by outcome",
        &["provider", "outcome"]
    )
    .unwrap()
});

/// Resolver cache lookups.
pub static RESOLVER_CACHE_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "arb_resolver_cache_total",
        "Price resolver cache lookups",
        &["mode", "result"]
    )
    .unwrap()
});

/// Resolutions that found no usable quote.
pub static RESOLVE_NOT_FOUND_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "arb_resolve_not_found_total",
        "Resolutions where every provider failed",
        &["mode"]
    )
    .unwrap()
});

/// Verification outcomes.
/// Labels: outcome (accepted/rejected), stage (first failing stage, or "none")
pub static VERIFICATION_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "arb_verification_total",
        "Verification pipeline outcomes",
        &["outcome", "stage"]
    )
    .unwrap()
});

/// Currently open positions.
pub static OPEN_POSITIONS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("arb_open_positions", "Number of open positions").unwrap()
});

/// Orders placed by kind (entry/average).
pub static ORDERS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "arb_orders_total",
        "Market orders placed",
        &["kind", "result"]
    )
    .unwrap()
});

/// Closes by exit reason.
pub static POSITION_CLOSES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "arb_position_closes_total",
        "Position closes by exit reason",
        &["reason", "result"]
    )
    .unwrap()
});

/// Realized leveraged PnL per trade in percent.
pub static TRADE_PNL_PCT: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "arb_trade_pnl_pct",
        "Leveraged PnL per closed trade in percent",
        &["reason"],
        vec![-50.0, -30.0, -20.0, -10.0, -5.0, 0.0, 5.0, 10.0, 20.0, 30.0, 50.0, 100.0]
    )
    .unwrap()
});

/// Position holding time in seconds.
pub static POSITION_HOLDING_SECS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "arb_position_holding_secs",
        "Position holding time in seconds",
        &["reason"],
        vec![60.0, 300.0, 900.0, 1800.0, 3600.0, 7200.0, 14400.0, 28800.0, 86400.0]
    )
    .unwrap()
});

/// Wave wall-clock duration in milliseconds.
pub static WAVE_DURATION_MS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "arb_wave_duration_ms",
        "Scheduler wave duration in milliseconds",
        vec![100.0, 500.0, 1000.0, 2000.0, 5000.0, 10000.0, 30000.0, 60000.0]
    )
    .unwrap()
});

/// Per-symbol scan outcomes.
pub static SYMBOL_SCANS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "arb_symbol_scans_total",
        "Per-symbol scan outcomes",
        &["outcome"]
    )
    .unwrap()
});

/// Per-symbol tasks that failed or panicked.
pub static TASK_FAILURES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "arb_task_failures_total",
        "Per-symbol tasks that failed or panicked"
    )
    .unwrap()
});

/// Venue balance in USD.
pub static BALANCE_USD: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!("arb_balance_usd", "Venue balance in USD", &["kind"]).unwrap()
});

/// Score of the last emitted best opportunity.
pub static BEST_OPPORTUNITY_SCORE: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "arb_best_opportunity_score",
        "Score of the last emitted best opportunity"
    )
    .unwrap()
});

/// Config reload attempts.
pub static CONFIG_RELOADS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "arb_config_reloads_total",
        "Runtime config reload attempts",
        &["result"]
    )
    .unwrap()
});

/// Metrics facade.
pub struct Metrics;

impl Metrics {
    // =========================================================================
    // Price resolution
    // =========================================================================

    /// Record a provider call outcome.
    pub fn provider_request(provider: &str, outcome: &str) {
        PROVIDER_REQUESTS_TOTAL
            .with_label_values(&[provider, outcome])
            .inc();
    }

    pub fn resolver_cache(mode: &str, hit: bool) {
        let result = if hit { "hit" } else { "miss" };
        RESOLVER_CACHE_TOTAL.with_label_values(&[mode, result]).inc();
    }

    pub fn resolve_not_found(mode: &str) {
        RESOLVE_NOT_FOUND_TOTAL.with_label_values(&[mode]).inc();
    }

    // =========================================================================
    // Verification
    // =========================================================================

    pub fn verification(accepted: bool, stage: &str) {
        let outcome = if accepted { "accepted" } else { "rejected" };
        VERIFICATION_TOTAL
            .with_label_values(&[outcome, stage])
            .inc();
    }

    // =========================================================================
    // Positions
    // =========================================================================

    pub fn open_positions(count: usize) {
        OPEN_POSITIONS.set(count as i64);
    }

    /// Record a market order attempt (kind: entry/average).
    pub fn order(kind: &str, ok: bool) {
        let result = if ok { "ok" } else { "failed" };
        ORDERS_TOTAL.with_label_values(&[kind, result]).inc();
    }

    pub fn close_attempt(reason: &str, ok: bool) {
        let result = if ok { "ok" } else { "failed" };
        POSITION_CLOSES_TOTAL
            .with_label_values(&[reason, result])
            .inc();
    }

    /// Record a completed trade.
    pub fn trade_closed(reason: &str, pnl_pct: f64, holding_secs: f64) {
        TRADE_PNL_PCT.with_label_values(&[reason]).observe(pnl_pct);
        POSITION_HOLDING_SECS
            .with_label_values(&[reason])
            .observe(holding_secs);
    }

    // =========================================================================
    // Scheduler
    // =========================================================================

    pub fn wave_duration(duration_ms: f64) {
        WAVE_DURATION_MS.observe(duration_ms);
    }

    pub fn symbol_scan(outcome: &str) {
        SYMBOL_SCANS_TOTAL.with_label_values(&[outcome]).inc();
    }

    pub fn task_failure() {
        TASK_FAILURES_TOTAL.inc();
    }

    pub fn best_opportunity(score: f64) {
        BEST_OPPORTUNITY_SCORE.set(score);
    }

    // =========================================================================
    // Account / runtime
    // =========================================================================

    pub fn balance(total: f64, free: f64, used: f64) {
        BALANCE_USD.with_label_values(&["total"]).set(total);
        BALANCE_USD.with_label_values(&["free"]).set(free);
        BALANCE_USD.with_label_values(&["used"]).set(used);
    }

    pub fn config_reload(ok: bool) {
        let result = if ok { "ok" } else { "failed" };
        CONFIG_RELOADS_TOTAL.with_label_values(&[result]).inc();
    }

    /// Render the default registry in Prometheus text format.
    pub fn render() -> TelemetryResult<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&prometheus::gather(), &mut buffer)
            .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| TelemetryError::Metrics(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_contains_recorded_metric() {
        Metrics::provider_request("aggregator", "success");
        Metrics::open_positions(3);

        let text = Metrics::render().unwrap();
        assert!(text.contains("arb_provider_requests_total"));
        assert!(text.contains("arb_open_positions 3"));
    }
}
