//! Boundaries to the home venue and the notification channel.
//!
//! Both are injected into the engine. Every venue call may fail, and a
//! failure means the outcome is unknown: callers re-check with
//! [`VenueClient::list_open_positions`] before any destructive follow-up.

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::decimal::Price;
use crate::error::Result;
use crate::side::Side;

// ============================================================================
// Venue data
// ============================================================================

/// One order book level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: Price,
    /// Base-asset quantity.
    pub size: Decimal,
}

impl BookLevel {
    pub fn new(price: Price, size: Decimal) -> Self {
        Self { price, size }
    }

    #[inline]
    pub fn notional(&self) -> Decimal {
        self.price.inner() * self.size
    }
}

/// Order book snapshot, best level first on each side.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBook {
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
}

impl OrderBook {
    /// USD notional available to fill a market order on `side`, summed over
    /// the best `levels` levels. A long entry consumes asks, a short one bids.
    pub fn depth_notional(&self, side: Side, levels: usize) -> Decimal {
        let book = match side {
            Side::Long => &self.asks,
            Side::Short => &self.bids,
        };
        book.iter().take(levels).map(BookLevel::notional).sum()
    }
}

/// Account balance in USD.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub total: Decimal,
    pub free: Decimal,
    pub used: Decimal,
}

/// A position as reported by the venue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VenuePosition {
    pub symbol: String,
    pub side: Side,
    pub contracts: Decimal,
    pub entry_price: Price,
    pub margin_usd: Decimal,
    pub leverage: u32,
}

/// Acknowledgement of an accepted market order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderAck {
    pub order_id: String,
    pub symbol: String,
    pub side: Side,
    pub fill_price: Option<Price>,
    pub margin_usd: Decimal,
    pub leverage: u32,
}

// ============================================================================
// VenueClient
// ============================================================================

/// Thin interface over the home exchange.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait VenueClient: Send + Sync {
    /// Tradable symbol universe.
    async fn symbols(&self) -> Result<Vec<String>>;

    /// Last traded price.
    async fn ticker(&self, symbol: &str) -> Result<Price>;

    /// Whether the symbol currently accepts orders.
    async fn is_tradable(&self, symbol: &str) -> Result<bool>;

    async fn order_book(&self, symbol: &str, depth: usize) -> Result<OrderBook>;

    async fn balance(&self) -> Result<Balance>;

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<()>;

    /// Open (or add to) a position with `margin_usd` of margin.
    ///
    /// `Ok(None)` means the venue declined the order.
    async fn open_market(
        &self,
        symbol: &str,
        side: Side,
        margin_usd: Decimal,
        leverage: u32,
    ) -> Result<Option<OrderAck>>;

    /// Close the position for `symbol`. Returns `true` on confirmed close.
    async fn close_position(&self, symbol: &str, side: Side, notional_usd: Decimal)
        -> Result<bool>;

    async fn list_open_positions(&self) -> Result<Vec<VenuePosition>>;
}

// ============================================================================
// NotificationSink
// ============================================================================

/// Best-effort delivery of human-readable events.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Returns `true` if the message was delivered.
    async fn notify(&self, text: &str) -> bool;
}

/// Send a notification on a detached task.
///
/// Never awaited by the caller, so it is safe to call right after
/// releasing a lock without delaying trading logic.
pub fn notify_detached(sink: &Arc<dyn NotificationSink>, text: String) {
    let sink = Arc::clone(sink);
    tokio::spawn(async move {
        if !sink.notify(&text).await {
            debug!("Notification not delivered");
        }
    });
}
