//! Paper-trading venue.
//!
//! Market data (symbols, ticker, depth) comes from the venue's public
//! futures REST API. Orders never leave the process: [`PaperAccount`]
//! fills them at the last traded price and tracks margin and PnL.

use std::collections::HashMap;
use std::time::Duration;

use arb_core::{
    Balance, BookLevel, CoreError, OrderAck, OrderBook, Price, Result, Side, VenueClient,
    VenuePosition,
};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info};
use uuid::Uuid;

const SYMBOL_LIST_PATH: &str = "/future/market/v1/public/symbol/list";
const TICKER_PATH: &str = "/future/market/v1/public/q/ticker";
const DEPTH_PATH: &str = "/future/market/v1/public/q/depth";

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope<T> {
    return_code: i64,
    #[serde(default)]
    msg_info: Option<String>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct SymbolList {
    #[serde(default)]
    symbols: Vec<RawSymbol>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSymbol {
    symbol: String,
    #[serde(default = "default_contract_size")]
    contract_size: Decimal,
    #[serde(default)]
    state: i64,
    #[serde(default = "default_true")]
    trade_switch: bool,
}

fn default_contract_size() -> Decimal {
    Decimal::ONE
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct RawTicker {
    /// Last traded price.
    c: Decimal,
}

#[derive(Debug, Deserialize)]
struct RawDepth {
    #[serde(default)]
    b: Vec<(Decimal, Decimal)>,
    #[serde(default)]
    a: Vec<(Decimal, Decimal)>,
}

/// Static per-symbol market facts.
#[derive(Debug, Clone, Copy, PartialEq)]
struct MarketInfo {
    contract_size: Decimal,
    tradable: bool,
}

// ============================================================================
// PaperAccount
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
struct PaperPosition {
    side: Side,
    /// Base-asset quantity.
    quantity: Decimal,
    entry: Decimal,
    margin: Decimal,
    leverage: u32,
}

/// Simulated margin account.
#[derive(Debug, Clone)]
pub struct PaperAccount {
    free: Decimal,
    positions: HashMap<String, PaperPosition>,
    leverage: HashMap<String, u32>,
    realized_pnl: Decimal,
}

impl PaperAccount {
    pub fn new(initial_balance: Decimal) -> Self {
        Self {
            free: initial_balance,
            positions: HashMap::new(),
            leverage: HashMap::new(),
            realized_pnl: Decimal::ZERO,
        }
    }

    pub fn balance(&self) -> Balance {
        let used: Decimal = self.positions.values().map(|p| p.margin).sum();
        Balance {
            total: self.free + used,
            free: self.free,
            used,
        }
    }

    pub fn realized_pnl(&self) -> Decimal {
        self.realized_pnl
    }

    pub fn set_leverage(&mut self, symbol: &str, leverage: u32) {
        self.leverage.insert(symbol.to_string(), leverage);
    }

    /// Fill a market order at `price`. Adding to a position on the same
    /// side re-weights the entry; an opposite-side order is declined.
    pub fn open(
        &mut self,
        symbol: &str,
        side: Side,
        margin: Decimal,
        leverage: u32,
        price: Price,
    ) -> Option<OrderAck> {
        if !price.is_positive() || margin <= Decimal::ZERO || margin > self.free {
            return None;
        }
        let leverage = self.leverage.get(symbol).copied().unwrap_or(leverage);
        let quantity = margin * Decimal::from(leverage) / price.inner();

        match self.positions.get_mut(symbol) {
            Some(existing) if existing.side != side => return None,
            Some(existing) => {
                let total = existing.quantity + quantity;
                existing.entry =
                    (existing.entry * existing.quantity + price.inner() * quantity) / total;
                existing.quantity = total;
                existing.margin += margin;
            }
            None => {
                self.positions.insert(
                    symbol.to_string(),
                    PaperPosition {
                        side,
                        quantity,
                        entry: price.inner(),
                        margin,
                        leverage,
                    },
                );
            }
        }
        self.free -= margin;

        Some(OrderAck {
            order_id: Uuid::new_v4().to_string(),
            symbol: symbol.to_string(),
            side,
            fill_price: Some(price),
            margin_usd: margin,
            leverage,
        })
    }

    /// Close the whole position at `price`. Returns the realized PnL.
    pub fn close(&mut self, symbol: &str, price: Price) -> Option<Decimal> {
        if !price.is_positive() {
            return None;
        }
        let position = self.positions.remove(symbol)?;
        let direction = Decimal::from(position.side.sign());
        let pnl = (price.inner() - position.entry) * position.quantity * direction;
        // Losses are capped at the posted margin.
        let returned = (position.margin + pnl).max(Decimal::ZERO);
        self.free += returned;
        self.realized_pnl += returned - position.margin;
        Some(pnl)
    }

    pub fn positions(&self) -> Vec<VenuePosition> {
        self.positions
            .iter()
            .map(|(symbol, p)| VenuePosition {
                symbol: symbol.clone(),
                side: p.side,
                contracts: p.quantity,
                entry_price: Price::new(p.entry),
                margin_usd: p.margin,
                leverage: p.leverage,
            })
            .collect()
    }
}

// ============================================================================
// PaperVenue
// ============================================================================

/// [`VenueClient`] with live market data and simulated fills.
pub struct PaperVenue {
    client: Client,
    base_url: String,
    markets: RwLock<HashMap<String, MarketInfo>>,
    account: Mutex<PaperAccount>,
}

impl PaperVenue {
    pub fn new(
        base_url: impl Into<String>,
        initial_balance: Decimal,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CoreError::Venue(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            markets: RwLock::new(HashMap::new()),
            account: Mutex::new(PaperAccount::new(initial_balance)),
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CoreError::Timeout(format!("{path}: {e}"))
                } else {
                    CoreError::Venue(format!("{path}: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CoreError::Venue(format!("{path}: HTTP {status}: {body}")));
        }

        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| CoreError::Venue(format!("{path}: failed to parse response: {e}")))?;
        if envelope.return_code != 0 {
            return Err(CoreError::Venue(format!(
                "{path}: code {} {}",
                envelope.return_code,
                envelope.msg_info.unwrap_or_default()
            )));
        }
        envelope
            .result
            .ok_or_else(|| CoreError::Venue(format!("{path}: empty result")))
    }

    async fn load_markets(&self) -> Result<Vec<String>> {
        let list: SymbolList = self.get(SYMBOL_LIST_PATH, &[]).await?;
        let mut markets = HashMap::with_capacity(list.symbols.len());
        let mut tradable = Vec::new();
        for raw in list.symbols {
            let info = MarketInfo {
                contract_size: raw.contract_size,
                tradable: raw.state == 0 && raw.trade_switch,
            };
            if info.tradable {
                tradable.push(raw.symbol.clone());
            }
            markets.insert(raw.symbol, info);
        }
        info!(markets = markets.len(), tradable = tradable.len(), "Loaded venue markets");
        *self.markets.write() = markets;
        Ok(tradable)
    }

    async fn market(&self, symbol: &str) -> Result<Option<MarketInfo>> {
        if let Some(info) = self.markets.read().get(symbol).copied() {
            return Ok(Some(info));
        }
        self.load_markets().await?;
        Ok(self.markets.read().get(symbol).copied())
    }
}

#[async_trait]
impl VenueClient for PaperVenue {
    async fn symbols(&self) -> Result<Vec<String>> {
        self.load_markets().await
    }

    async fn ticker(&self, symbol: &str) -> Result<Price> {
        let ticker: RawTicker = self
            .get(TICKER_PATH, &[("symbol", symbol.to_string())])
            .await?;
        Ok(Price::new(ticker.c))
    }

    async fn is_tradable(&self, symbol: &str) -> Result<bool> {
        Ok(self.market(symbol).await?.is_some_and(|m| m.tradable))
    }

    async fn order_book(&self, symbol: &str, depth: usize) -> Result<OrderBook> {
        let contract_size = self
            .market(symbol)
            .await?
            .map_or(Decimal::ONE, |m| m.contract_size);
        let raw: RawDepth = self
            .get(
                DEPTH_PATH,
                &[("symbol", symbol.to_string()), ("level", depth.to_string())],
            )
            .await?;
        let level = |(price, contracts): (Decimal, Decimal)| {
            BookLevel::new(Price::new(price), contracts * contract_size)
        };
        Ok(OrderBook {
            bids: raw.b.into_iter().take(depth).map(level).collect(),
            asks: raw.a.into_iter().take(depth).map(level).collect(),
        })
    }

    async fn balance(&self) -> Result<Balance> {
        Ok(self.account.lock().balance())
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<()> {
        self.account.lock().set_leverage(symbol, leverage);
        Ok(())
    }

    async fn open_market(
        &self,
        symbol: &str,
        side: Side,
        margin_usd: Decimal,
        leverage: u32,
    ) -> Result<Option<OrderAck>> {
        let price = self.ticker(symbol).await?;
        let ack = self
            .account
            .lock()
            .open(symbol, side, margin_usd, leverage, price);
        debug!(symbol, %side, %margin_usd, filled = ack.is_some(), "Paper order");
        Ok(ack)
    }

    async fn close_position(
        &self,
        symbol: &str,
        side: Side,
        _notional_usd: Decimal,
    ) -> Result<bool> {
        let price = self.ticker(symbol).await?;
        let pnl = self.account.lock().close(symbol, price);
        debug!(symbol, %side, pnl = ?pnl, "Paper close");
        Ok(pnl.is_some())
    }

    async fn list_open_positions(&self) -> Result<Vec<VenuePosition>> {
        Ok(self.account.lock().positions())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn price(value: Decimal) -> Price {
        Price::new(value)
    }

    // ========================================================================
    // Account
    // ========================================================================

    #[test]
    fn test_open_and_close_long_in_profit() {
        let mut account = PaperAccount::new(dec!(100));
        let ack = account
            .open("FOO", Side::Long, dec!(5), 10, price(dec!(1.00)))
            .unwrap();
        assert_eq!(ack.fill_price, Some(price(dec!(1.00))));
        assert_eq!(account.balance().free, dec!(95));
        assert_eq!(account.balance().used, dec!(5));

        let pnl = account.close("FOO", price(dec!(1.03))).unwrap();
        assert_eq!(pnl, dec!(1.5));
        assert_eq!(account.balance().free, dec!(101.5));
        assert!(account.positions().is_empty());
    }

    #[test]
    fn test_add_reweights_entry() {
        let mut account = PaperAccount::new(dec!(100));
        account.set_leverage("FOO", 10);
        account.open("FOO", Side::Long, dec!(5), 10, price(dec!(1.00)));
        account.open("FOO", Side::Long, dec!(5), 10, price(dec!(0.50)));

        let held = account.positions();
        assert_eq!(held.len(), 1);
        // 50 units at 1.00 plus 100 units at 0.50
        assert_eq!(held[0].contracts, dec!(150));
        assert_eq!(held[0].entry_price.inner().round_dp(6), dec!(0.666667));
        assert_eq!(held[0].margin_usd, dec!(10));
    }

    #[test]
    fn test_short_loss_capped_at_margin() {
        let mut account = PaperAccount::new(dec!(10));
        account.open("FOO", Side::Short, dec!(10), 10, price(dec!(1.00)));
        account.close("FOO", price(dec!(1.50)));

        assert_eq!(account.balance().total, dec!(0));
        assert_eq!(account.realized_pnl(), dec!(-10));
    }

    #[test]
    fn test_declined_orders() {
        let mut account = PaperAccount::new(dec!(3));
        assert!(account
            .open("FOO", Side::Long, dec!(5), 10, price(dec!(1)))
            .is_none());

        account.open("FOO", Side::Long, dec!(1), 10, price(dec!(1)));
        assert!(account
            .open("FOO", Side::Short, dec!(1), 10, price(dec!(1)))
            .is_none());
        assert!(account.close("BAR", price(dec!(1))).is_none());
    }

    // ========================================================================
    // Wire format
    // ========================================================================

    #[test]
    fn test_parse_envelopes() {
        let ticker: Envelope<RawTicker> = serde_json::from_str(
            r#"{"returnCode":0,"msgInfo":"success","error":null,
                "result":{"t":1700000000000,"s":"btc_usdt","c":"43000.5","h":"44000"}}"#,
        )
        .unwrap();
        assert_eq!(ticker.result.unwrap().c, dec!(43000.5));

        let depth: Envelope<RawDepth> = serde_json::from_str(
            r#"{"returnCode":0,"result":{"s":"foo_usdt","b":[["0.99","100"]],"a":[["1.01","50"]]}}"#,
        )
        .unwrap();
        let depth = depth.result.unwrap();
        assert_eq!(depth.b, vec![(dec!(0.99), dec!(100))]);

        let list: Envelope<SymbolList> = serde_json::from_str(
            r#"{"returnCode":0,"result":{"symbols":[
                {"symbol":"foo_usdt","contractSize":"0.1","state":0,"tradeSwitch":true},
                {"symbol":"bar_usdt","contractSize":"1","state":1}
            ]}}"#,
        )
        .unwrap();
        let symbols = list.result.unwrap().symbols;
        assert_eq!(symbols[0].contract_size, dec!(0.1));
        assert_eq!(symbols[1].state, 1);
    }

    #[tokio::test]
    async fn test_unreachable_market_data_is_venue_error() {
        let venue = PaperVenue::new("http://127.0.0.1:9", dec!(100), Duration::from_millis(200))
            .unwrap();
        assert!(venue.ticker("foo_usdt").await.is_err());
        assert_eq!(venue.balance().await.unwrap().free, dec!(100));
    }
}
