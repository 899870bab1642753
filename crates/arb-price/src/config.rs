//! Resolver configuration.

use std::collections::BTreeMap;
use std::time::Duration;

use arb_core::QuoteMode;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ============================================================================
// Floors
// ============================================================================

/// Minimum liquidity and 24h volume a quote must show to be used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteFloors {
    pub min_liquidity_usd: Decimal,
    pub min_volume_24h_usd: Decimal,
}

impl QuoteFloors {
    pub fn new(min_liquidity_usd: Decimal, min_volume_24h_usd: Decimal) -> Self {
        Self {
            min_liquidity_usd,
            min_volume_24h_usd,
        }
    }

    /// Entry signals.
    pub fn signal_default() -> Self {
        Self::new(Decimal::from(2_000), Decimal::from(5_000))
    }

    /// Exit checks on open positions.
    pub fn convergence_default() -> Self {
        Self::new(Decimal::from(1_000), Decimal::from(100))
    }

    pub fn admits(&self, liquidity_usd: Decimal, volume_24h_usd: Decimal) -> bool {
        liquidity_usd >= self.min_liquidity_usd && volume_24h_usd >= self.min_volume_24h_usd
    }
}

// ============================================================================
// Providers
// ============================================================================

/// Pair-search aggregator (DexScreener-shaped `search?q=`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_aggregator_url")]
    pub base_url: String,
    #[serde(default = "default_aggregator_interval_ms")]
    pub min_interval_ms: u64,
    /// Chain ids a pair must trade on.
    #[serde(default = "default_allowed_chains")]
    pub allowed_chains: Vec<String>,
    /// DEX ids a pair must trade on (case-insensitive).
    #[serde(default = "default_allowed_dexes")]
    pub allowed_dexes: Vec<String>,
    /// How many search results are considered, before sorting by liquidity.
    #[serde(default = "default_max_pairs")]
    pub max_pairs: usize,
}

fn default_true() -> bool {
    true
}

fn default_aggregator_url() -> String {
    "https://api.dexscreener.com/latest/dex".to_string()
}

fn default_aggregator_interval_ms() -> u64 {
    5_000
}

fn default_allowed_chains() -> Vec<String> {
    vec!["ethereum".to_string(), "bsc".to_string()]
}

fn default_allowed_dexes() -> Vec<String> {
    vec![
        "uniswap".to_string(),
        "pancakeswap".to_string(),
        "sushiswap".to_string(),
    ]
}

fn default_max_pairs() -> usize {
    15
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_aggregator_url(),
            min_interval_ms: default_aggregator_interval_ms(),
            allowed_chains: default_allowed_chains(),
            allowed_dexes: default_allowed_dexes(),
            max_pairs: default_max_pairs(),
        }
    }
}

/// Centralized market-data index (CoinGecko-shaped `simple/price`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_index_url")]
    pub base_url: String,
    #[serde(default = "default_index_interval_ms")]
    pub min_interval_ms: u64,
    /// Base symbol -> index coin id. Symbols without an id are skipped.
    #[serde(default = "default_index_ids")]
    pub coin_ids: BTreeMap<String, String>,
}

fn default_index_url() -> String {
    "https://api.coingecko.com/api/v3".to_string()
}

fn default_index_interval_ms() -> u64 {
    2_000
}

fn default_index_ids() -> BTreeMap<String, String> {
    [
        ("BTC", "bitcoin"),
        ("ETH", "ethereum"),
        ("BNB", "binancecoin"),
        ("SOL", "solana"),
        ("XRP", "ripple"),
        ("ADA", "cardano"),
        ("DOGE", "dogecoin"),
        ("MATIC", "matic-network"),
        ("DOT", "polkadot"),
        ("AVAX", "avalanche-2"),
        ("LINK", "chainlink"),
        ("UNI", "uniswap"),
        ("ATOM", "cosmos"),
        ("LTC", "litecoin"),
        ("ETC", "ethereum-classic"),
        ("IMX", "immutable-x"),
        ("LDO", "lido-dao"),
        ("ORCA", "orca"),
    ]
    .into_iter()
    .map(|(s, id)| (s.to_string(), id.to_string()))
    .collect()
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_index_url(),
            min_interval_ms: default_index_interval_ms(),
            coin_ids: default_index_ids(),
        }
    }
}

/// A constant-product pool read through `getReserves`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolConfig {
    pub chain: String,
    pub pair_address: String,
    /// Whether the priced token is `token0` of the pair.
    #[serde(default = "default_true")]
    pub token_is_token0: bool,
    #[serde(default = "default_token_decimals")]
    pub token_decimals: u32,
    #[serde(default = "default_token_decimals")]
    pub quote_decimals: u32,
    /// USD value of one unit of the quote token (1 for stablecoin pairs).
    #[serde(default = "default_quote_usd")]
    pub quote_usd_price: Decimal,
}

fn default_token_decimals() -> u32 {
    18
}

fn default_quote_usd() -> Decimal {
    Decimal::ONE
}

/// Direct on-chain pool reads over JSON-RPC.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnChainConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// No RPC URL disables the provider.
    #[serde(default)]
    pub rpc_url: Option<String>,
    #[serde(default = "default_onchain_interval_ms")]
    pub min_interval_ms: u64,
    /// Base symbol -> pool.
    #[serde(default)]
    pub pools: BTreeMap<String, PoolConfig>,
}

fn default_onchain_interval_ms() -> u64 {
    200
}

impl Default for OnChainConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rpc_url: None,
            min_interval_ms: default_onchain_interval_ms(),
            pools: BTreeMap::new(),
        }
    }
}

// ============================================================================
// ResolverConfig
// ============================================================================

/// Configuration for [`crate::PriceResolver`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Quote cache TTL in seconds.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "QuoteFloors::signal_default")]
    pub signal_floors: QuoteFloors,
    #[serde(default = "QuoteFloors::convergence_default")]
    pub convergence_floors: QuoteFloors,
    /// Attempts per provider, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// First backoff delay; doubles on each retry.
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
    /// Per-request HTTP timeout.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub aggregator: AggregatorConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub onchain: OnChainConfig,
}

fn default_cache_ttl_secs() -> u64 {
    300
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_backoff_ms() -> u64 {
    1_000
}

fn default_request_timeout_secs() -> u64 {
    10
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl_secs(),
            signal_floors: QuoteFloors::signal_default(),
            convergence_floors: QuoteFloors::convergence_default(),
            max_attempts: default_max_attempts(),
            base_backoff_ms: default_base_backoff_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            aggregator: AggregatorConfig::default(),
            index: IndexConfig::default(),
            onchain: OnChainConfig::default(),
        }
    }
}

impl ResolverConfig {
    pub fn floors(&self, mode: QuoteMode) -> &QuoteFloors {
        match mode {
            QuoteMode::Signal => &self.signal_floors,
            QuoteMode::Convergence => &self.convergence_floors,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be at least 1".to_string());
        }
        if self.request_timeout_secs == 0 {
            return Err("request_timeout_secs must be positive".to_string());
        }
        for (name, floors) in [
            ("signal_floors", &self.signal_floors),
            ("convergence_floors", &self.convergence_floors),
        ] {
            if floors.min_liquidity_usd.is_sign_negative()
                || floors.min_volume_24h_usd.is_sign_negative()
            {
                return Err(format!("{name} must be non-negative"));
            }
        }
        for (symbol, pool) in &self.onchain.pools {
            if pool.token_decimals > 28 || pool.quote_decimals > 28 {
                return Err(format!("pool for {symbol}: decimals must be at most 28"));
            }
            if !pool.quote_usd_price.is_sign_positive() || pool.quote_usd_price.is_zero() {
                return Err(format!("pool for {symbol}: quote_usd_price must be positive"));
            }
        }
        Ok(())
    }
}
