//! Reference price resolution.
//!
//! A [`PriceResolver`] queries reference providers in a fixed priority
//! order (aggregator search, centralized index, on-chain pool read). Each
//! call waits on its provider's minimum interval, transient failures are
//! retried with exponential backoff, and every candidate quote passes a
//! plausibility check and the mode's liquidity/volume floors before it is
//! cached and returned.

pub mod cache;
pub mod config;
pub mod error;
mod http;
pub mod plausibility;
pub mod provider;
pub mod providers;
pub mod rate_limiter;
pub mod resolver;
pub mod retry;
pub mod rpc;

pub use cache::QuoteCache;
pub use config::{AggregatorConfig, IndexConfig, OnChainConfig, PoolConfig, QuoteFloors, ResolverConfig};
pub use error::{PriceError, PriceResult};
pub use plausibility::{Implausible, PlausibilityBands};
pub use provider::QuoteProvider;
pub use providers::{AggregatorProvider, IndexProvider, OnChainProvider};
pub use rate_limiter::MinIntervalLimiter;
pub use resolver::PriceResolver;
pub use retry::RetryPolicy;
pub use rpc::RpcClient;
