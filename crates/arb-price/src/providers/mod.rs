//! Reference provider implementations, in cascade priority order.

pub mod aggregator;
pub mod index;
pub mod onchain;

pub use aggregator::AggregatorProvider;
pub use index::IndexProvider;
pub use onchain::OnChainProvider;
