//! Core domain types for the spread arbitrage engine.
//!
//! This crate provides the types shared by every other crate:
//! - `Price`: Precision-safe price newtype
//! - `Side`, `PositionStatus`: Position direction and lifecycle state
//! - `Position`, `Opportunity`, `ProviderQuote`, `VerificationResult`
//! - `VenueClient`, `NotificationSink`: Boundaries to external collaborators
//! - `CooldownTable`: Per-symbol cooldown timestamps
//! - `ConfigSource`: Read access to hot-reloadable settings

pub mod cooldown;
pub mod decimal;
pub mod error;
pub mod opportunity;
pub mod position;
pub mod quote;
pub mod settings;
pub mod side;
pub mod symbol;
pub mod venue;
pub mod verification;

pub use cooldown::CooldownTable;
pub use decimal::Price;
pub use error::{CoreError, Result};
pub use opportunity::Opportunity;
pub use position::Position;
pub use quote::{ProviderId, ProviderQuote, QuoteMode};
pub use settings::{ConfigSource, FixedConfig};
pub use side::{PositionStatus, Side};
pub use symbol::base_symbol;
pub use venue::{
    notify_detached, Balance, BookLevel, NotificationSink, OrderAck, OrderBook, VenueClient,
    VenuePosition,
};
pub use verification::{SafetyStatus, VerificationResult};

#[cfg(any(test, feature = "mock"))]
pub use venue::MockVenueClient;
