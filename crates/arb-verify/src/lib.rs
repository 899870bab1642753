//! Signal verification.
//!
//! Gates whether a detected spread is acted upon. The pipeline runs its
//! stages in order and short-circuits on the hard ones:
//!
//! 1. Cooldown
//! 2. Tradability on the home venue
//! 3. Reference price, liquidity and volume
//! 4. Economics (net profit after round-trip cost, spread ceiling)
//! 5. Contract safety
//! 6. Secondary signal quality (warnings only)
//!
//! The symbol's cooldown is written only when the result is accepted.

pub mod config;
pub mod economics;
pub mod error;
pub mod pipeline;
pub mod safety;

pub use config::{SafetyConfig, VerifyConfig};
pub use economics::{Economics, RoundTripCost};
pub use error::{VerifyError, VerifyResult};
pub use pipeline::VerificationPipeline;
pub use safety::{
    classify_code, classify_report, ContractCodeChecker, HoneypotChecker, HoneypotReport,
    SafetyChecker, StaticSafety,
};
