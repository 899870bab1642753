//! Position error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PositionError {
    #[error("Venue error: {0}")]
    Venue(#[from] arb_core::CoreError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] arb_persistence::PersistenceError),
}

pub type PositionResult<T> = Result<T, PositionError>;
