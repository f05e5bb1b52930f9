//! Error types shared across the Infinity Storm workspace

use thiserror::Error;

use crate::money::Amount;

/// Core error type
///
/// Semantic kinds only; the sync protocol and HTTP boundary map these onto
/// wire payloads and status codes.
#[derive(Error, Debug)]
pub enum StormError {
    #[error("insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: Amount, available: Amount },

    #[error("invalid bet: {0}")]
    InvalidBet(String),

    #[error("engine fatal: {0}")]
    EngineFatal(String),

    #[error("validation mismatch: {0}")]
    ValidationMismatch(String),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("recovery not found: {0}")]
    RecoveryNotFound(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("admin privileges required")]
    AdminRequired,

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type alias
pub type StormResult<T> = Result<T, StormError>;

impl From<serde_json::Error> for StormError {
    fn from(err: serde_json::Error) -> Self {
        StormError::Serialization(err.to_string())
    }
}
