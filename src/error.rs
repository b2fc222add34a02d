//! Error types for the Superban gate.

use thiserror::Error;

use crate::store::StoreError;

/// Main error type for Superban operations.
#[derive(Error, Debug)]
pub enum SuperbanError {
    /// The configured ban criterion is not one of `user_id`, `email`, `ip`
    #[error("The provided ban criteria is invalid: {0:?}")]
    InvalidCriterion(String),

    /// Limiter parameters that can never describe a usable limit
    #[error("Invalid limits: {0}")]
    InvalidLimits(String),

    /// The configured cache driver has no registered store
    #[error("Unknown cache driver: {0}")]
    UnknownDriver(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Ban or attempt store failures, passed through untouched
    #[error(transparent)]
    Store(#[from] StoreError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Superban operations.
pub type Result<T> = std::result::Result<T, SuperbanError>;
