//! Error types shared across zipflow crates

use thiserror::Error;

/// Result type alias for common operations
pub type Result<T> = std::result::Result<T, CommonError>;

/// Error type for shared primitives and setup
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommonError {
    #[error("invalid zip code '{0}': expected exactly 5 digits")]
    InvalidPostalCode(String),

    #[error("invalid email address '{0}'")]
    InvalidEmail(String),

    #[error("Configuration error: {0}")]
    Config(String),
}
