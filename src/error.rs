//! Error types for the aggregation kernel

use thiserror::Error;

/// Result type alias for aggregation kernel operations
pub type Result<T> = std::result::Result<T, AggError>;

/// Main error type for the aggregation kernel
#[derive(Error, Debug)]
pub enum AggError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Merge error: {0}")]
    Merge(String),

    #[error("Wrap-up error: {0}")]
    WrapUp(String),

    #[error("Execution error: {0}")]
    Execution(String),
}
