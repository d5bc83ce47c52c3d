//! Error types for the resilience crate

use thiserror::Error;

/// Errors that can occur when building resilience primitives
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ResilienceError {
    /// A retry policy was configured with values that would break its guarantees
    #[error("Invalid retry policy: {0}")]
    InvalidPolicy(String),

    /// A dead-letter queue was configured with zero capacity
    #[error("Dead-letter queue capacity must be at least 1")]
    ZeroCapacity,
}
