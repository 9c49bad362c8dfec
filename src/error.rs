//! Error types for the coalescing layer
//!
//! Provides the single failure type fanned out to every waiter, using thiserror.

use std::time::Duration;

use thiserror::Error;

// == Fetch Error Enum ==
/// Terminal failure delivered to every callback registered for a request.
///
/// The type is `Clone` because one outcome is delivered to many waiters.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The transport or store collaborator reported a failure
    #[error("Operation failed: {0}")]
    OperationFailed(String),

    /// The timeout supervisor fired before the operation completed
    #[error("Operation timed out after {}ms", .timeout.as_millis())]
    TimedOut {
        /// Duration the supervisor was armed with
        timeout: Duration,
    },

    /// The collaborator answered but the response could not be used
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// A completion was dropped without ever being invoked
    #[error("Internal error: {0}")]
    Internal(String),
}

impl FetchError {
    /// Returns true if this failure was produced by a timeout supervisor.
    pub fn is_timeout(&self) -> bool {
        matches!(self, FetchError::TimedOut { .. })
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        FetchError::InvalidResponse(err.to_string())
    }
}

// == Result Type Alias ==
/// Convenience Result type for the coalescing layer.
pub type Result<T> = std::result::Result<T, FetchError>;
