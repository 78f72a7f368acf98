//! Transport error types.

use thiserror::Error;

/// Errors raised while starting or running a listener.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The listener could not bind its address.
    #[error("failed to bind {addr}: {reason}")]
    Bind {
        /// The requested address.
        addr: String,
        /// Reason for failure.
        reason: String,
    },

    /// The configured route path is unusable.
    #[error("invalid route path '{0}'")]
    InvalidPath(String),
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;
