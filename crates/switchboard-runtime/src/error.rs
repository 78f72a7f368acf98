//! Runtime error types.

use thiserror::Error;

use crate::config::ConfigError;
use switchboard_core::BuildError;
use switchboard_transport::TransportError;

/// Errors that stop the runtime from serving.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// The route table could not be built.
    #[error("Failed to build route table: {0}")]
    Build(#[from] BuildError),

    /// The configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The transport failed to start.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
