//! Configuration module for the Switchboard runtime.
//!
//! This module provides figment-based configuration loading and validation
//! for logging, the socket server, and dispatch behavior.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile};
pub use schema::{
    DispatchConfig, LogFormat, LogLevel, LogOutput, LoggingConfig, ServerConfig,
    SpanEventConfig, SwitchboardConfig,
};
pub use validation::validate_config;
