//! Switchboard Runtime - orchestration layer for the Switchboard dispatcher.
//!
//! This crate provides:
//! - Configuration loading from files, profiles and `SWITCHBOARD_*` variables
//! - Logging setup driven by that configuration
//! - [`SwitchboardRuntime`], which builds the route table once and serves it
//!
//! ```ignore
//! use switchboard_runtime::SwitchboardRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = SwitchboardRuntime::new();
//!     runtime.provide(ChatController::default());
//!
//!     // Serve until Ctrl+C (requires the `ws-server` feature)
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

// Re-exports
pub use config::{ConfigError, ConfigLoader, ConfigResult, SwitchboardConfig};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use runtime::{RuntimeBuilder, SwitchboardRuntime};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
