//! # Switchboard
//!
//! Annotation-driven message dispatch for socket sessions.
//!
//! ## Overview
//!
//! Controllers declare handlers for connection, disconnection and routed
//! messages. At startup their signatures are checked and a route table is
//! built; afterwards each inbound event is decoded, passed through the
//! route's filter chain and handed to exactly one handler.
//!
//! ```text
//! ┌───────────┐     ┌────────────┐     ┌──────────────┐     ┌─────────────┐
//! │ Transport │────▶│ Dispatcher │────▶│ Filter chain │────▶│ Handler     │
//! │ (session) │     │ route path │     │ by priority  │     │ Request<T>  │
//! └───────────┘     └────────────┘     └──────────────┘     └─────────────┘
//! ```
//!
//! - **Runtime**: configuration, logging and the WebSocket listener
//! - **Dispatcher**: route lookup, decoding, rejections
//! - **Filters**: ordered admission checks, first rejection wins
//! - **Controllers**: user types exposing handlers via `#[socket_controller]`
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use switchboard::prelude::*;
//!
//! #[derive(Default)]
//! struct Chat;
//!
//! #[socket_controller]
//! impl Chat {
//!     #[on_connect]
//!     async fn joined(&self, session: Session) {
//!         info!(session = %session.id(), "joined");
//!     }
//!
//!     #[socket_mapping(path = "/echo")]
//!     async fn echo(&self, request: Request<String>) {
//!         info!(body = ?request.request_body, "echo");
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), RuntimeError> {
//!     let runtime = SwitchboardRuntime::new();
//!     runtime.provide(Chat);
//!     runtime.run().await
//! }
//! ```
//!
//! Generated code refers to `::switchboard_core`, so crates using the macros
//! depend on `switchboard-core` directly as well.
//!
//! ## Features
//!
//! - `toml-config` *(default)* / `yaml-config`: configuration file formats
//! - `json-log`: JSON log lines
//! - `ws-server`: the WebSocket listener and `SwitchboardRuntime::run`

pub use switchboard_core as core;
pub use switchboard_framework as framework;
pub use switchboard_runtime as runtime;
pub use switchboard_transport as transport;

pub use switchboard_macros::socket_controller;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use switchboard::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use switchboard_runtime::{RuntimeError, SwitchboardConfig, SwitchboardRuntime};

    // Controllers and filters
    pub use async_trait::async_trait;
    pub use switchboard_core::{SocketController, SocketFilter};
    pub use switchboard_macros::socket_controller;

    // Handler parameters and replies
    pub use switchboard_core::{
        CloseStatus, MessageSender, MessageSenderExt, Request, RequestView, Response, Session,
        SessionId,
    };

    // Dispatch
    pub use switchboard_framework::{DispatchOutcome, Dispatcher, RouteTable};

    // Logging
    pub use switchboard_runtime::prelude::*;
}
