//! # Switchboard Transport
//!
//! The socket side of Switchboard.
//!
//! ## Features
//!
//! - `ws-server`: WebSocket server built on axum
//! - `full`: All transports
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │  Controllers         │  (socket handlers)
//! ├──────────────────────┤
//! │  switchboard-        │  (route table, dispatcher)
//! │  framework           │
//! ├──────────────────────┤
//! │  switchboard-        │  <- This crate (sessions, sockets)
//! │  transport           │
//! ├──────────────────────┤
//! │  Network (TCP/WS)    │
//! └──────────────────────┘
//! ```
//!
//! The [`SessionHub`] is always available; it is the [`MessageSender`]
//! the dispatcher answers through.
//!
//! [`MessageSender`]: switchboard_core::MessageSender

pub mod error;
pub mod hub;

#[cfg(feature = "ws-server")]
pub mod server;

pub use error::{TransportError, TransportResult};
pub use hub::SessionHub;

#[cfg(feature = "ws-server")]
pub use server::{ListenerHandle, ServerOptions, ws_listen};
