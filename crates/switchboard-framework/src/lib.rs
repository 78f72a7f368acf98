//! # Switchboard Framework
//!
//! Route table construction and message dispatch.
//!
//! This layer provides:
//! - Handler signature validation ([`validate_signature`] and friends)
//! - Filter ordering and execution ([`FilterChain`])
//! - The immutable [`RouteTable`] and its [`RouteTableBuilder`]
//! - The per-event [`Dispatcher`], also usable as a `tower::Service`
//!
//! Everything that can go wrong while building a table is fatal and
//! reported as a [`BuildError`](switchboard_core::BuildError). Everything
//! that can go wrong while dispatching is logged and contained to the one
//! event.

pub mod dispatcher;
pub mod filter_chain;
#[cfg(test)]
mod log_capture;
pub mod routing;
pub mod signature;

pub use dispatcher::{
    DEFAULT_ROUTE_FIELD, DispatchOptions, DispatchOutcome, Dispatcher, Rejection, SocketEvent,
};
pub use filter_chain::{FilterBinding, FilterChain, FilterVerdict};
pub use routing::{
    BoundHandler, ConnectCallback, DisconnectCallback, MessageRoute, RouteTable,
    RouteTableBuilder, build_connect_table, build_disconnect_table, build_message_table,
};
pub use signature::{validate_connect, validate_disconnect, validate_message, validate_signature};
