//! Procedural macros for Switchboard.
//!
//! This crate provides:
//!
//! - `#[socket_controller]` - Exposes the methods of an `impl` block as
//!   socket event handlers
//!
//! # Socket Controllers
//!
//! ```rust,ignore
//! use switchboard::prelude::*;
//!
//! #[derive(Default)]
//! struct ChatController;
//!
//! #[socket_controller]
//! impl ChatController {
//!     #[on_connect]
//!     async fn joined(&self, session: Session) { /* ... */ }
//!
//!     #[on_disconnect]
//!     async fn left(&self, session: Session, status: CloseStatus) { /* ... */ }
//!
//!     #[socket_mapping(path = "/echo", filters(AuthFilter, RateLimit))]
//!     async fn echo(&self, request: Request<String>) { /* ... */ }
//! }
//! ```

mod controller;

use proc_macro::TokenStream;
use syn::{ItemImpl, parse_macro_input};

/// Implements `SocketController` for the type of an `impl` block.
///
/// Methods marked with one of the following attributes become handlers:
///
/// - `#[on_connect]` - `(&self, Session)`
/// - `#[on_disconnect]` - `(&self, Session, CloseStatus)`
/// - `#[socket_mapping(path = "...")]` - `(&self, Request<T>)`, with optional
///   `filters(A, B, ...)` and `optional_body`
///
/// Signatures are recorded exactly as written and checked when the route
/// table is built, so a mis-declared handler fails at startup.
///
/// Unless written as `#[socket_controller(manual)]`, the controller is also
/// registered in `switchboard_core::SOCKET_CONTROLLERS` for discovery.
///
/// # Errors
///
/// Compile errors are raised for:
/// - a method carrying more than one handler attribute,
/// - a handler taking `&mut self`, `self` or no receiver,
/// - a `socket_mapping` without `path`.
#[proc_macro_attribute]
pub fn socket_controller(attr: TokenStream, item: TokenStream) -> TokenStream {
    let options = parse_macro_input!(attr as controller::ControllerOptions);
    let item = parse_macro_input!(item as ItemImpl);

    match controller::expand(options, item) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}
