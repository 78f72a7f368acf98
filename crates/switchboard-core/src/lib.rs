//! # Switchboard Core
//!
//! Foundation types and collaborator boundaries of the Switchboard socket
//! dispatcher.
//!
//! ## Foundation
//!
//! - **Type tokens**: runtime identity of declared parameter types ([`TypeToken`])
//! - **Sessions**: transport-owned connection handles ([`Session`], [`CloseStatus`])
//! - **Envelopes**: typed requests and responses ([`Request`], [`Response`])
//! - **Errors**: the build-time and runtime error taxonomy ([`BuildError`], ...)
//!
//! ## Boundaries
//!
//! The dispatcher consumes these as abstract capabilities:
//!
//! - **Handler discovery**: [`SocketController`] / [`ControllerDescriptor`],
//!   plus the [`SOCKET_CONTROLLERS`] static registry
//! - **Instance resolution**: [`InstanceRegistry`]
//! - **Payload decoding**: [`PayloadDecoder`] and [`BodyType`]
//! - **Message sending**: [`MessageSender`]
//! - **Admission filters**: [`SocketFilter`]
//!
//! ```text
//! ┌───────────┐  raw text   ┌────────────┐  Request<T>  ┌────────────┐
//! │ Transport │────────────▶│ Dispatcher │─────────────▶│ Controller │
//! └───────────┘             └────────────┘              └────────────┘
//!       ▲                          │ rejections
//!       └──────── MessageSender ◀──┘
//! ```

pub mod codec;
pub mod controller;
pub mod envelope;
pub mod error;
pub mod filter;
pub mod registry;
pub mod sender;
pub mod session;
pub mod types;

pub use codec::{BodyType, JsonDecoder, PayloadDecoder, route_path};
pub use controller::{
    ControllerDescriptor, ControllerEntry, HandlerArgs, HandlerKind, HandlerMethod, Invoker,
    MessageMapping, MethodSignature, SOCKET_CONTROLLERS, SocketController, downcast_owner,
    registered_controllers,
};
pub use envelope::{
    DecodedRequest, Request, RequestView, Response, ResponseError, ResponseStatus,
};
pub use error::{
    BuildError, BuildResult, DecodeError, InvokeError, MappingSignatureError, RoutePathConflict,
    SendError,
};
pub use filter::{FilterRef, SocketFilter};
pub use registry::{InstanceArc, InstanceRegistry};
pub use sender::{BoxedSender, MessageSender, MessageSenderExt};
pub use session::{CloseStatus, Session, SessionBuilder, SessionId};
pub use types::TypeToken;

// Used by code generated in `switchboard-macros`.
#[doc(hidden)]
pub use futures;
#[doc(hidden)]
pub use linkme;

/// Prelude for common imports.
pub mod prelude {
    pub use super::{
        CloseStatus, InstanceRegistry, MessageSender, MessageSenderExt, Request, RequestView,
        Response, Session, SessionId, SocketController, SocketFilter,
    };
}
