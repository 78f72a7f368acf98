//! Handler descriptors.
//!
//! A handler-owning type (a *controller*) describes its socket handlers as a
//! list of [`HandlerMethod`]s. Each method records:
//!
//! - its name,
//! - its declared [`MethodSignature`] (parameter and return type tokens),
//! - its event kind, if any ([`HandlerKind`]),
//! - an erased invoker that downcasts the owner and the positional
//!   arguments and calls the real method.
//!
//! Descriptors are usually generated by `#[socket_controller]`, which
//! records signatures exactly as written. Nothing here checks that a
//! signature fits its kind: that is the route table builder's job, so a
//! mis-declared handler fails startup instead of compilation.
//!
//! The typed constructors ([`HandlerMethod::connect`],
//! [`HandlerMethod::disconnect`], [`HandlerMethod::message`]) build
//! well-formed descriptors by hand.

use std::any::{Any, type_name};
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use linkme::distributed_slice;
use serde::de::DeserializeOwned;

use crate::codec::BodyType;
use crate::envelope::Request;
use crate::error::InvokeError;
use crate::filter::{FilterRef, SocketFilter};
use crate::registry::InstanceArc;
use crate::session::{CloseStatus, Session};
use crate::types::TypeToken;

// =============================================================================
// Arguments and invokers
// =============================================================================

/// Positional arguments for one handler invocation.
#[derive(Default)]
pub struct HandlerArgs {
    args: VecDeque<Box<dyn Any + Send>>,
    taken: usize,
}

impl HandlerArgs {
    /// Creates an empty argument list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an argument.
    pub fn push<T: Send + 'static>(self, value: T) -> Self {
        self.push_boxed(Box::new(value))
    }

    /// Appends an already boxed argument.
    pub fn push_boxed(mut self, value: Box<dyn Any + Send>) -> Self {
        self.args.push_back(value);
        self
    }

    /// Takes the next argument as a `T`.
    pub fn take<T: 'static>(&mut self) -> Result<T, InvokeError> {
        let position = self.taken;
        self.taken += 1;
        let arg = self
            .args
            .pop_front()
            .ok_or(InvokeError::MissingArgument(position))?;
        arg.downcast::<T>()
            .map(|value| *value)
            .map_err(|_| InvokeError::ArgumentType {
                position,
                expected: type_name::<T>(),
            })
    }

    /// Number of arguments not taken yet.
    pub fn len(&self) -> usize {
        self.args.len()
    }

    /// Returns `true` if every argument was taken.
    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }
}

/// Downcasts a resolved owner instance to the controller type.
pub fn downcast_owner<C: Send + Sync + 'static>(owner: InstanceArc) -> Result<Arc<C>, InvokeError> {
    owner
        .downcast::<C>()
        .map_err(|_| InvokeError::OwnerMismatch(type_name::<C>()))
}

/// Type-erased handler invoker.
pub type Invoker = Arc<
    dyn Fn(InstanceArc, HandlerArgs) -> BoxFuture<'static, Result<(), InvokeError>> + Send + Sync,
>;

// =============================================================================
// Signatures and kinds
// =============================================================================

/// Declared parameter and return types of a handler method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSignature {
    params: Vec<TypeToken>,
    returns: TypeToken,
}

impl MethodSignature {
    /// Creates a signature.
    pub fn new(params: Vec<TypeToken>, returns: TypeToken) -> Self {
        Self { params, returns }
    }

    /// Declared parameter types, in order, receiver excluded.
    pub fn params(&self) -> &[TypeToken] {
        &self.params
    }

    /// Declared return type.
    pub fn returns(&self) -> TypeToken {
        self.returns
    }

    /// Number of declared parameters.
    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

/// Metadata of a message handler.
#[derive(Debug, Clone)]
pub struct MessageMapping {
    path: String,
    filters: Vec<FilterRef>,
    body: Option<BodyType>,
    body_required: bool,
}

impl MessageMapping {
    /// Maps a handler to `path`. The body is required by default.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            filters: Vec::new(),
            body: None,
            body_required: true,
        }
    }

    /// Appends filter `F` to the declared filter list.
    pub fn filter<F: SocketFilter>(mut self) -> Self {
        self.filters.push(FilterRef::of::<F>());
        self
    }

    /// Replaces the declared filter list.
    pub fn filters(mut self, filters: Vec<FilterRef>) -> Self {
        self.filters = filters;
        self
    }

    /// Records the body type inferred from the handler's `Request<T>`.
    pub fn body(mut self, body: BodyType) -> Self {
        self.body = Some(body);
        self
    }

    /// Admits requests without a body.
    pub fn optional_body(mut self) -> Self {
        self.body_required = false;
        self
    }

    /// The mapped path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Declared filters, in declaration order.
    pub fn filter_refs(&self) -> &[FilterRef] {
        &self.filters
    }

    /// The inferred body type, if the parameter is a `Request<T>`.
    pub fn body_type(&self) -> Option<BodyType> {
        self.body
    }

    /// Whether requests without a body are rejected.
    pub fn is_body_required(&self) -> bool {
        self.body_required
    }
}

/// The socket event a handler method is declared for.
#[derive(Debug, Clone)]
pub enum HandlerKind {
    /// Session opened: `(Session) -> ()`.
    Connect,
    /// Session closed: `(Session, CloseStatus) -> ()`.
    Disconnect,
    /// Message on a path: `(Request<T>) -> ()`.
    Message(MessageMapping),
}

// =============================================================================
// HandlerMethod
// =============================================================================

/// One discovered method of a controller.
#[derive(Clone)]
pub struct HandlerMethod {
    name: &'static str,
    signature: MethodSignature,
    kind: Option<HandlerKind>,
    invoker: Invoker,
}

impl HandlerMethod {
    /// Creates a descriptor from raw parts, without event metadata.
    pub fn new<F>(name: &'static str, signature: MethodSignature, invoker: F) -> Self
    where
        F: Fn(InstanceArc, HandlerArgs) -> BoxFuture<'static, Result<(), InvokeError>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name,
            signature,
            kind: None,
            invoker: Arc::new(invoker),
        }
    }

    /// Sets the event kind.
    pub fn kind(mut self, kind: HandlerKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Typed connect handler.
    pub fn connect<C, F, Fut>(name: &'static str, handler: F) -> Self
    where
        C: Send + Sync + 'static,
        F: Fn(Arc<C>, Session) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let signature = MethodSignature::new(vec![TypeToken::of::<Session>()], TypeToken::unit());
        Self::new(name, signature, move |owner, mut args| {
            let call = downcast_owner::<C>(owner)
                .and_then(|this| Ok((this, args.take::<Session>()?)))
                .map(|(this, session)| handler(this, session));
            async move {
                call?.await;
                Ok::<(), InvokeError>(())
            }
            .boxed()
        })
        .kind(HandlerKind::Connect)
    }

    /// Typed disconnect handler.
    pub fn disconnect<C, F, Fut>(name: &'static str, handler: F) -> Self
    where
        C: Send + Sync + 'static,
        F: Fn(Arc<C>, Session, CloseStatus) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let signature = MethodSignature::new(
            vec![TypeToken::of::<Session>(), TypeToken::of::<CloseStatus>()],
            TypeToken::unit(),
        );
        Self::new(name, signature, move |owner, mut args| {
            let call = downcast_owner::<C>(owner)
                .and_then(|this| {
                    let session = args.take::<Session>()?;
                    let status = args.take::<CloseStatus>()?;
                    Ok((this, session, status))
                })
                .map(|(this, session, status)| handler(this, session, status));
            async move {
                call?.await;
                Ok::<(), InvokeError>(())
            }
            .boxed()
        })
        .kind(HandlerKind::Disconnect)
    }

    /// Typed message handler. The body type is taken from `Request<T>`.
    pub fn message<C, T, F, Fut>(name: &'static str, mapping: MessageMapping, handler: F) -> Self
    where
        C: Send + Sync + 'static,
        T: DeserializeOwned + Send + Sync + 'static,
        F: Fn(Arc<C>, Request<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let signature = MethodSignature::new(vec![TypeToken::of::<Request<T>>()], TypeToken::unit());
        Self::new(name, signature, move |owner, mut args| {
            let call = downcast_owner::<C>(owner)
                .and_then(|this| Ok((this, args.take::<Request<T>>()?)))
                .map(|(this, request)| handler(this, request));
            async move {
                call?.await;
                Ok::<(), InvokeError>(())
            }
            .boxed()
        })
        .kind(HandlerKind::Message(mapping.body(BodyType::of::<T>())))
    }

    /// The method name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The declared signature.
    pub fn signature(&self) -> &MethodSignature {
        &self.signature
    }

    /// The declared event kind, or `None` for a method without metadata.
    pub fn handler_kind(&self) -> Option<&HandlerKind> {
        self.kind.as_ref()
    }

    /// Invokes the method on `owner` with `args`.
    pub fn invoke(
        &self,
        owner: InstanceArc,
        args: HandlerArgs,
    ) -> BoxFuture<'static, Result<(), InvokeError>> {
        (self.invoker)(owner, args)
    }
}

impl fmt::Debug for HandlerMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerMethod")
            .field("name", &self.name)
            .field("signature", &self.signature)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Controllers
// =============================================================================

/// A type whose methods are exposed as socket event handlers.
///
/// Usually implemented by `#[socket_controller]`.
pub trait SocketController: Send + Sync + Sized + 'static {
    /// Every handler method declared by this type, in declaration order.
    fn handler_methods() -> Vec<HandlerMethod>;

    /// The full descriptor of this type.
    fn descriptor() -> ControllerDescriptor {
        ControllerDescriptor::new(TypeToken::of::<Self>(), Self::handler_methods())
    }
}

/// The handler methods of one controller type.
#[derive(Debug, Clone)]
pub struct ControllerDescriptor {
    owner: TypeToken,
    methods: Vec<HandlerMethod>,
}

impl ControllerDescriptor {
    /// Creates a descriptor.
    pub fn new(owner: TypeToken, methods: Vec<HandlerMethod>) -> Self {
        Self { owner, methods }
    }

    /// The controller type.
    pub fn owner(&self) -> TypeToken {
        self.owner
    }

    /// The controller's handler methods.
    pub fn methods(&self) -> &[HandlerMethod] {
        &self.methods
    }
}

/// Static registration record of a controller.
pub struct ControllerEntry {
    /// Controller type name as written at the registration site.
    pub name: &'static str,
    /// Produces the controller's descriptor.
    pub describe: fn() -> ControllerDescriptor,
}

impl ControllerEntry {
    /// Creates an entry. Used by `#[socket_controller]`.
    pub const fn new(name: &'static str, describe: fn() -> ControllerDescriptor) -> Self {
        Self { name, describe }
    }
}

impl fmt::Debug for ControllerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerEntry")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Controllers registered by `#[socket_controller]` across the whole binary.
#[distributed_slice]
pub static SOCKET_CONTROLLERS: [ControllerEntry];

/// Iterates over every statically registered controller.
pub fn registered_controllers() -> impl Iterator<Item = &'static ControllerEntry> {
    SOCKET_CONTROLLERS.iter()
}
