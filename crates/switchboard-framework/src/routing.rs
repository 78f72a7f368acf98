//! Route table construction.
//!
//! Turns controller descriptors into the immutable [`RouteTable`] the
//! dispatcher reads from:
//!
//! - connect and disconnect callbacks, in discovery order,
//! - one [`MessageRoute`] per message path, with its filter chain already
//!   ordered and its body type recorded.
//!
//! Every failure here is fatal. [`RouteTableBuilder::build`] either returns a
//! complete table or an error, never a partial table.
//!
//! ```rust,ignore
//! let registry = Arc::new(InstanceRegistry::new().with(ChatController::default()));
//!
//! let table = RouteTableBuilder::new(registry)
//!     .controller::<ChatController>()
//!     .build()?;
//! ```

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{debug, info, trace};

use switchboard_core::{
    BodyType, BuildError, BuildResult, ControllerDescriptor, HandlerArgs, HandlerKind,
    HandlerMethod, InstanceArc, InstanceRegistry, InvokeError, RoutePathConflict,
    SocketController, TypeToken, registered_controllers,
};

use crate::filter_chain::{FilterChain, panic_message};
use crate::signature::{validate_connect, validate_disconnect, validate_message};

// =============================================================================
// Bound handlers
// =============================================================================

/// A validated handler method bound to its owning instance.
#[derive(Clone)]
pub struct BoundHandler {
    owner: TypeToken,
    instance: InstanceArc,
    method: HandlerMethod,
}

impl BoundHandler {
    fn new(owner: TypeToken, instance: InstanceArc, method: HandlerMethod) -> Self {
        Self {
            owner,
            instance,
            method,
        }
    }

    /// The owning type.
    pub fn owner(&self) -> TypeToken {
        self.owner
    }

    /// The method name.
    pub fn method_name(&self) -> &'static str {
        self.method.name()
    }

    /// Invokes the handler, turning a panic into [`InvokeError::Panicked`].
    pub async fn invoke(&self, args: HandlerArgs) -> Result<(), InvokeError> {
        let instance = Arc::clone(&self.instance);
        let method = &self.method;

        AssertUnwindSafe(async move { method.invoke(instance, args).await })
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(InvokeError::Panicked(panic_message(&*panic))))
    }
}

impl fmt::Debug for BoundHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.owner.short_name(), self.method.name())
    }
}

/// A validated `(Session) -> ()` handler.
#[derive(Debug, Clone)]
pub struct ConnectCallback(BoundHandler);

impl ConnectCallback {
    /// The bound handler.
    pub fn handler(&self) -> &BoundHandler {
        &self.0
    }
}

/// A validated `(Session, CloseStatus) -> ()` handler.
#[derive(Debug, Clone)]
pub struct DisconnectCallback(BoundHandler);

impl DisconnectCallback {
    /// The bound handler.
    pub fn handler(&self) -> &BoundHandler {
        &self.0
    }
}

/// The binding of one message path to its filters and handler.
#[derive(Debug, Clone)]
pub struct MessageRoute {
    path: String,
    handler: BoundHandler,
    filters: FilterChain,
    body: BodyType,
    body_required: bool,
}

impl MessageRoute {
    /// The mapped path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The bound handler.
    pub fn handler(&self) -> &BoundHandler {
        &self.handler
    }

    /// The ordered filter chain.
    pub fn filters(&self) -> &FilterChain {
        &self.filters
    }

    /// The body type `T` of the handler's `Request<T>`.
    pub fn body_type(&self) -> BodyType {
        self.body
    }

    /// Whether a request without a body is rejected.
    pub fn is_body_required(&self) -> bool {
        self.body_required
    }
}

// =============================================================================
// Per-controller tables
// =============================================================================

/// Builds the connect callbacks of one controller.
pub fn build_connect_table(
    descriptor: &ControllerDescriptor,
    instance: &InstanceArc,
) -> BuildResult<Vec<ConnectCallback>> {
    let owner = descriptor.owner();
    let mut callbacks = Vec::new();

    for method in descriptor.methods() {
        if !matches!(method.handler_kind(), Some(HandlerKind::Connect)) {
            continue;
        }
        validate_connect(owner.name(), method)?;
        trace!(owner = %owner, method = method.name(), "Connect handler admitted");
        callbacks.push(ConnectCallback(BoundHandler::new(
            owner,
            Arc::clone(instance),
            method.clone(),
        )));
    }

    Ok(callbacks)
}

/// Builds the disconnect callbacks of one controller.
pub fn build_disconnect_table(
    descriptor: &ControllerDescriptor,
    instance: &InstanceArc,
) -> BuildResult<Vec<DisconnectCallback>> {
    let owner = descriptor.owner();
    let mut callbacks = Vec::new();

    for method in descriptor.methods() {
        if !matches!(method.handler_kind(), Some(HandlerKind::Disconnect)) {
            continue;
        }
        validate_disconnect(owner.name(), method)?;
        trace!(owner = %owner, method = method.name(), "Disconnect handler admitted");
        callbacks.push(DisconnectCallback(BoundHandler::new(
            owner,
            Arc::clone(instance),
            method.clone(),
        )));
    }

    Ok(callbacks)
}

/// Builds the message routes of one controller.
///
/// Two methods of the controller mapped to the same path are a
/// [`RoutePathConflict`].
pub fn build_message_table(
    descriptor: &ControllerDescriptor,
    instance: &InstanceArc,
    registry: &InstanceRegistry,
) -> BuildResult<HashMap<String, MessageRoute>> {
    let mut routes = HashMap::new();
    for route in message_routes(descriptor, instance, registry)? {
        insert_route(&mut routes, route)?;
    }
    Ok(routes)
}

/// Message routes of one controller, in declaration order.
fn message_routes(
    descriptor: &ControllerDescriptor,
    instance: &InstanceArc,
    registry: &InstanceRegistry,
) -> BuildResult<Vec<MessageRoute>> {
    let owner = descriptor.owner();
    let mut routes = Vec::new();

    for method in descriptor.methods() {
        let Some(HandlerKind::Message(mapping)) = method.handler_kind() else {
            continue;
        };

        let body = validate_message(owner.name(), method, mapping)?;
        let filters =
            FilterChain::resolve(owner.name(), method.name(), mapping.filter_refs(), registry)?;

        trace!(
            owner = %owner,
            method = method.name(),
            path = mapping.path(),
            filters = filters.len(),
            "Message handler admitted"
        );

        routes.push(MessageRoute {
            path: mapping.path().to_owned(),
            handler: BoundHandler::new(owner, Arc::clone(instance), method.clone()),
            filters,
            body,
            body_required: mapping.is_body_required(),
        });
    }

    Ok(routes)
}

fn insert_route(
    routes: &mut HashMap<String, MessageRoute>,
    route: MessageRoute,
) -> Result<(), RoutePathConflict> {
    match routes.entry(route.path.clone()) {
        Entry::Occupied(existing) => {
            let existing = existing.get().handler();
            Err(RoutePathConflict {
                path: route.path,
                owner: route.handler.owner().name(),
                method: route.handler.method_name(),
                existing_owner: existing.owner().name(),
                existing_method: existing.method_name(),
            })
        }
        Entry::Vacant(slot) => {
            slot.insert(route);
            Ok(())
        }
    }
}

// =============================================================================
// RouteTable
// =============================================================================

/// The immutable routing state shared by every dispatch.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    connect: Vec<ConnectCallback>,
    disconnect: Vec<DisconnectCallback>,
    routes: HashMap<String, MessageRoute>,
}

impl RouteTable {
    /// Starts a builder resolving instances from `registry`.
    pub fn builder(registry: Arc<InstanceRegistry>) -> RouteTableBuilder {
        RouteTableBuilder::new(registry)
    }

    /// Connect callbacks, in registration order.
    pub fn connect_callbacks(&self) -> &[ConnectCallback] {
        &self.connect
    }

    /// Disconnect callbacks, in registration order.
    pub fn disconnect_callbacks(&self) -> &[DisconnectCallback] {
        &self.disconnect
    }

    /// Looks up the route for `path`.
    pub fn route(&self, path: &str) -> Option<&MessageRoute> {
        self.routes.get(path)
    }

    /// Every mapped path, in no particular order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }

    /// Number of message routes.
    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    /// Returns `true` if the table holds no handler at all.
    pub fn is_empty(&self) -> bool {
        self.connect.is_empty() && self.disconnect.is_empty() && self.routes.is_empty()
    }
}

/// Collects controllers and builds a [`RouteTable`].
pub struct RouteTableBuilder {
    registry: Arc<InstanceRegistry>,
    descriptors: Vec<ControllerDescriptor>,
}

impl RouteTableBuilder {
    /// Creates a builder resolving instances from `registry`.
    pub fn new(registry: Arc<InstanceRegistry>) -> Self {
        Self {
            registry,
            descriptors: Vec::new(),
        }
    }

    /// Adds controller `C`. Its instance must be in the registry at build time.
    pub fn controller<C: SocketController>(self) -> Self {
        self.descriptor(C::descriptor())
    }

    /// Registers `instance` and adds its controller type.
    pub fn controller_instance<C: SocketController>(self, instance: C) -> Self {
        self.registry.insert(Arc::new(instance));
        self.controller::<C>()
    }

    /// Adds a raw descriptor.
    pub fn descriptor(mut self, descriptor: ControllerDescriptor) -> Self {
        if self.descriptors.iter().any(|d| d.owner() == descriptor.owner()) {
            debug!(owner = %descriptor.owner(), "Controller already added, skipping");
        } else {
            self.descriptors.push(descriptor);
        }
        self
    }

    /// Adds every controller registered with `#[socket_controller]`.
    pub fn discovered(mut self) -> Self {
        for entry in registered_controllers() {
            trace!(controller = entry.name, "Discovered controller");
            self = self.descriptor((entry.describe)());
        }
        self
    }

    /// Number of controllers added so far.
    pub fn controller_count(&self) -> usize {
        self.descriptors.len()
    }

    /// Builds the table.
    ///
    /// Fails on the first signature mismatch, path conflict or unresolvable
    /// instance. Nothing is returned on failure.
    pub fn build(self) -> BuildResult<RouteTable> {
        let mut table = RouteTable::default();

        for descriptor in &self.descriptors {
            let owner = descriptor.owner();
            let instance = self
                .registry
                .get_raw(owner.id())
                .ok_or(BuildError::UnresolvedInstance(owner))?;

            table
                .connect
                .extend(build_connect_table(descriptor, &instance)?);
            table
                .disconnect
                .extend(build_disconnect_table(descriptor, &instance)?);
            for route in message_routes(descriptor, &instance, &self.registry)? {
                insert_route(&mut table.routes, route)?;
            }
        }

        info!(
            controllers = self.descriptors.len(),
            connect = table.connect.len(),
            disconnect = table.disconnect.len(),
            routes = table.routes.len(),
            "Route table built"
        );

        Ok(table)
    }
}

impl fmt::Debug for RouteTableBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteTableBuilder")
            .field("controllers", &self.descriptors.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use switchboard_core::{
        CloseStatus, MappingSignatureError, MessageMapping, MethodSignature, Request,
        RequestView, Session, SocketFilter,
    };

    #[derive(Default)]
    struct Lobby {
        joins: AtomicUsize,
    }

    impl SocketController for Lobby {
        fn handler_methods() -> Vec<HandlerMethod> {
            vec![
                HandlerMethod::connect::<Self, _, _>("joined", |this, _session| async move {
                    this.joins.fetch_add(1, Ordering::SeqCst);
                }),
                HandlerMethod::disconnect::<Self, _, _>("left", |_, _, _| async {}),
                HandlerMethod::message::<Self, String, _, _>(
                    "echo",
                    MessageMapping::new("/echo"),
                    |_, _| async {},
                ),
                HandlerMethod::new(
                    "helper",
                    MethodSignature::new(vec![TypeToken::of::<u32>()], TypeToken::of::<u32>()),
                    |_, _| async { Ok(()) }.boxed(),
                ),
            ]
        }
    }

    #[derive(Default)]
    struct Echoes;

    impl SocketController for Echoes {
        fn handler_methods() -> Vec<HandlerMethod> {
            vec![
                HandlerMethod::message::<Self, String, _, _>(
                    "other_echo",
                    MessageMapping::new("/echo"),
                    |_, _| async {},
                ),
                HandlerMethod::message::<Self, String, _, _>(
                    "shout",
                    MessageMapping::new("/shout"),
                    |_, _| async {},
                ),
            ]
        }
    }

    struct Gate;

    #[async_trait]
    impl SocketFilter for Gate {
        async fn do_filter(&self, _: &Session, _: &str, _: &dyn RequestView) -> bool {
            true
        }

        fn priority(&self) -> Option<i32> {
            Some(1)
        }
    }

    fn registry() -> Arc<InstanceRegistry> {
        Arc::new(
            InstanceRegistry::new()
                .with(Lobby::default())
                .with(Echoes)
                .with(Gate),
        )
    }

    #[test]
    fn test_builds_all_kinds_and_skips_unmarked() {
        let table = RouteTable::builder(registry())
            .controller::<Lobby>()
            .build()
            .unwrap();

        assert_eq!(table.connect_callbacks().len(), 1);
        assert_eq!(table.disconnect_callbacks().len(), 1);
        assert_eq!(table.route_count(), 1);

        let route = table.route("/echo").unwrap();
        assert_eq!(route.handler().method_name(), "echo");
        assert!(route.body_type().body().is::<String>());
        assert!(route.is_body_required());
        assert!(route.filters().is_empty());
    }

    #[test]
    fn test_path_conflict_across_controllers() {
        let err = RouteTable::builder(registry())
            .controller::<Lobby>()
            .controller::<Echoes>()
            .build()
            .unwrap_err();

        match err {
            BuildError::PathConflict(conflict) => {
                assert_eq!(conflict.path, "/echo");
                assert_eq!(conflict.method, "other_echo");
                assert_eq!(conflict.existing_method, "echo");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_path_conflict_within_controller() {
        let descriptor = ControllerDescriptor::new(
            TypeToken::of::<Echoes>(),
            vec![
                HandlerMethod::message::<Echoes, String, _, _>(
                    "a",
                    MessageMapping::new("/dup"),
                    |_, _| async {},
                ),
                HandlerMethod::message::<Echoes, u32, _, _>(
                    "b",
                    MessageMapping::new("/dup"),
                    |_, _| async {},
                ),
            ],
        );
        let instance: InstanceArc = Arc::new(Echoes);

        let err = build_message_table(&descriptor, &instance, &InstanceRegistry::new())
            .unwrap_err();
        assert!(matches!(err, BuildError::PathConflict(ref c) if c.path == "/dup"));
    }

    #[test]
    fn test_bad_connect_signature_is_fatal() {
        let descriptor = ControllerDescriptor::new(
            TypeToken::of::<Lobby>(),
            vec![
                HandlerMethod::new(
                    "joined",
                    MethodSignature::new(
                        vec![TypeToken::of::<Session>(), TypeToken::of::<CloseStatus>()],
                        TypeToken::unit(),
                    ),
                    |_, _| async { Ok(()) }.boxed(),
                )
                .kind(HandlerKind::Connect),
            ],
        );

        let err = RouteTable::builder(registry())
            .descriptor(descriptor)
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            BuildError::Signature(MappingSignatureError::ParameterCount {
                expected: 1,
                found: 2,
                ..
            })
        ));
    }

    #[test]
    fn test_unresolved_instance() {
        let err = RouteTable::builder(Arc::new(InstanceRegistry::new()))
            .controller::<Echoes>()
            .build()
            .unwrap_err();
        assert!(matches!(err, BuildError::UnresolvedInstance(owner) if owner.is::<Echoes>()));
    }

    #[test]
    fn test_controller_instance_registers_owner() {
        let registry = Arc::new(InstanceRegistry::new());
        let table = RouteTable::builder(Arc::clone(&registry))
            .controller_instance(Echoes)
            .build()
            .unwrap();

        assert!(registry.contains::<Echoes>());
        assert_eq!(table.route_count(), 2);
        assert_eq!(table.route("/shout").unwrap().handler().method_name(), "shout");
    }

    #[test]
    fn test_filters_resolved_from_registry() {
        let descriptor = ControllerDescriptor::new(
            TypeToken::of::<Echoes>(),
            vec![HandlerMethod::message::<Echoes, String, _, _>(
                "guarded",
                MessageMapping::new("/guarded").filter::<Gate>().optional_body(),
                |_, _| async {},
            )],
        );

        let table = RouteTable::builder(registry())
            .descriptor(descriptor)
            .build()
            .unwrap();
        let route = table.route("/guarded").unwrap();
        assert_eq!(route.filters().len(), 1);
        assert!(!route.is_body_required());
    }

    #[test]
    fn test_duplicate_controller_is_skipped() {
        let builder = RouteTable::builder(registry())
            .controller::<Echoes>()
            .controller::<Echoes>();
        assert_eq!(builder.controller_count(), 1);
        assert!(builder.build().is_ok());
    }

    #[tokio::test]
    async fn test_bound_handler_catches_panics() {
        let descriptor = ControllerDescriptor::new(
            TypeToken::of::<Lobby>(),
            vec![HandlerMethod::message::<Lobby, String, _, _>(
                "boom",
                MessageMapping::new("/boom"),
                |_, _: Request<String>| async { panic!("handler failed") },
            )],
        );
        let instance: InstanceArc = Arc::new(Lobby::default());
        let routes = build_message_table(&descriptor, &instance, &InstanceRegistry::new()).unwrap();

        let args = HandlerArgs::new().push(Request::new(String::from("x")));
        let result = routes["/boom"].handler().invoke(args).await;
        assert!(matches!(result, Err(InvokeError::Panicked(ref msg)) if msg == "handler failed"));
    }
}
