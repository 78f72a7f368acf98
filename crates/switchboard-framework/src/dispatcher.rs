//! Socket event dispatcher.
//!
//! The [`Dispatcher`] receives socket events from the transport and runs
//! them against a built [`RouteTable`]. A message event goes through:
//!
//! 1. route lookup by path,
//! 2. decoding into the route's `Request<T>`, with the session attached,
//! 3. the route's filter chain, in order,
//! 4. the body check, when the route requires a body,
//! 5. the handler.
//!
//! A refusal at step 2, 3 or 4 sends exactly one error [`Response`] to the
//! originating session and ends the event. A handler fault is logged and
//! swallowed. Nothing that happens while dispatching one event can affect
//! another.
//!
//! # Tower Service Integration
//!
//! `Dispatcher` implements `tower::Service<SocketEvent>`, so transports can
//! wrap it in Tower middleware:
//!
//! ```rust,ignore
//! use tower::ServiceBuilder;
//! use tower::limit::ConcurrencyLimitLayer;
//!
//! let service = ServiceBuilder::new()
//!     .layer(ConcurrencyLimitLayer::new(64))
//!     .service(dispatcher);
//! ```

use std::convert::Infallible;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use serde_json::Value;
use tower::Service;
use tracing::{Instrument, debug, debug_span, error, trace, warn};

use switchboard_core::{
    BoxedSender, CloseStatus, DecodeError, HandlerArgs, JsonDecoder, MessageSenderExt,
    PayloadDecoder, Response, ResponseError, Session, route_path,
};

use crate::filter_chain::FilterVerdict;
use crate::routing::{MessageRoute, RouteTable};

/// Default name of the payload field carrying the route path.
pub const DEFAULT_ROUTE_FIELD: &str = "reqPath";

// =============================================================================
// Options and outcomes
// =============================================================================

/// Runtime knobs of a [`Dispatcher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOptions {
    /// Payload field read by [`Dispatcher::dispatch_text`].
    pub route_field: String,
    /// Answer events for unmapped paths with an `UnknownPath` response
    /// instead of dropping them silently.
    pub reply_unknown_path: bool,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            route_field: DEFAULT_ROUTE_FIELD.to_owned(),
            reply_unknown_path: false,
        }
    }
}

/// Why a message event was refused.
#[derive(Debug, Clone)]
pub enum Rejection {
    /// The payload could not be decoded.
    Malformed(DecodeError),
    /// A filter refused the request.
    Filtered {
        /// Name of the refusing filter.
        filter: &'static str,
        /// Its position in execution order.
        position: usize,
    },
    /// The route requires a body and the request has none.
    BodyRequired,
}

impl Rejection {
    /// The response sent to the session for this rejection.
    pub fn response_error(&self) -> ResponseError {
        match self {
            Self::Malformed(_) => ResponseError::MalformedRequest,
            Self::Filtered { .. } => ResponseError::FilteringFail,
            Self::BodyRequired => ResponseError::RequestBodyRequired,
        }
    }
}

/// Terminal state of one dispatched event.
#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    /// The handler ran, whatever its own outcome.
    Done,
    /// The event was refused before reaching the handler.
    Rejected(Rejection),
    /// No route is mapped to the event's path.
    Unrouted,
}

impl DispatchOutcome {
    /// Returns `true` if the handler was invoked.
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }

    /// Returns `true` if the event was refused.
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }
}

/// An inbound socket event, as fed to the [`Service`] implementation.
#[derive(Debug, Clone)]
pub enum SocketEvent {
    /// A session opened.
    Connect(Session),
    /// A session closed.
    Disconnect(Session, CloseStatus),
    /// A raw frame whose route path is read from the payload.
    Text(Session, String),
    /// A raw payload for an already known path.
    Message {
        session: Session,
        path: String,
        payload: String,
    },
}

// =============================================================================
// Dispatcher
// =============================================================================

/// Runs socket events against a [`RouteTable`].
///
/// Cheap to clone; clones share the table, sender and decoder.
#[derive(Clone)]
pub struct Dispatcher {
    table: Arc<RouteTable>,
    sender: BoxedSender,
    decoder: Arc<dyn PayloadDecoder>,
    options: Arc<DispatchOptions>,
}

impl Dispatcher {
    /// Creates a dispatcher decoding JSON payloads.
    pub fn new(table: RouteTable, sender: BoxedSender) -> Self {
        Self {
            table: Arc::new(table),
            sender,
            decoder: Arc::new(JsonDecoder),
            options: Arc::new(DispatchOptions::default()),
        }
    }

    /// Replaces the payload decoder.
    pub fn with_decoder(mut self, decoder: impl PayloadDecoder + 'static) -> Self {
        self.decoder = Arc::new(decoder);
        self
    }

    /// Replaces the options.
    pub fn with_options(mut self, options: DispatchOptions) -> Self {
        self.options = Arc::new(options);
        self
    }

    /// The route table.
    pub fn table(&self) -> &RouteTable {
        &self.table
    }

    /// The options.
    pub fn options(&self) -> &DispatchOptions {
        &self.options
    }

    /// Runs every connect callback for `session`, in registration order.
    pub async fn dispatch_connect(&self, session: &Session) {
        let span = debug_span!("dispatch_connect", session_id = %session.id());

        async {
            for callback in self.table.connect_callbacks() {
                let handler = callback.handler();
                let args = HandlerArgs::new().push(session.clone());
                if let Err(e) = handler.invoke(args).await {
                    error!(handler = ?handler, error = %e, "Connect handler failed");
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Runs every disconnect callback for `session`, in registration order.
    pub async fn dispatch_disconnect(&self, session: &Session, status: &CloseStatus) {
        let span = debug_span!(
            "dispatch_disconnect",
            session_id = %session.id(),
            status = status.code()
        );

        async {
            for callback in self.table.disconnect_callbacks() {
                let handler = callback.handler();
                let args = HandlerArgs::new().push(session.clone()).push(status.clone());
                if let Err(e) = handler.invoke(args).await {
                    error!(handler = ?handler, error = %e, "Disconnect handler failed");
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Dispatches a raw payload on a known path.
    pub async fn dispatch_message(
        &self,
        session: &Session,
        path: &str,
        raw: &str,
    ) -> DispatchOutcome {
        let span = debug_span!("dispatch_message", session_id = %session.id(), path);

        async {
            let Some(route) = self.table.route(path) else {
                return self.unrouted(session, path).await;
            };

            match self.decoder.decode(raw) {
                Ok(payload) => self.run_route(session, route, raw, payload).await,
                Err(e) => self.reject(session, path, Rejection::Malformed(e)).await,
            }
        }
        .instrument(span)
        .await
    }

    /// Dispatches a raw frame, reading its path from the configured field.
    pub async fn dispatch_text(&self, session: &Session, raw: &str) -> DispatchOutcome {
        let span = debug_span!(
            "dispatch_text",
            session_id = %session.id(),
            path = tracing::field::Empty
        );

        async {
            let payload = match self.decoder.decode(raw) {
                Ok(payload) => payload,
                Err(e) => return self.reject_unpathed(session, Rejection::Malformed(e)).await,
            };
            let path = match route_path(&payload, &self.options.route_field) {
                Ok(path) => path,
                Err(e) => return self.reject_unpathed(session, Rejection::Malformed(e)).await,
            };
            tracing::Span::current().record("path", path.as_str());

            match self.table.route(&path) {
                Some(route) => self.run_route(session, route, raw, payload).await,
                None => self.unrouted(session, &path).await,
            }
        }
        .instrument(span)
        .await
    }

    /// Dispatches one [`SocketEvent`].
    pub async fn handle(&self, event: SocketEvent) -> DispatchOutcome {
        match event {
            SocketEvent::Connect(session) => {
                self.dispatch_connect(&session).await;
                DispatchOutcome::Done
            }
            SocketEvent::Disconnect(session, status) => {
                self.dispatch_disconnect(&session, &status).await;
                DispatchOutcome::Done
            }
            SocketEvent::Text(session, raw) => self.dispatch_text(&session, &raw).await,
            SocketEvent::Message {
                session,
                path,
                payload,
            } => self.dispatch_message(&session, &path, &payload).await,
        }
    }

    async fn run_route(
        &self,
        session: &Session,
        route: &MessageRoute,
        raw: &str,
        payload: Value,
    ) -> DispatchOutcome {
        let path = route.path();

        let mut request = match route.body_type().decode(payload) {
            Ok(request) => request,
            Err(e) => return self.reject(session, path, Rejection::Malformed(e)).await,
        };
        request.attach_session(session.id().clone());

        if let FilterVerdict::Rejected { filter, position } =
            route.filters().run(session, raw, request.as_view()).await
        {
            return self
                .reject(session, path, Rejection::Filtered { filter, position })
                .await;
        }

        if route.is_body_required() && !request.has_body() {
            return self.reject(session, path, Rejection::BodyRequired).await;
        }

        let handler = route.handler();
        let args = HandlerArgs::new().push_boxed(request.into_any());
        match handler.invoke(args).await {
            Ok(()) => trace!(handler = ?handler, "Handler completed"),
            Err(e) => error!(handler = ?handler, error = %e, "Message handler failed"),
        }

        DispatchOutcome::Done
    }

    async fn reject(&self, session: &Session, path: &str, rejection: Rejection) -> DispatchOutcome {
        debug!(rejection = ?rejection, "Request rejected");
        let response = rejection.response_error().response().with_path(path);
        self.send(session, &response).await;
        DispatchOutcome::Rejected(rejection)
    }

    async fn reject_unpathed(&self, session: &Session, rejection: Rejection) -> DispatchOutcome {
        warn!(rejection = ?rejection, "Frame carries no route path, rejecting");
        self.send(session, &rejection.response_error().response()).await;
        DispatchOutcome::Rejected(rejection)
    }

    async fn unrouted(&self, session: &Session, path: &str) -> DispatchOutcome {
        warn!(path, "No route mapped to path, dropping event");
        if self.options.reply_unknown_path {
            let response = ResponseError::UnknownPath.response().with_path(path);
            self.send(session, &response).await;
        }
        DispatchOutcome::Unrouted
    }

    async fn send(&self, session: &Session, response: &Response) {
        if let Err(e) = self.sender.send_response(session.id(), response).await {
            warn!(error = %e, "Failed to send response");
        }
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("route_count", &self.table.route_count())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Tower Service Implementation
// =============================================================================

impl Service<SocketEvent> for Dispatcher {
    type Response = DispatchOutcome;
    type Error = Infallible;
    type Future =
        Pin<Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, event: SocketEvent) -> Self::Future {
        let dispatcher = self.clone();
        Box::pin(async move { Ok(dispatcher.handle(event).await) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log_capture::Captured;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use switchboard_core::{
        HandlerMethod, InstanceRegistry, MessageMapping, MessageSender, Request, RequestView,
        SendError, SessionId, SocketController, SocketFilter,
    };
    use tower::ServiceExt;

    /// Records every outbound payload.
    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<(SessionId, String)>>,
    }

    impl Recorder {
        fn responses(&self) -> Vec<Response> {
            self.sent
                .lock()
                .iter()
                .map(|(_, payload)| serde_json::from_str(payload).unwrap())
                .collect()
        }
    }

    #[async_trait]
    impl MessageSender for Recorder {
        async fn send(&self, session_id: &SessionId, payload: String) -> Result<(), SendError> {
            self.sent.lock().push((session_id.clone(), payload));
            Ok(())
        }
    }

    #[derive(Default)]
    struct Chat {
        connects: AtomicUsize,
        disconnects: AtomicUsize,
        echoes: Mutex<Vec<Option<String>>>,
        guarded: AtomicUsize,
        pings: AtomicUsize,
    }

    impl SocketController for Chat {
        fn handler_methods() -> Vec<HandlerMethod> {
            vec![
                HandlerMethod::connect::<Self, _, _>("first_connect", |_, _| async {
                    panic!("connect handler failed")
                }),
                HandlerMethod::connect::<Self, _, _>("second_connect", |this, _| async move {
                    this.connects.fetch_add(1, Ordering::SeqCst);
                }),
                HandlerMethod::disconnect::<Self, _, _>("left", |this, _, status| async move {
                    assert_eq!(status.code(), 1000);
                    this.disconnects.fetch_add(1, Ordering::SeqCst);
                }),
                HandlerMethod::message::<Self, String, _, _>(
                    "echo",
                    MessageMapping::new("/echo"),
                    |this, request: Request<String>| async move {
                        assert_eq!(request.session_id.as_str(), "s-1");
                        this.echoes.lock().push(request.into_body());
                    },
                ),
                HandlerMethod::message::<Self, String, _, _>(
                    "guarded",
                    MessageMapping::new("/guarded")
                        .filter::<Third>()
                        .filter::<Rejecting>()
                        .filter::<First>(),
                    |this, _| async move {
                        this.guarded.fetch_add(1, Ordering::SeqCst);
                    },
                ),
                HandlerMethod::message::<Self, serde_json::Value, _, _>(
                    "ping",
                    MessageMapping::new("/ping").optional_body(),
                    |this, _| async move {
                        this.pings.fetch_add(1, Ordering::SeqCst);
                    },
                ),
                HandlerMethod::message::<Self, u32, _, _>(
                    "crash",
                    MessageMapping::new("/crash"),
                    |_, _| async { panic!("message handler failed") },
                ),
            ]
        }
    }

    /// Counts calls; admits.
    #[derive(Default)]
    struct First(AtomicUsize);

    #[async_trait]
    impl SocketFilter for First {
        async fn do_filter(&self, _: &Session, _: &str, request: &dyn RequestView) -> bool {
            assert_eq!(request.session_id().as_str(), "s-1");
            self.0.fetch_add(1, Ordering::SeqCst);
            true
        }

        fn priority(&self) -> Option<i32> {
            Some(1)
        }
    }

    /// Counts calls; rejects.
    #[derive(Default)]
    struct Rejecting(AtomicUsize);

    #[async_trait]
    impl SocketFilter for Rejecting {
        async fn do_filter(&self, _: &Session, _: &str, _: &dyn RequestView) -> bool {
            self.0.fetch_add(1, Ordering::SeqCst);
            false
        }

        fn priority(&self) -> Option<i32> {
            Some(2)
        }
    }

    /// Counts calls; admits.
    #[derive(Default)]
    struct Third(AtomicUsize);

    #[async_trait]
    impl SocketFilter for Third {
        async fn do_filter(&self, _: &Session, _: &str, _: &dyn RequestView) -> bool {
            self.0.fetch_add(1, Ordering::SeqCst);
            true
        }

        fn priority(&self) -> Option<i32> {
            Some(3)
        }
    }

    struct Fixture {
        dispatcher: Dispatcher,
        registry: Arc<InstanceRegistry>,
        recorder: Arc<Recorder>,
    }

    impl Fixture {
        fn new() -> Self {
            Self::with_options(DispatchOptions::default())
        }

        fn with_options(options: DispatchOptions) -> Self {
            let registry = Arc::new(
                InstanceRegistry::new()
                    .with(Chat::default())
                    .with(First::default())
                    .with(Rejecting::default())
                    .with(Third::default()),
            );
            let table = RouteTable::builder(Arc::clone(&registry))
                .controller::<Chat>()
                .build()
                .unwrap();
            let recorder = Arc::new(Recorder::default());
            let dispatcher = Dispatcher::new(table, recorder.clone()).with_options(options);
            Self {
                dispatcher,
                registry,
                recorder,
            }
        }

        fn chat(&self) -> Arc<Chat> {
            self.registry.get::<Chat>().unwrap()
        }

        fn count<F: SocketFilter + Counted>(&self) -> usize {
            self.registry.get::<F>().unwrap().calls()
        }
    }

    /// Filters that count their invocations.
    trait Counted {
        fn calls(&self) -> usize;
    }

    impl Counted for First {
        fn calls(&self) -> usize {
            self.0.load(Ordering::SeqCst)
        }
    }

    impl Counted for Rejecting {
        fn calls(&self) -> usize {
            self.0.load(Ordering::SeqCst)
        }
    }

    impl Counted for Third {
        fn calls(&self) -> usize {
            self.0.load(Ordering::SeqCst)
        }
    }

    fn session() -> Session {
        Session::new("s-1")
    }

    #[tokio::test]
    async fn test_echo_round_trip() {
        let fx = Fixture::new();

        let outcome = fx
            .dispatcher
            .dispatch_message(&session(), "/echo", r#"{"requestBody":"hi"}"#)
            .await;

        assert!(outcome.is_done());
        assert_eq!(*fx.chat().echoes.lock(), [Some(String::from("hi"))]);
        assert!(fx.recorder.responses().is_empty());
    }

    #[tokio::test]
    async fn test_filter_short_circuit_sends_one_response() {
        let fx = Fixture::new();

        let outcome = fx
            .dispatcher
            .dispatch_message(&session(), "/guarded", r#"{"requestBody":"x"}"#)
            .await;

        assert!(matches!(
            outcome,
            DispatchOutcome::Rejected(Rejection::Filtered { position: 1, .. })
        ));
        assert_eq!(fx.count::<First>(), 1);
        assert_eq!(fx.count::<Rejecting>(), 1);
        assert_eq!(fx.count::<Third>(), 0);
        assert_eq!(fx.chat().guarded.load(Ordering::SeqCst), 0);

        let responses = fx.recorder.responses();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].code, 403);
        assert_eq!(responses[0].req_path.as_deref(), Some("/guarded"));
    }

    #[tokio::test]
    async fn test_missing_body_is_rejected() {
        let fx = Fixture::new();

        let outcome = fx
            .dispatcher
            .dispatch_message(&session(), "/echo", r#"{"reqPath":"/echo"}"#)
            .await;

        assert!(matches!(
            outcome,
            DispatchOutcome::Rejected(Rejection::BodyRequired)
        ));
        assert!(fx.chat().echoes.lock().is_empty());

        let responses = fx.recorder.responses();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].code, 400);
        assert_eq!(
            responses[0].message.as_deref(),
            Some(ResponseError::RequestBodyRequired.message())
        );
    }

    #[tokio::test]
    async fn test_optional_body_is_admitted() {
        let fx = Fixture::new();

        let outcome = fx
            .dispatcher
            .dispatch_message(&session(), "/ping", "{}")
            .await;

        assert!(outcome.is_done());
        assert_eq!(fx.chat().pings.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_handler_fault_is_isolated() {
        let fx = Fixture::new();

        let crashed = fx
            .dispatcher
            .dispatch_message(&session(), "/crash", r#"{"requestBody":7}"#)
            .await;
        assert!(crashed.is_done());

        let echoed = fx
            .dispatcher
            .dispatch_message(&session(), "/echo", r#"{"requestBody":"after"}"#)
            .await;
        assert!(echoed.is_done());
        assert_eq!(*fx.chat().echoes.lock(), [Some(String::from("after"))]);
        assert!(fx.recorder.responses().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_payload() {
        let fx = Fixture::new();

        let outcome = fx
            .dispatcher
            .dispatch_message(&session(), "/echo", r#"{"requestBody":12}"#)
            .await;

        assert!(matches!(
            outcome,
            DispatchOutcome::Rejected(Rejection::Malformed(DecodeError::Shape { .. }))
        ));
        assert_eq!(fx.recorder.responses()[0].code, 400);
    }

    #[tokio::test]
    async fn test_unrouted_is_dropped() {
        let fx = Fixture::new();

        let outcome = fx
            .dispatcher
            .dispatch_message(&session(), "/nowhere", "{}")
            .await;

        assert!(matches!(outcome, DispatchOutcome::Unrouted));
        assert!(fx.recorder.responses().is_empty());
    }

    #[tokio::test]
    async fn test_unrouted_reply_when_enabled() {
        let fx = Fixture::with_options(DispatchOptions {
            reply_unknown_path: true,
            ..DispatchOptions::default()
        });

        fx.dispatcher
            .dispatch_text(&session(), r#"{"reqPath":"/nowhere"}"#)
            .await;

        let responses = fx.recorder.responses();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].code, 404);
    }

    #[tokio::test]
    async fn test_dispatch_text_reads_route_field() {
        let fx = Fixture::new();

        let outcome = fx
            .dispatcher
            .dispatch_text(&session(), r#"{"reqPath":"/echo","requestBody":"hi"}"#)
            .await;
        assert!(outcome.is_done());

        let missing = fx.dispatcher.dispatch_text(&session(), r#"{"requestBody":"hi"}"#).await;
        assert!(matches!(
            missing,
            DispatchOutcome::Rejected(Rejection::Malformed(DecodeError::MissingPath(_)))
        ));
    }

    #[tokio::test]
    async fn test_unpathed_frame_is_logged_and_answered() {
        let fx = Fixture::new();
        let captured = Captured::default();
        let _guard = tracing::subscriber::set_default(captured.subscriber(tracing::Level::WARN));

        fx.dispatcher.dispatch_text(&session(), r#"{"requestBody":"hi"}"#).await;
        fx.dispatcher.dispatch_text(&session(), "not json").await;

        let output = captured.text();
        assert_eq!(output.matches("Frame carries no route path").count(), 2);
        let codes: Vec<_> = fx.recorder.responses().iter().map(|r| r.code).collect();
        assert_eq!(codes, vec![400, 400]);
    }

    #[tokio::test]
    async fn test_connect_and_disconnect_callbacks() {
        let fx = Fixture::new();

        fx.dispatcher.dispatch_connect(&session()).await;
        fx.dispatcher
            .dispatch_disconnect(&session(), &CloseStatus::NORMAL)
            .await;

        // The panicking connect callback does not stop the second one.
        assert_eq!(fx.chat().connects.load(Ordering::SeqCst), 1);
        assert_eq!(fx.chat().disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_tower_service() {
        let fx = Fixture::new();

        let outcome = fx
            .dispatcher
            .clone()
            .oneshot(SocketEvent::Message {
                session: session(),
                path: "/echo".into(),
                payload: r#"{"requestBody":"svc"}"#.into(),
            })
            .await
            .unwrap();

        assert!(outcome.is_done());
        assert_eq!(*fx.chat().echoes.lock(), [Some(String::from("svc"))]);
    }
}
