//! WebSocket server transport.
//!
//! Binds one TCP listener, upgrades requests on the configured path and
//! drives each socket through the [`Dispatcher`]:
//!
//! ```text
//! upgrade ──▶ register in hub ──▶ dispatch_connect
//!                │
//!   text frame ──┼──▶ dispatch_text      (one frame at a time per session)
//!                │
//!   close ───────┴──▶ remove from hub ──▶ dispatch_disconnect
//! ```
//!
//! Outbound payloads sent through the [`SessionHub`] are forwarded to the
//! socket by a per-session task.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::{
        ConnectInfo, State, WebSocketUpgrade,
        ws::{CloseFrame, Message, WebSocket},
    },
    http::HeaderMap,
    response::IntoResponse,
    routing::get,
};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use switchboard_core::{CloseStatus, Session};
use switchboard_framework::Dispatcher;

use crate::error::{TransportError, TransportResult};
use crate::hub::SessionHub;

// ─── Options and handle ───────────────────────────────────────────────────────

/// Where and how to listen.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Bind address, `host:port`.
    pub addr: String,
    /// Upgrade path, starting with `/`.
    pub path: String,
    /// Outbound channel capacity per session.
    pub outbound_buffer: usize,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:8080".to_string(),
            path: "/ws".to_string(),
            outbound_buffer: 256,
        }
    }
}

/// Handle to a running listener. Dropping it stops the listener.
#[derive(Debug)]
pub struct ListenerHandle {
    /// Unique identifier for this listener.
    pub id: String,
    local_addr: SocketAddr,
    shutdown_token: CancellationToken,
}

impl ListenerHandle {
    /// The address actually bound (resolves port `0`).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops the listener.
    pub fn shutdown(&self) {
        self.shutdown_token.cancel();
    }

    /// Completes once the listener was asked to stop.
    pub async fn stopped(&self) {
        self.shutdown_token.cancelled().await;
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.shutdown_token.cancel();
    }
}

// ─── Shared state ─────────────────────────────────────────────────────────────

struct ServerState {
    dispatcher: Dispatcher,
    hub: Arc<SessionHub>,
    outbound_buffer: usize,
}

// ─── Public entry point ───────────────────────────────────────────────────────

/// Binds `options.addr` and serves WebSocket upgrades on `options.path`.
///
/// The dispatcher's responses must go through `hub`, which is where the
/// sessions opened by this listener are registered.
pub async fn ws_listen(
    options: ServerOptions,
    dispatcher: Dispatcher,
    hub: Arc<SessionHub>,
) -> TransportResult<ListenerHandle> {
    if !options.path.starts_with('/') {
        return Err(TransportError::InvalidPath(options.path));
    }

    let bind_error = |e: std::io::Error| TransportError::Bind {
        addr: options.addr.clone(),
        reason: e.to_string(),
    };
    let listener = TcpListener::bind(&options.addr).await.map_err(bind_error)?;
    let local_addr = listener.local_addr().map_err(bind_error)?;

    let state = Arc::new(ServerState {
        dispatcher,
        hub,
        outbound_buffer: options.outbound_buffer,
    });
    let router = Router::new()
        .route(&options.path, get(ws_upgrade))
        .with_state(state);

    let shutdown_token = CancellationToken::new();
    let token = shutdown_token.clone();

    tokio::spawn(async move {
        let server = axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        );
        tokio::select! {
            result = server => {
                if let Err(e) = result {
                    error!(error = %e, "WebSocket server error");
                }
            }
            () = token.cancelled() => {
                info!(addr = %local_addr, "WebSocket server shutting down");
            }
        }
    });

    info!(addr = %local_addr, path = %options.path, "WebSocket server listening");

    Ok(ListenerHandle {
        id: format!("ws-server-{local_addr}{}", options.path),
        local_addr,
        shutdown_token,
    })
}

// ─── Connection handling ──────────────────────────────────────────────────────

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ServerState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let mut builder = Session::builder(state.hub.next_session_id()).remote_addr(addr.to_string());
    for (name, value) in &headers {
        if let Ok(value) = value.to_str() {
            builder = builder.attribute(name.as_str(), value);
        }
    }
    let session = builder.build();

    debug!(session_id = %session.id(), remote_addr = %addr, "WebSocket upgrade requested");
    ws.on_upgrade(move |socket| handle_socket(state, session, socket))
}

async fn handle_socket(state: Arc<ServerState>, session: Session, socket: WebSocket) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let session_id = session.id().clone();

    let mut outbound = state.hub.register(session_id.clone(), state.outbound_buffer);
    info!(session_id = %session_id, "Session opened");

    // ── Send task: forwards hub payloads to the socket ────────────────────────
    let send_id = session_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(payload) = outbound.recv().await {
            if ws_tx.send(Message::Text(payload.into())).await.is_err() {
                warn!(session_id = %send_id, "Failed to send message, connection closed");
                break;
            }
        }
    });

    state.dispatcher.dispatch_connect(&session).await;

    // ── Receive loop ──────────────────────────────────────────────────────────
    let mut status = CloseStatus::NO_CLOSE_FRAME;
    while let Some(result) = ws_rx.next().await {
        match result {
            Ok(Message::Text(text)) => {
                debug!(session_id = %session_id, len = text.len(), "Received text frame");
                state.dispatcher.dispatch_text(&session, text.as_str()).await;
            }
            Ok(Message::Binary(data)) => match std::str::from_utf8(&data) {
                Ok(text) => {
                    debug!(session_id = %session_id, len = data.len(), "Received binary frame");
                    state.dispatcher.dispatch_text(&session, text).await;
                }
                Err(e) => warn!(session_id = %session_id, error = %e, "Dropping non UTF-8 frame"),
            },
            Ok(Message::Ping(_) | Message::Pong(_)) => {}
            Ok(Message::Close(frame)) => {
                status = close_status(frame);
                info!(session_id = %session_id, status = %status, "Session closed by client");
                break;
            }
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    // ── Cleanup ───────────────────────────────────────────────────────────────
    // Dropping the hub's sender ends the outbound stream once queued payloads drain.
    state.hub.remove(&session_id);
    if let Err(e) = send_task.await {
        warn!(session_id = %session_id, error = %e, "Send task failed");
    }
    state.dispatcher.dispatch_disconnect(&session, &status).await;
    info!(session_id = %session_id, "Session closed");
}

fn close_status(frame: Option<CloseFrame>) -> CloseStatus {
    match frame {
        Some(frame) if frame.reason.as_str().is_empty() => CloseStatus::from_code(frame.code),
        Some(frame) => CloseStatus::new(frame.code, frame.reason.as_str()),
        None => CloseStatus::NO_STATUS,
    }
}
